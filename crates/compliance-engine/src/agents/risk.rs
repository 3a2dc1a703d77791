// Risk factor checks: forward-looking framing and stated consequences
use async_trait::async_trait;

use super::{AgentRequest, AgentVerdict, SectionAgent, SectionKind};
use crate::config::RiskPolicy;
use crate::error::EngineError;
use crate::patterns::{
    contains_any_stem, contains_any_word, detect_placeholders, CONSEQUENCE_KEYWORDS, MODAL_KEYWORDS,
};

const AGENT: &str = "risk";

/// Score for incomplete risk prose
pub const PLACEHOLDER_SCORE: u32 = 40;
/// Score for risk prose with both modal framing and a consequence
pub const WELL_FORMED_SCORE: u32 = 90;

pub struct RiskAgent {
    policy: RiskPolicy,
}

impl RiskAgent {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn check(&self, request: &AgentRequest) -> AgentVerdict {
        if !SectionKind::Risk.accepts(request) {
            return AgentVerdict::misrouted(AGENT, &request.title);
        }

        let placeholders = detect_placeholders(&request.content);
        if !placeholders.is_empty() {
            return AgentVerdict::non_compliant(
                AGENT,
                PLACEHOLDER_SCORE,
                vec![format!(
                    "Risk disclosure is incomplete; replace placeholder content: {}",
                    placeholders.join(", ")
                )],
            );
        }

        let has_modal = contains_any_word(&request.content, MODAL_KEYWORDS);
        let has_consequence = contains_any_stem(&request.content, CONSEQUENCE_KEYWORDS);
        if has_modal && has_consequence {
            return AgentVerdict::compliant(AGENT, WELL_FORMED_SCORE);
        }

        let mut missing = Vec::new();
        if !has_modal {
            missing.push("Describe the risk in forward-looking terms (e.g. \"may\", \"could\")");
        }
        if !has_consequence {
            missing.push("State how the risk could impact or affect the company");
        }

        match self.policy {
            // Accepted unless clearly incomplete; the gaps are still reported
            RiskPolicy::Lenient { default_score } => {
                let mut verdict = AgentVerdict::compliant(AGENT, default_score as u32);
                verdict.suggestions = missing.into_iter().map(String::from).collect();
                verdict
            }
            RiskPolicy::Strict { score } => AgentVerdict::non_compliant(
                AGENT,
                score as u32,
                missing.into_iter().map(String::from).collect(),
            ),
        }
    }
}

impl Default for RiskAgent {
    fn default() -> Self {
        Self::new(RiskPolicy::default())
    }
}

#[async_trait]
impl SectionAgent for RiskAgent {
    fn name(&self) -> &'static str {
        AGENT
    }

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, EngineError> {
        Ok(self.check(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::request;

    #[test]
    fn test_modal_and_consequence_is_compliant() {
        let verdict = RiskAgent::default().check(&request(
            "Risk Factors",
            "Market Risk",
            "Changes in interest rates may adversely impact our margins.",
        ));
        assert!(verdict.is_compliant);
        assert_eq!(verdict.score, WELL_FORMED_SCORE);
    }

    #[test]
    fn test_placeholder_is_non_compliant() {
        let verdict = RiskAgent::default().check(&request(
            "Risk Factors",
            "Currency Risk",
            "Exposure to [CURRENCY] may affect results.",
        ));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, PLACEHOLDER_SCORE);
        assert!(verdict.suggestions[0].contains("[CURRENCY]"));
    }

    #[test]
    fn test_lenient_default() {
        let verdict = RiskAgent::default().check(&request(
            "Risk Factors",
            "Competition",
            "The industry is competitive.",
        ));
        assert!(verdict.is_compliant);
        assert_eq!(verdict.score, 75);
        assert_eq!(verdict.suggestions.len(), 2);
    }

    #[test]
    fn test_strict_policy_rejects_unframed_prose() {
        let agent = RiskAgent::new(RiskPolicy::Strict { score: 50 });
        let verdict = agent.check(&request(
            "Risk Factors",
            "Competition",
            "Competition could be intense.",
        ));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, 50);
        assert_eq!(verdict.suggestions.len(), 1);
    }

    #[test]
    fn test_misrouted() {
        let verdict = RiskAgent::default().check(&request("Business", "History", "Founded in 1990."));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.suggestions.len(), 1);
    }
}
