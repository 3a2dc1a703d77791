// Financial information checks: quantified figures and core P&L terms
use async_trait::async_trait;

use super::{AgentRequest, AgentVerdict, SectionAgent, SectionKind};
use crate::error::EngineError;
use crate::patterns::{contains_any_stem, FINANCIAL_TERMS};

const AGENT: &str = "financial";

const BASE_SCORE: u32 = 90;
const MISSING_REQUIREMENT_PENALTY: u32 = 35;

#[derive(Debug, Default, Clone, Copy)]
pub struct FinancialAgent;

impl FinancialAgent {
    pub fn check(&self, request: &AgentRequest) -> AgentVerdict {
        if !SectionKind::Financial.accepts(request) {
            return AgentVerdict::misrouted(AGENT, &request.title);
        }

        let mut suggestions = Vec::new();

        if !request.content.chars().any(|c| c.is_ascii_digit()) {
            suggestions.push(
                "Include quantified figures (amounts, percentages or periods) for the financial information"
                    .to_string(),
            );
        }

        if !contains_any_stem(&request.content, FINANCIAL_TERMS) {
            suggestions.push(
                "Discuss revenue, expenses or profit so results of operations can be assessed".to_string(),
            );
        }

        if suggestions.is_empty() {
            return AgentVerdict::compliant(AGENT, BASE_SCORE);
        }

        let penalty = MISSING_REQUIREMENT_PENALTY * suggestions.len() as u32;
        AgentVerdict::non_compliant(AGENT, BASE_SCORE.saturating_sub(penalty), suggestions)
    }
}

#[async_trait]
impl SectionAgent for FinancialAgent {
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
    fn test_complete_financial_section() {
        let verdict = FinancialAgent.check(&request(
            "Financial Information",
            "Results",
            "Revenue increased 12% to $4.2 million in 2023.",
        ));
        assert!(verdict.is_compliant);
        assert_eq!(verdict.score, BASE_SCORE);
        assert!(verdict.suggestions.is_empty());
    }

    #[test]
    fn test_missing_figures() {
        let verdict = FinancialAgent.check(&request(
            "Financial Information",
            "Results",
            "Revenue increased significantly.",
        ));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, 55);
        assert_eq!(verdict.suggestions.len(), 1);
        assert!(verdict.suggestions[0].contains("quantified"));
    }

    #[test]
    fn test_missing_both_requirements() {
        let verdict = FinancialAgent.check(&request("Financial Information", "Results", "Things went well."));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, 20);
        assert_eq!(verdict.suggestions.len(), 2);
    }

    #[test]
    fn test_section_title_satisfies_precondition() {
        let verdict = FinancialAgent.check(&request(
            "Financial Statements",
            "Operating Results",
            "Operating expenses were 3.1 million.",
        ));
        assert!(verdict.is_compliant);
    }

    #[test]
    fn test_misrouted() {
        let verdict = FinancialAgent.check(&request("Business", "History", "Revenue of 10"));
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.suggestions.len(), 1);
        assert!(verdict.suggestions[0].contains("financial"));
    }
}
