//! Retrieval-backed checker for subsections no keyword checker claims
//!
//! The subsection text is compared against reference passages from the rule
//! corpus and the language model is asked for a JSON critique. The response
//! goes through the shared parse boundary; anything unusable becomes a
//! score-0 verdict instead of an error.

use async_trait::async_trait;
use corpus_core::{deduplicate_matches, RuleMatch, RuleSource};
use serde::Deserialize;
use shared_types::VerdictMetadata;
use std::sync::Arc;
use tracing::debug;

use super::{AgentRequest, AgentVerdict, SectionAgent};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::parse::parse_or_fallback;
use crate::patterns::{contains_any_stem, FINANCIAL_TITLE_KEYWORDS, RISK_TITLE_KEYWORDS};

const AGENT: &str = "general";

/// Critique points kept from a model response
pub const MAX_CRITIQUE_POINTS: usize = 3;

pub const UNPARSEABLE_SUGGESTION: &str =
    "Automated review could not assess this subsection; review it manually against the listing rules";
pub const EMPTY_CONTENT_SUGGESTION: &str = "Provide content for this subsection";

/// Characters of each sibling subsection included as context
const SIBLING_EXCERPT: usize = 200;

const SYSTEM_PROMPT: &str = "You are a listing compliance reviewer. Compare the subsection \
against the reference passages from the exchange rules and reply with a JSON object: \
{\"isCompliant\": boolean, \"critiquePoints\": [string], \"score\": number 0-100, \
\"analysis\": string}. List at most three concrete critique points that apply to this \
subsection only; an empty list means the subsection is compliant.";

/// What a subsection does within the document, inferred from its title and
/// identifier prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralRole {
    Warning,
    Introductory,
    DetailedRisk,
    DetailedFinancial,
    Generic,
}

impl StructuralRole {
    pub fn classify(subsection_id: &str, title: &str) -> Self {
        let id = subsection_id.to_lowercase();

        if id.starts_with("warning") || contains_any_stem(title, &["warning", "caution", "important notice"]) {
            StructuralRole::Warning
        } else if id.starts_with("intro")
            || contains_any_stem(title, &["introduction", "overview", "summary", "preliminary"])
        {
            StructuralRole::Introductory
        } else if id.starts_with("risk") || contains_any_stem(title, RISK_TITLE_KEYWORDS) {
            StructuralRole::DetailedRisk
        } else if id.starts_with("fin") || contains_any_stem(title, FINANCIAL_TITLE_KEYWORDS) {
            StructuralRole::DetailedFinancial
        } else {
            StructuralRole::Generic
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            StructuralRole::Warning => {
                "This is a warning statement. It must be prominent, plain and complete; do not expect detail."
            }
            StructuralRole::Introductory => {
                "This is an introductory passage. Judge it on accuracy and balance, not on depth."
            }
            StructuralRole::DetailedRisk => {
                "This is a detailed risk disclosure. Expect specific risks, their likelihood and their consequences."
            }
            StructuralRole::DetailedFinancial => {
                "This is a detailed financial disclosure. Expect figures, periods and the basis of preparation."
            }
            StructuralRole::Generic => "Judge this subsection against the applicable disclosure rules.",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelVerdict {
    #[serde(default)]
    is_compliant: bool,
    #[serde(default)]
    critique_points: Vec<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    analysis: Option<String>,
}

pub struct GeneralAgent {
    rules: Arc<dyn RuleSource>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    corpus: Option<String>,
    no_evidence_penalty: u32,
}

impl GeneralAgent {
    pub fn new(rules: Arc<dyn RuleSource>, model: Arc<dyn LanguageModel>) -> Self {
        Self::with_config(rules, model, &EngineConfig::default())
    }

    pub fn with_config(
        rules: Arc<dyn RuleSource>,
        model: Arc<dyn LanguageModel>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            rules,
            model,
            top_k: config.top_k,
            corpus: config.corpus.clone(),
            no_evidence_penalty: config.no_evidence_penalty,
        }
    }

    fn build_prompt(&self, request: &AgentRequest, role: StructuralRole, evidence: &[RuleMatch]) -> String {
        let mut prompt = String::new();
        prompt.push_str(role.guidance());
        prompt.push_str(&format!(
            "\n\nSection: {}\nSubsection: {}\n\nContent:\n{}\n",
            request.section_title, request.title, request.content
        ));

        if evidence.is_empty() {
            prompt.push_str("\nNo reference passages were found for this subsection.\n");
        } else {
            prompt.push_str("\nReference passages:\n");
            for (i, m) in evidence.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. [{}] {} (similarity {:.2}): {}\n",
                    i + 1,
                    m.rule.id,
                    m.rule.title,
                    m.score,
                    m.text
                ));
            }
        }

        if !request.siblings.is_empty() {
            prompt.push_str("\nOther subsections in this section (do not critique these):\n");
            for (title, content) in &request.siblings {
                let excerpt: String = content.chars().take(SIBLING_EXCERPT).collect();
                prompt.push_str(&format!("- {}: {}\n", title, excerpt));
            }
        }

        prompt
    }

    fn interpret(&self, raw: &str, evidence: &[RuleMatch]) -> AgentVerdict {
        let top_score = evidence.first().map(|m| m.score);

        parse_or_fallback(
            raw,
            "general checker",
            |parsed: ModelVerdict| self.score(parsed, evidence, top_score),
            |_| {
                let mut verdict =
                    AgentVerdict::non_compliant(AGENT, 0, vec![UNPARSEABLE_SUGGESTION.to_string()]);
                verdict.metadata.retrieval_score = top_score;
                verdict
            },
        )
    }

    fn score(&self, parsed: ModelVerdict, evidence: &[RuleMatch], top_score: Option<f32>) -> AgentVerdict {
        let critique_points: Vec<String> = parsed
            .critique_points
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .take(MAX_CRITIQUE_POINTS)
            .collect();

        let is_compliant = critique_points.is_empty() || parsed.is_compliant;
        let model_score = parsed
            .score
            .filter(|s| s.is_finite())
            .unwrap_or(if is_compliant { 100.0 } else { 0.0 })
            .clamp(0.0, 100.0)
            .round() as u32;

        let score = if evidence.is_empty() {
            model_score.saturating_sub(self.no_evidence_penalty)
        } else {
            model_score
        };

        AgentVerdict {
            is_compliant,
            score,
            suggestions: critique_points,
            metadata: VerdictMetadata {
                reasoning: parsed.analysis,
                retrieval_score: top_score,
                agent: Some(AGENT.to_string()),
            },
        }
    }
}

#[async_trait]
impl SectionAgent for GeneralAgent {
    fn name(&self) -> &'static str {
        AGENT
    }

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, EngineError> {
        if request.content.trim().is_empty() {
            return Ok(AgentVerdict::non_compliant(
                AGENT,
                0,
                vec![EMPTY_CONTENT_SUGGESTION.to_string()],
            ));
        }

        let matches = self
            .rules
            .retrieve(&request.content, self.top_k, self.corpus.as_deref())
            .await?;
        let evidence = deduplicate_matches(matches);
        debug!(
            "{} reference passages for subsection {}",
            evidence.len(),
            request.subsection_id
        );

        let role = StructuralRole::classify(&request.subsection_id, &request.title);
        let prompt = self.build_prompt(request, role, &evidence);
        let raw = self
            .model
            .complete(SYSTEM_PROMPT, &[ChatMessage::user(prompt)], ResponseFormat::Json)
            .await?;

        Ok(self.interpret(&raw, &evidence))
    }
}
