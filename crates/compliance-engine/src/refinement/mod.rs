//! Seven-stage refinement chain for a single subsection
//!
//! Stages run strictly in order and each one reads the accumulated
//! [`ChainState`]. A stage whose model call or response fails leaves a
//! conservative partially-compliant result in the state and the chain moves
//! on, so the final stage always produces a usable verdict.

mod quality;
mod stages;

pub use quality::{enforce_brevity, MAX_KEY_POINTS, MAX_POINT_CHARS};

use corpus_core::{deduplicate_matches, RuleMatch, RuleSource};
use serde::{Deserialize, Serialize};
use shared_types::{Subsection, SubsectionVerdict, VerdictMetadata};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::activity::{ActivityEntry, ActivityKind, ActivityLog, TracingActivityLog};
use crate::agents::AgentRequest;
use crate::config::EngineConfig;
use crate::error::{EngineError, ModelError};
use crate::llm::LanguageModel;

const AGENT: &str = "refinement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContextExtraction,
    RuleFiltering,
    TargetedSummarization,
    FeedbackIntegration,
    QualityAssurance,
    ContextualRelevance,
    IterativeRefinement,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::ContextExtraction,
        Stage::RuleFiltering,
        Stage::TargetedSummarization,
        Stage::FeedbackIntegration,
        Stage::QualityAssurance,
        Stage::ContextualRelevance,
        Stage::IterativeRefinement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::ContextExtraction => "context extraction",
            Stage::RuleFiltering => "rule filtering",
            Stage::TargetedSummarization => "targeted summarization",
            Stage::FeedbackIntegration => "feedback integration",
            Stage::QualityAssurance => "quality assurance",
            Stage::ContextualRelevance => "contextual relevance",
            Stage::IterativeRefinement => "iterative refinement",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tri-state compliance used inside the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    #[serde(alias = "partially-compliant", alias = "partial", alias = "partiallyCompliant")]
    PartiallyCompliant,
    #[serde(alias = "non-compliant", alias = "nonCompliant")]
    NonCompliant,
}

impl ComplianceStatus {
    pub fn is_compliant(self) -> bool {
        self == ComplianceStatus::Compliant
    }

    /// Score recorded when the outcome becomes a subsection verdict
    pub fn score(self) -> u32 {
        match self {
            ComplianceStatus::Compliant => 90,
            ComplianceStatus::PartiallyCompliant => 60,
            ComplianceStatus::NonCompliant => 30,
        }
    }

    /// Never more favourable than partially compliant
    pub fn conservative(self) -> Self {
        match self {
            ComplianceStatus::Compliant => ComplianceStatus::PartiallyCompliant,
            other => other,
        }
    }
}

/// Historical reviewer feedback for subsections like this one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSignal {
    #[serde(default)]
    pub comments: Vec<String>,
    /// A reviewer-approved rewrite of similar content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_example: Option<String>,
}

impl FeedbackSignal {
    pub fn is_empty(&self) -> bool {
        self.comments.iter().all(|c| c.trim().is_empty())
            && self.improved_example.as_deref().map_or(true, |e| e.trim().is_empty())
    }
}

/// Subsection content plus everything the chain needs besides the model
#[derive(Debug, Clone, PartialEq)]
pub struct SubsectionContext {
    pub subsection_id: String,
    pub title: String,
    pub section_title: String,
    pub content: String,
    pub siblings: BTreeMap<String, String>,
    /// Deduplicated candidate rules
    pub rules: Vec<RuleMatch>,
    pub feedback: Option<FeedbackSignal>,
}

impl SubsectionContext {
    pub fn new(request: &AgentRequest, rules: Vec<RuleMatch>, feedback: Option<FeedbackSignal>) -> Self {
        Self {
            subsection_id: request.subsection_id.clone(),
            title: request.title.clone(),
            section_title: request.section_title.clone(),
            content: request.content.clone(),
            siblings: request.siblings.clone(),
            rules: deduplicate_matches(rules),
            feedback: feedback.filter(|f| !f.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentLength {
    Short,
    Medium,
    Long,
}

impl ContentLength {
    pub fn of(text: &str) -> Self {
        match text.split_whitespace().count() {
            0..=80 => ContentLength::Short,
            81..=400 => ContentLength::Medium,
            _ => ContentLength::Long,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub purpose: String,
    pub key_requirements: Vec<String>,
    pub length: ContentLength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantRule {
    pub rule_id: String,
    /// 0-100
    pub relevance: u8,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleJudgment {
    pub rule_id: String,
    pub compliant: bool,
    pub reason: String,
}

/// Working assessment refined by stages 3 to 6
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub compliance: ComplianceStatus,
    pub key_points: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Assessment {
    pub fn unavailable() -> Self {
        Self {
            compliance: ComplianceStatus::PartiallyCompliant,
            key_points: vec!["Automated assessment was incomplete; manual review is recommended".to_string()],
            suggestions: Vec::new(),
        }
    }

    fn conservative(mut self) -> Self {
        self.compliance = self.compliance.conservative();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalVerdict {
    /// Conversational verdict shown to the author
    pub verdict: String,
    pub compliance: ComplianceStatus,
    /// One or two points
    pub key_points: Vec<String>,
    /// Internal explanation, not shown to the author
    pub explanation: String,
}

/// Accumulated stage outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub context: Option<ContextSummary>,
    pub relevant_rules: Vec<RelevantRule>,
    pub judgments: Vec<RuleJudgment>,
    pub assessment: Option<Assessment>,
    pub misapplied_rules: Vec<String>,
    pub final_verdict: Option<FinalVerdict>,
    pub completed: Vec<Stage>,
    pub fallbacks: Vec<Stage>,
}

impl ChainState {
    pub fn new() -> Self {
        Self {
            context: None,
            relevant_rules: Vec::new(),
            judgments: Vec::new(),
            assessment: None,
            misapplied_rules: Vec::new(),
            final_verdict: None,
            completed: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn assessment(&self) -> Assessment {
        self.assessment.clone().unwrap_or_else(Assessment::unavailable)
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementOutcome {
    pub final_verdict: FinalVerdict,
    pub suggestions: Vec<String>,
    pub relevant_rules: Vec<RelevantRule>,
    pub fallbacks: Vec<Stage>,
    pub retrieval_score: Option<f32>,
}

impl RefinementOutcome {
    pub fn is_compliant(&self) -> bool {
        self.final_verdict.compliance.is_compliant()
    }

    pub fn to_verdict(&self, subsection: &Subsection) -> SubsectionVerdict {
        let suggestions = if self.is_compliant() {
            Vec::new()
        } else if self.suggestions.is_empty() {
            self.final_verdict.key_points.clone()
        } else {
            self.suggestions.clone()
        };

        SubsectionVerdict::new(
            subsection,
            self.is_compliant(),
            self.final_verdict.compliance.score(),
            suggestions,
        )
        .with_metadata(VerdictMetadata {
            reasoning: Some(format!(
                "{}\n\n{}",
                self.final_verdict.verdict, self.final_verdict.explanation
            )),
            retrieval_score: self.retrieval_score,
            agent: Some(AGENT.to_string()),
        })
    }
}

/// Failure inside one stage. Only a configuration failure escapes the chain.
#[derive(Debug)]
pub(crate) enum StageError {
    Model(ModelError),
    Parse(crate::parse::ParseError),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Model(e) => write!(f, "{}", e),
            StageError::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl From<ModelError> for StageError {
    fn from(err: ModelError) -> Self {
        StageError::Model(err)
    }
}

impl From<crate::parse::ParseError> for StageError {
    fn from(err: crate::parse::ParseError) -> Self {
        StageError::Parse(err)
    }
}

pub struct RefinementChain {
    model: Arc<dyn LanguageModel>,
    rules: Arc<dyn RuleSource>,
    top_k: usize,
    corpus: Option<String>,
    activity: Arc<dyn ActivityLog>,
}

impl RefinementChain {
    pub fn new(model: Arc<dyn LanguageModel>, rules: Arc<dyn RuleSource>) -> Self {
        Self::with_config(model, rules, &EngineConfig::default())
    }

    pub fn with_config(
        model: Arc<dyn LanguageModel>,
        rules: Arc<dyn RuleSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            model,
            rules,
            top_k: config.top_k,
            corpus: config.corpus.clone(),
            activity: Arc::new(TracingActivityLog),
        }
    }

    pub fn with_activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    /// Retrieve and deduplicate rules for `request`, then run the chain
    pub async fn analyze(
        &self,
        request: &AgentRequest,
        feedback: Option<FeedbackSignal>,
    ) -> Result<RefinementOutcome, EngineError> {
        let matches = self
            .rules
            .retrieve(&request.content, self.top_k, self.corpus.as_deref())
            .await?;
        let context = SubsectionContext::new(request, matches, feedback);
        self.run(&context).await
    }

    /// Run all seven stages in order over `context`
    pub async fn run(&self, context: &SubsectionContext) -> Result<RefinementOutcome, EngineError> {
        let mut state = ChainState::new();

        for stage in Stage::ALL {
            match stages::run_stage(self.model.as_ref(), stage, context, &mut state).await {
                Ok(()) => {
                    state.completed.push(stage);
                    self.activity.record(ActivityEntry::new(
                        ActivityKind::StageCompleted,
                        &context.subsection_id,
                        stage.name(),
                    ));
                }
                Err(StageError::Model(ModelError::Configuration(msg))) => {
                    return Err(EngineError::Model(ModelError::Configuration(msg)));
                }
                Err(e) => {
                    stages::apply_fallback(stage, context, &mut state);
                    state.fallbacks.push(stage);
                    self.activity.record(ActivityEntry::new(
                        ActivityKind::StageFallback,
                        &context.subsection_id,
                        format!("{}: {}", stage.name(), e),
                    ));
                }
            }
        }

        let assessment = state.assessment();
        let final_verdict = match state.final_verdict.take() {
            Some(verdict) => verdict,
            None => stages::fallback_verdict(context, &assessment),
        };

        Ok(RefinementOutcome {
            final_verdict,
            suggestions: assessment.suggestions,
            relevant_rules: state.relevant_rules,
            fallbacks: state.fallbacks,
            retrieval_score: context.rules.first().map(|m| m.score),
        })
    }
}

#[cfg(test)]
mod tests;
