//! Compliance Engine - listing document analysis pipeline
//!
//! Walks a document section by section, routes each subsection to a
//! checker, aggregates verdicts bottom-up and streams progress. A deeper
//! seven-stage refinement chain is available per subsection.

pub mod activity;
pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parse;
pub mod patterns;
pub mod progress;
pub mod refinement;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog, MemoryActivityLog, NoopActivityLog, TracingActivityLog};
pub use agents::{AgentRequest, AgentSet, AgentVerdict, GeneralAgent, SectionAgent, SectionKind};
pub use config::{AnalysisMode, EngineConfig, ModelConfig, RiskPolicy};
pub use error::{EngineError, ModelError};
pub use llm::{ChatMessage, HttpLanguageModel, LanguageModel, ResponseFormat, Role};
pub use orchestrator::{placeholder_verdict, AnalysisOrchestrator};
pub use parse::{parse_model_json, parse_or_fallback, ParseError};
pub use patterns::detect_placeholders;
pub use progress::{ChannelProgress, NoProgress, ProgressSink, RunContext};
pub use refinement::{ComplianceStatus, FeedbackSignal, FinalVerdict, RefinementChain, RefinementOutcome};
pub use stream::{consume_stream, NdjsonDecoder, StreamError, StreamMessage};

use corpus_core::RuleSource;
use shared_types::{Document, DocumentAnalysisResult};
use std::sync::Arc;

/// ComplianceEngine entry point
///
/// Wires the checkers, the orchestrator and the refinement chain to one
/// rule source and one language model.
pub struct ComplianceEngine {
    orchestrator: AnalysisOrchestrator,
    refinement: Arc<RefinementChain>,
}

impl ComplianceEngine {
    pub fn new(config: &EngineConfig, rules: Arc<dyn RuleSource>, model: Arc<dyn LanguageModel>) -> Self {
        Self::with_activity_log(config, rules, model, Arc::new(TracingActivityLog))
    }

    pub fn with_activity_log(
        config: &EngineConfig,
        rules: Arc<dyn RuleSource>,
        model: Arc<dyn LanguageModel>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        let general = Arc::new(GeneralAgent::with_config(rules.clone(), model.clone(), config));
        let agents = AgentSet::new(general, config.risk_policy);
        let refinement = Arc::new(
            RefinementChain::with_config(model, rules, config).with_activity_log(activity.clone()),
        );
        let orchestrator = AnalysisOrchestrator::new(agents)
            .with_activity_log(activity)
            .with_refinement(refinement.clone(), config.mode);

        Self {
            orchestrator,
            refinement,
        }
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    pub fn refinement(&self) -> &RefinementChain {
        &self.refinement
    }

    pub async fn analyze(
        &self,
        document: &Document,
        ctx: &RunContext<'_>,
    ) -> Result<DocumentAnalysisResult, EngineError> {
        self.orchestrator.analyze(document, ctx).await
    }

    /// Run the refinement chain on a single subsection
    pub async fn refine(
        &self,
        request: &AgentRequest,
        feedback: Option<FeedbackSignal>,
    ) -> Result<RefinementOutcome, EngineError> {
        self.refinement.analyze(request, feedback).await
    }
}
