//! Shared application state
//!
//! One rule source, one feedback writer and one engine are built at startup
//! and shared by every request.

use anyhow::{Context, Result};
use compliance_engine::{ComplianceEngine, EngineConfig, HttpLanguageModel, LanguageModel, ModelConfig};
use corpus_core::{FeedbackWriter, RetrievalConfig, RuleSource};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ComplianceEngine>,
    pub rules: Arc<dyn RuleSource>,
    pub feedback: Arc<dyn FeedbackWriter>,
    pub config: Arc<EngineConfig>,
    /// Accept reviewer feedback writes
    pub training_mode: bool,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        rules: Arc<dyn RuleSource>,
        feedback: Arc<dyn FeedbackWriter>,
        model: Arc<dyn LanguageModel>,
        training_mode: bool,
    ) -> Self {
        let engine = Arc::new(ComplianceEngine::new(&config, rules.clone(), model));
        Self {
            engine,
            rules,
            feedback,
            config: Arc::new(config),
            training_mode,
        }
    }

    /// Initialize application state from environment configuration
    pub fn from_env(training_mode: bool) -> Result<Self> {
        let retrieval = RetrievalConfig::from_env()?;
        info!(
            "Rule corpus '{}' via {:?} backends",
            retrieval.corpus, retrieval.provider
        );
        let (retriever, feedback) = retrieval.build()?;

        let model_config = ModelConfig::from_env()?;
        info!("Language model: {}", model_config.model);
        let model = HttpLanguageModel::new(model_config).context("failed to build language model client")?;

        let config = EngineConfig::from_env()?;
        info!("Analysis mode: {:?}, risk policy: {:?}", config.mode, config.risk_policy);

        Ok(Self::new(config, retriever, feedback, Arc::new(model), training_mode))
    }
}
