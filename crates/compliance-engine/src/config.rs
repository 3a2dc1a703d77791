//! Configuration for the analysis engine and the language-model backend

use anyhow::{anyhow, Result};
use corpus_core::parse_env;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the risk checker treats prose that trips neither rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum RiskPolicy {
    /// Accept the subsection with a default score
    Lenient { default_score: u8 },
    /// Reject the subsection and ask for forward-looking framing
    Strict { score: u8 },
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy::Lenient { default_score: 75 }
    }
}

/// Which per-subsection path the orchestrator takes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// One routed checker call per subsection
    #[default]
    Standard,
    /// The seven-stage refinement chain per subsection
    Deep,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub risk_policy: RiskPolicy,
    pub mode: AnalysisMode,
    /// Reference passages retrieved per subsection
    pub top_k: usize,
    /// Corpus override; `None` uses the retriever's default
    pub corpus: Option<String>,
    /// Score deducted when no reference passage could be retrieved
    pub no_evidence_penalty: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_policy: RiskPolicy::default(),
            mode: AnalysisMode::Standard,
            top_k: 5,
            corpus: None,
            no_evidence_penalty: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - RISK_POLICY: "lenient" or "strict" (default: "lenient")
    /// - RISK_DEFAULT_SCORE: score used by the risk policy (default: 75 lenient, 50 strict)
    /// - ANALYSIS_MODE: "standard" or "deep"
    /// - RULE_TOP_K / RULE_CORPUS
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let policy_score: Option<u8> = parse_env("RISK_DEFAULT_SCORE")?;
        let risk_policy = match std::env::var("RISK_POLICY")
            .unwrap_or_else(|_| "lenient".to_string())
            .to_lowercase()
            .as_str()
        {
            "lenient" => RiskPolicy::Lenient {
                default_score: policy_score.unwrap_or(75).min(100),
            },
            "strict" => RiskPolicy::Strict {
                score: policy_score.unwrap_or(50).min(100),
            },
            other => return Err(anyhow!("Unknown risk policy: {}", other)),
        };

        let mode = match std::env::var("ANALYSIS_MODE")
            .unwrap_or_else(|_| "standard".to_string())
            .to_lowercase()
            .as_str()
        {
            "standard" => AnalysisMode::Standard,
            "deep" => AnalysisMode::Deep,
            other => return Err(anyhow!("Unknown analysis mode: {}", other)),
        };

        Ok(Self {
            risk_policy,
            mode,
            top_k: parse_env("RULE_TOP_K")?.unwrap_or(defaults.top_k),
            corpus: std::env::var("RULE_CORPUS").ok(),
            no_evidence_penalty: defaults.no_evidence_penalty,
        })
    }
}

/// Language-model backend configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Chat completions route, e.g. `https://api.openai.com/v1/chat/completions`
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.1,
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ModelConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - LLM_API_URL / LLM_MODEL
    /// - LLM_API_KEY (falls back to OPENAI_API_KEY)
    /// - LLM_MAX_RETRIES (default: 2)
    /// - LLM_TIMEOUT_MS (default: 60000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_url: std::env::var("LLM_API_URL").unwrap_or(defaults.api_url),
            model: std::env::var("LLM_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok(),
            temperature: parse_env("LLM_TEMPERATURE")?.unwrap_or(defaults.temperature),
            max_retries: parse_env("LLM_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            initial_backoff: defaults.initial_backoff,
            timeout: parse_env("LLM_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        })
    }
}
