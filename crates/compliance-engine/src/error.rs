use corpus_core::CorpusError;
use thiserror::Error;

/// Errors raised by the language-model client
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned an empty completion")]
    EmptyResponse,
}

impl ModelError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Request(_) => true,
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Request(err.to_string())
    }
}

/// Errors raised while analyzing a document
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rule retrieval failed: {0}")]
    Retrieval(#[from] CorpusError),

    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),
}

impl EngineError {
    /// Fatal errors abort the whole run; everything else is contained at the
    /// subsection boundary.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Cancelled | EngineError::Configuration(_) => true,
            EngineError::Retrieval(e) => e.is_configuration(),
            EngineError::Model(ModelError::Configuration(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::Cancelled.is_fatal());
        assert!(EngineError::Configuration("x".into()).is_fatal());
        assert!(EngineError::from(CorpusError::Configuration("no runtime".into())).is_fatal());
        assert!(EngineError::from(ModelError::Configuration("no key".into())).is_fatal());

        assert!(!EngineError::from(CorpusError::Backend("down".into())).is_fatal());
        assert!(!EngineError::from(ModelError::EmptyResponse).is_fatal());
        assert!(!EngineError::from(ModelError::Request("timeout".into())).is_fatal());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ModelError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(ModelError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!ModelError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!ModelError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_error_text_is_preserved() {
        let err = EngineError::from(CorpusError::Backend("connection refused".into()));
        assert!(err.to_string().contains("connection refused"));
    }
}
