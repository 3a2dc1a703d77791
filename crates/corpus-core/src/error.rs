use thiserror::Error;

/// Errors raised by the retrieval layer
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Misconfiguration or a call from outside the server runtime.
    /// Fatal for an analysis run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend unreachable or returned a failure status
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Backend answered with a body we could not interpret
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl CorpusError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, CorpusError::Configuration(_))
    }
}

impl From<reqwest::Error> for CorpusError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CorpusError::InvalidResponse(err.to_string())
        } else {
            CorpusError::Backend(err.to_string())
        }
    }
}
