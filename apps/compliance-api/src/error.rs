//! Error types for the compliance server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use compliance_engine::EngineError;
use corpus_core::CorpusError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Feedback capture is disabled")]
    TrainingModeDisabled,

    #[error("Backend unavailable: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone()),
            ApiError::TrainingModeDisabled => (
                StatusCode::FORBIDDEN,
                "TRAINING_MODE_DISABLED",
                "Feedback is only accepted when the server runs in training mode".to_string(),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if err.is_fatal() {
            ApiError::Internal(err.to_string())
        } else {
            ApiError::Upstream(err.to_string())
        }
    }
}

impl From<CorpusError> for ApiError {
    fn from(err: CorpusError) -> Self {
        if err.is_configuration() {
            ApiError::Internal(err.to_string())
        } else {
            ApiError::Upstream(err.to_string())
        }
    }
}
