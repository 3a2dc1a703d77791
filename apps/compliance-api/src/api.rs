//! HTTP handlers for the compliance server

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use compliance_engine::{
    placeholder_verdict, AgentRequest, ChannelProgress, EngineError, FeedbackSignal, RefinementOutcome, RunContext,
    StreamMessage,
};
use corpus_core::{deduplicate_matches, MatchType, RuleMatch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::{Document, Subsection, SubsectionVerdict};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Messages buffered between the analysis task and the response body
const STREAM_BUFFER: usize = 32;

/// Upper bound for a caller-supplied `topK`
const MAX_TOP_K: usize = 50;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub training_mode: bool,
    /// Why the rule index is unreachable, when it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepAnalysisRequest {
    #[serde(default)]
    pub section_title: String,
    pub subsection: Subsection,
    /// Title -> content of the other subsections in the same section
    #[serde(default)]
    pub siblings: BTreeMap<String, String>,
    #[serde(default)]
    pub feedback: Option<FeedbackSignal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepAnalysisResponse {
    pub success: bool,
    pub verdict: SubsectionVerdict,
    /// Absent when the subsection was rejected before the chain ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub corpus: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSearchHit {
    #[serde(flatten)]
    pub rule_match: RuleMatch,
    pub match_type: MatchType,
}

#[derive(Serialize)]
pub struct RuleSearchResponse {
    pub success: bool,
    pub count: usize,
    pub matches: Vec<RuleSearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub original_text: String,
    pub improved_text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness plus reachability of the rule index; 503 when the index is down
pub async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, rule_index) = match state.rules.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy", None),
        Err(e) => {
            warn!("Rule index health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", Some(e.to_string()))
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            service: "compliance-api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            training_mode: state.training_mode,
            rule_index,
        }),
    )
}

/// Analyze a whole document, streaming NDJSON progress.
///
/// The body carries `progress` and `section_complete` lines while the run is
/// in flight and ends with exactly one `result` or `error` line. Dropping
/// the connection cancels the run.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(document): Json<Document>,
) -> Result<Response, ApiError> {
    if document.id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("document id is required".to_string()));
    }

    let run_id = Uuid::new_v4();
    info!(
        "Run {} started for document {} ({} sections)",
        run_id,
        document.id,
        document.sections.len()
    );

    let (tx, rx) = mpsc::channel::<StreamMessage>(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    // cancels the run once the response body is dropped
    let guard = cancel.clone().drop_guard();

    let engine = state.engine.clone();
    tokio::spawn(async move {
        let progress = ChannelProgress::new(tx.clone());
        let ctx = RunContext::new(&progress, cancel);

        let message = match engine.analyze(&document, &ctx).await {
            Ok(result) => {
                info!("Run {} finished (compliant: {})", run_id, result.is_compliant);
                StreamMessage::Result { result }
            }
            Err(EngineError::Cancelled) => {
                info!("Run {} cancelled by client disconnect", run_id);
                return;
            }
            Err(e) => {
                warn!("Run {} aborted: {}", run_id, e);
                StreamMessage::Error { message: e.to_string() }
            }
        };
        let _ = tx.send(message).await;
    });

    let body = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        Some((message.to_bytes(), (rx, guard)))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Run the refinement chain on one subsection and return its verdict
pub async fn handle_analyze_deep(
    State(state): State<AppState>,
    Json(request): Json<DeepAnalysisRequest>,
) -> Result<Json<DeepAnalysisResponse>, ApiError> {
    let subsection = request.subsection;
    if subsection.id.trim().is_empty() {
        return Err(ApiError::InvalidRequest("subsection id is required".to_string()));
    }

    if let Some(verdict) = placeholder_verdict(&subsection) {
        return Ok(Json(DeepAnalysisResponse {
            success: true,
            verdict,
            refinement: None,
        }));
    }

    let agent_request = AgentRequest {
        subsection_id: subsection.id.clone(),
        title: subsection.title.clone(),
        section_title: request.section_title,
        content: subsection.content.clone(),
        siblings: request.siblings,
    };
    let outcome = state.engine.refine(&agent_request, request.feedback).await?;

    Ok(Json(DeepAnalysisResponse {
        success: true,
        verdict: outcome.to_verdict(&subsection),
        refinement: Some(outcome),
    }))
}

/// Retrieve and de-duplicate rules for free text
pub async fn handle_rules_search(
    State(state): State<AppState>,
    Json(request): Json<RuleSearchRequest>,
) -> Result<Json<RuleSearchResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::InvalidRequest("query must not be empty".to_string()));
    }

    let top_k = request.top_k.unwrap_or(state.config.top_k).clamp(1, MAX_TOP_K);
    let corpus = request.corpus.as_deref().or(state.config.corpus.as_deref());

    let matches = state.rules.retrieve(&request.query, top_k, corpus).await?;
    let matches: Vec<RuleSearchHit> = deduplicate_matches(matches)
        .into_iter()
        .map(|rule_match| RuleSearchHit {
            match_type: rule_match.match_type(),
            rule_match,
        })
        .collect();

    Ok(Json(RuleSearchResponse {
        success: true,
        count: matches.len(),
        matches,
    }))
}

/// Store a reviewer-approved rewrite; only available in training mode
pub async fn handle_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.training_mode {
        return Err(ApiError::TrainingModeDisabled);
    }
    if request.original_text.trim().is_empty() || request.improved_text.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "originalText and improvedText are required".to_string(),
        ));
    }

    let stored = state
        .feedback
        .upsert(&request.original_text, &request.improved_text, request.metadata)
        .await;
    if !stored {
        return Err(ApiError::Upstream("feedback could not be stored".to_string()));
    }

    Ok(Json(FeedbackResponse { success: true }))
}
