//! Compliance API Server
//!
//! Serves the listing-document compliance pipeline over HTTP:
//!
//! - Whole-document analysis streamed as NDJSON
//! - Deep, seven-stage analysis of a single subsection
//! - Rule search against the reference corpus
//! - Reviewer feedback capture (training mode only)
//!
//! Backends (embeddings, vector index, language model) are configured
//! through environment variables; see `RetrievalConfig::from_env`,
//! `ModelConfig::from_env` and `EngineConfig::from_env`.

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod state;

use api::{handle_analyze, handle_analyze_deep, handle_feedback, handle_health, handle_rules_search};
use state::AppState;

/// Command-line arguments for the compliance server
#[derive(Parser, Debug)]
#[command(name = "compliance-api")]
#[command(about = "Listing compliance review server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Accept reviewer feedback writes
    #[arg(long, env = "TRAINING_MODE")]
    training_mode: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router with every route and request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/analyze/deep", post(handle_analyze_deep))
        .route("/api/rules/search", post(handle_rules_search))
        .route("/api/feedback", post(handle_feedback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting compliance server on {}:{}", args.host, args.port);

    let state = AppState::from_env(args.training_mode)?;
    if state.training_mode {
        info!("Training mode enabled: feedback writes are accepted");
    }

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
