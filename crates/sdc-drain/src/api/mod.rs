//! HTTP trigger surface
//!
//! - `GET /health`: staging table reachability and the current drain phase
//! - `POST /api/v1/drain`: run one cycle and return its summary
//! - `GET /api/v1/drain/last`: report of the most recent cycle

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::drain::{CycleSummary, DrainOrchestrator, StagingStore};
use crate::error::AppError;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<DrainOrchestrator>,
    /// Cancelled on shutdown; HTTP-triggered cycles run on a child token
    pub shutdown: CancellationToken,
}

pub fn create_router(state: ApiState) -> Router {
    let api_v1 = Router::new()
        .route("/drain", post(trigger_drain))
        .route("/drain/last", get(last_drain));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
}

/// Bind and serve until `shutdown` is cancelled
pub async fn serve(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn health(State(state): State<ApiState>) -> Response {
    let phase = state.orchestrator.phase();
    match state.orchestrator.staging().count().await {
        Ok(staged_rows) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "phase": phase,
                "staged_rows": staged_rows,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable",
                    "phase": phase,
                })),
            )
                .into_response()
        },
    }
}

/// The cycle runs on its own task so a dropped connection does not cancel it.
async fn trigger_drain(State(state): State<ApiState>) -> Result<Json<CycleSummary>, AppError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let cancel = state.shutdown.child_token();

    let summary = tokio::spawn(async move { orchestrator.run_cycle(cancel).await })
        .await
        .map_err(|e| AppError::Internal(format!("drain task failed: {e}")))??;

    Ok(Json(summary))
}

async fn last_drain(State(state): State<ApiState>) -> Result<Json<CycleSummary>, AppError> {
    state
        .orchestrator
        .last_summary()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no drain cycle has run yet".to_string()))
}
