//! Generation run control handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use hibiki_core::{
    EngineStatus, LedgerError, OrchestratorError, RunConfig, SyncReport,
};

use crate::metrics::RUNS_STARTED_TOTAL;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Optional per-run overrides for `POST /api/run/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub backend: Option<String>,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error to an HTTP status plus diagnostic body.
pub(crate) fn engine_error(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::AlreadyRunning
        | OrchestratorError::NotRunning
        | OrchestratorError::RunActive => StatusCode::CONFLICT,
        OrchestratorError::SynthesisUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::Ledger(LedgerError::JobNotFound(_)) => StatusCode::NOT_FOUND,
        OrchestratorError::Ledger(LedgerError::IllegalTransition { .. }) => StatusCode::CONFLICT,
        OrchestratorError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a generation run, optionally overriding the configured defaults.
pub async fn start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRunRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let config = body.map(|Json(req)| {
        let defaults = &state.config().engine;
        RunConfig {
            concurrency: req.concurrency.unwrap_or(defaults.concurrency),
            max_retries: req.max_retries.unwrap_or(defaults.max_retries),
            backend: req.backend.unwrap_or_else(|| defaults.backend.clone()),
        }
    });

    state
        .orchestrator()
        .start(config)
        .await
        .map_err(engine_error)?;
    RUNS_STARTED_TOTAL.inc();
    Ok(message("Generation run started"))
}

/// Pause the active run.
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator().pause().await.map_err(engine_error)?;
    Ok(message("Run paused"))
}

/// Resume a paused run.
pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator().resume().await.map_err(engine_error)?;
    Ok(message("Run resumed"))
}

/// Request a soft stop of the active run.
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator().stop().await.map_err(engine_error)?;
    Ok(message("Stop requested"))
}

/// Hint the scheduler to re-check priority jobs at the next batch.
pub async fn priority_check(
    State(state): State<Arc<AppState>>,
) -> Json<MessageResponse> {
    state.orchestrator().force_priority_check();
    message("Priority check requested")
}

/// Reconcile the ledger against the artifact directory.
pub async fn sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncReport>, ApiError> {
    let dir = state.orchestrator().output_dir().to_path_buf();
    let report = state
        .orchestrator()
        .sync(&dir)
        .await
        .map_err(engine_error)?;
    Ok(Json(report))
}

/// Current engine status: run state, counters, and effective config.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineStatus>, ApiError> {
    let status = state.orchestrator().status().await.map_err(engine_error)?;
    Ok(Json(status))
}
