//! Job listing and per-job control handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use hibiki_core::{Emotion, Job, JobStatus};

use super::run::{engine_error, ApiError, ErrorResponse, MessageResponse};
use crate::metrics::JOBS_REGENERATED_TOTAL;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by job status (pending, generating, completed, error)
    pub status: Option<String>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

/// Request body for regenerating a job
#[derive(Debug, Default, Deserialize)]
pub struct RegenerateBody {
    /// Emotion override; absent reverts the job to auto-detection
    pub emotion: Option<String>,
}

/// Request body for bulk reset
#[derive(Debug, Deserialize)]
pub struct ResetFromBody {
    pub from_id: u64,
}

/// Response for bulk reset
#[derive(Debug, Serialize)]
pub struct ResetFromResponse {
    pub reset: usize,
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

fn parse_status(value: &str) -> Result<JobStatus, ApiError> {
    match value {
        "pending" => Ok(JobStatus::Pending),
        "generating" => Ok(JobStatus::Generating),
        "completed" => Ok(JobStatus::Completed),
        "error" => Ok(JobStatus::Error),
        other => Err(bad_request(format!(
            "unknown status '{other}' (expected pending, generating, completed, or error)"
        ))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List all jobs, optionally filtered by status.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let filter = params.status.as_deref().map(parse_status).transpose()?;

    let snapshot = state
        .orchestrator()
        .ledger()
        .snapshot()
        .await
        .map_err(|e| engine_error(e.into()))?;

    let jobs: Vec<Job> = match filter {
        Some(status) => snapshot
            .jobs
            .into_iter()
            .filter(|j| j.status == status)
            .collect(),
        None => snapshot.jobs,
    };

    let total = jobs.len();
    Ok(Json(ListJobsResponse { jobs, total }))
}

/// Reset one job and synthesize it again, optionally with an emotion override.
pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    body: Option<Json<RegenerateBody>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let emotion = body
        .and_then(|Json(b)| b.emotion)
        .map(|s| Emotion::from_str(&s).map_err(|e| bad_request(e.to_string())))
        .transpose()?;

    state
        .orchestrator()
        .regenerate(id, emotion)
        .await
        .map_err(engine_error)?;
    JOBS_REGENERATED_TOTAL.inc();

    Ok(Json(MessageResponse {
        message: format!("Job {id} queued for regeneration"),
    }))
}

/// Reset every job with id >= from_id back to pending.
pub async fn reset_from(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResetFromBody>,
) -> Result<Json<ResetFromResponse>, ApiError> {
    let reset = state
        .orchestrator()
        .reset_from(body.from_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(ResetFromResponse { reset }))
}
