//! Run API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use acquire_core::{
    orchestrator::OVERALL_STEPS, ManagedArtifact, OrchestratorError, RunDescriptor, RunHandle,
    RunReference, TaskStatus,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a run
#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    /// Local path, `file://` URL or `repo://` reference
    pub reference: String,
}

/// Response for run operations
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub status: TaskStatus,
    /// Whether a run loop is driving the run
    pub active: bool,
    pub overall_message: String,
    pub overall_progress: f64,
    pub overall_maximum: f64,
    pub item_message: String,
    pub item_progress: u64,
    pub item_maximum: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ManagedArtifact>,
}

impl From<&RunHandle> for RunResponse {
    fn from(handle: &RunHandle) -> Self {
        let snapshot = handle.snapshot();
        Self {
            run_id: snapshot.run_id,
            status: snapshot.status,
            active: handle.is_active(),
            overall_message: snapshot.overall_message,
            overall_progress: snapshot.overall_progress,
            overall_maximum: snapshot.overall_maximum,
            item_message: snapshot.item_message,
            item_progress: snapshot.item_progress,
            item_maximum: snapshot.item_maximum,
            artifact: snapshot.artifact,
        }
    }
}

impl From<&RunDescriptor> for RunResponse {
    fn from(descriptor: &RunDescriptor) -> Self {
        let total = descriptor.part_urls.len();
        let done = descriptor.downloaded.len();
        Self {
            run_id: descriptor.run_id.clone(),
            status: descriptor.status,
            active: false,
            overall_message: descriptor.metadata.display_name.clone(),
            overall_progress: 0.0,
            overall_maximum: OVERALL_STEPS,
            item_message: format!("{} of {} parts downloaded", done, total),
            item_progress: done as u64,
            item_maximum: total as u64,
            artifact: None,
        }
    }
}

/// Response for listing runs
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunResponse>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct RunErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<RunErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(RunErrorResponse {
            error: error.into(),
        }),
    )
}

fn not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Run not found: {}", id))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

impl From<OrchestratorError> for RunErrorResponse {
    fn from(e: OrchestratorError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

fn command_error(e: OrchestratorError) -> ApiError {
    let status = match &e {
        OrchestratorError::InvalidState { .. } => StatusCode::CONFLICT,
        OrchestratorError::RunNotActive(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(RunErrorResponse::from(e)))
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Pause,
    Resume,
    Cancel,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a run, or return the live run for the same reference
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRunBody>,
) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    let reference = body.reference.trim();
    RunReference::parse(reference)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let (handle, started) = state.start_run(reference).await;
    if started {
        info!("Started run {}", reference);
        Ok((StatusCode::CREATED, Json(RunResponse::from(&handle))))
    } else {
        Ok((StatusCode::OK, Json(RunResponse::from(&handle))))
    }
}

/// List tracked runs plus persisted runs without a live loop
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let mut runs: Vec<RunResponse> = state
        .handles()
        .await
        .iter()
        .map(RunResponse::from)
        .collect();

    let tracked: HashSet<String> = runs
        .iter()
        .filter(|r| r.active)
        .map(|r| r.run_id.clone())
        .collect();
    runs.retain(|r| r.active || r.status.is_terminal());

    let descriptors = state.descriptors().map_err(internal)?;
    runs.extend(
        descriptors
            .iter()
            .filter(|d| !tracked.contains(&d.run_id))
            .map(RunResponse::from),
    );

    Ok(Json(ListRunsResponse {
        total: runs.len(),
        runs,
    }))
}

/// Get a run by ID
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    if let Some(handle) = state.handle(&id).await {
        if handle.is_active() || handle.snapshot().status.is_terminal() {
            return Ok(Json(RunResponse::from(&handle)));
        }
    }

    match state.descriptor(&id).map_err(internal)? {
        Some(descriptor) => Ok(Json(RunResponse::from(&descriptor))),
        None => Err(not_found(&id)),
    }
}

/// Pause a running run
pub async fn pause_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    command(&state, &id, Lifecycle::Pause).await
}

/// Resume a paused or incomplete run
pub async fn resume_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    command(&state, &id, Lifecycle::Resume).await
}

/// Cancel a run and discard its cached files
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    command(&state, &id, Lifecycle::Cancel).await
}

async fn command(
    state: &AppState,
    id: &str,
    op: Lifecycle,
) -> Result<Json<RunResponse>, ApiError> {
    let handle = state
        .attach(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(id))?;

    let result = match op {
        Lifecycle::Pause => handle.pause().await,
        Lifecycle::Resume => handle.resume().await,
        Lifecycle::Cancel => handle.cancel().await,
    };
    let status = result.map_err(command_error)?;
    info!("{:?} {} -> {}", op, id, status);

    Ok(Json(RunResponse::from(&handle)))
}
