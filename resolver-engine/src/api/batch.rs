//! Batch run API handlers
//!
//! POST /batch/run, GET /batch/status/:run_id. A single run may be
//! active at a time; triggering while one is running returns 409. The
//! run itself executes on a background task and deposits its report in
//! the registry, so the trigger call returns immediately.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{BatchOrchestrator, BatchReport, BatchRequest};
use crate::AppState;

/// Registry entry for one run, live or finished
#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `running` until the background task deposits its report
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Finished,
}

/// POST /batch/run response
#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
}

/// POST /batch/run
///
/// Returns 202 Accepted with the run id, or 409 when a run is already
/// active. Re-triggering after a crash or abort is the resume path:
/// every phase is re-entrant.
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    {
        let mut runs = state.runs.write().await;
        if let Some(active) = runs.values().find(|r| r.state == RunState::Running) {
            return Err(ApiError::Conflict(format!(
                "Batch run {} already active",
                active.run_id
            )));
        }
        runs.insert(
            run_id,
            RunEntry {
                run_id,
                started_at,
                state: RunState::Running,
                report: None,
            },
        );
    }

    tracing::info!(%run_id, mode = ?request.mode, dry_run = request.dry_run, "Batch run accepted");

    let task_state = state.clone();
    tokio::spawn(async move {
        let orchestrator = BatchOrchestrator::new(task_state.db.clone(), task_state.config.clone());
        let report = orchestrator.run_with_id(run_id, request).await;

        if let Some(error) = &report.error {
            *task_state.last_error.write().await = Some(error.clone());
        }

        let mut runs = task_state.runs.write().await;
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.state = RunState::Finished;
            entry.report = Some(report);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id,
            state: RunState::Running,
            started_at,
        }),
    ))
}

/// GET /batch/status/:run_id
pub async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunEntry>> {
    let runs = state.runs.read().await;
    let entry = runs
        .get(&run_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))?;
    Ok(Json(entry))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch/run", post(start_run))
        .route("/batch/status/:run_id", get(run_status))
}
