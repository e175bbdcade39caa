//! REST API for the worker
//!
//! The manager drives this surface: it posts task events, lists the worker's
//! task records during reconcile, and can read host stats. Handlers only
//! touch the queue and the record map; the dispatcher loop does the actual
//! container work, so no request ever blocks on the runtime.

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared::api::endpoints;
use shared::task::{State as TaskState, Task, TaskEvent};
use shared::ErrorResponse;

use crate::stats::WorkerStats;
use crate::worker::Worker;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
}

/// Creates the worker API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::TASKS, get(list_tasks).post(submit_task))
        .route("/tasks/{task_id}", axum::routing::delete(stop_task))
        .route(endpoints::STATS, get(get_stats))
        .with_state(state)
}

/// GET /tasks: snapshot of all task records.
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.worker.tasks().await)
}

/// POST /tasks: accept a task event and enqueue its embedded task.
///
/// The body is strict-decoded: malformed JSON or unknown fields produce a
/// 400 with the error envelope, and nothing is enqueued.
async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(event) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected task event submission");
        ApiError::BadRequest(rejection.body_text())
    })?;

    info!(
        event_id = %event.id,
        task_id = %event.task.id,
        desired_state = %event.task.state,
        "Accepted task event"
    );
    state.worker.add_task(event.task).await;
    Ok(StatusCode::CREATED)
}

/// DELETE /tasks/{task_id}: request a stop for a known task.
///
/// Unknown ids get a 404; known ones are re-enqueued as a `Completed` copy
/// for the dispatcher to stop.
async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let Some(mut task) = state.worker.task(task_id).await else {
        warn!(task_id = %task_id, "Stop requested for unknown task");
        return Err(ApiError::NotFound(task_id));
    };

    task.state = TaskState::Completed;
    info!(task_id = %task_id, "Stop accepted");
    state.worker.add_task(task).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /stats: latest host metrics snapshot.
async fn get_stats(State(state): State<AppState>) -> Json<WorkerStats> {
    Json(state.worker.stats().await)
}

/// Error type for all worker API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request body decode failed: {0}")]
    BadRequest(String),
    #[error("task {0} not found")]
    NotFound(Uuid),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(ErrorResponse::new(status.as_u16(), self.to_string()));
        (status, body).into_response()
    }
}
