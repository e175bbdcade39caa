//! REST API for the manager
//!
//! Clients submit task events here, list the manager's task view and request
//! stops. Handlers only touch the pending queue and the task DB; the dispatch
//! loop does the talking to workers.

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

use crate::manager::Manager;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
}

/// Creates the manager API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::TASKS, get(list_tasks).post(submit_task))
        .route(
            "/tasks/{task_id}",
            get(get_task).delete(stop_task),
        )
        .with_state(state)
}

/// GET /tasks: snapshot of the manager's task view.
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.manager.tasks().await)
}

/// GET /tasks/{task_id}: a single task, 404 when unknown.
async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    state
        .manager
        .task(task_id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(task_id))
}

/// POST /tasks: accept a task event onto the pending queue.
///
/// Strict decoding: malformed JSON or unknown fields produce a 400 with the
/// error envelope and nothing is queued.
async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(event) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected task submission");
        ApiError::BadRequest(rejection.body_text())
    })?;

    state.manager.add_event(event).await;
    Ok(StatusCode::CREATED)
}

/// DELETE /tasks/{task_id}: request a stop for a known task.
///
/// The stop travels the same path as a submission: a `Completed` event
/// embedding a `Completed` copy of the task, queued for dispatch.
async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let Some(mut task) = state.manager.task(task_id).await else {
        warn!(task_id = %task_id, "Stop requested for unknown task");
        return Err(ApiError::NotFound(task_id));
    };

    task.state = TaskState::Completed;
    let event = TaskEvent::new(TaskState::Completed, task);
    info!(task_id = %task_id, event_id = %event.id, "Stop accepted");
    state.manager.add_event(event).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Error type for all manager API handlers
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
