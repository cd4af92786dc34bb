//! Task submission, query, and cancellation endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use pipesmith_types::{Submission, Task, TaskStatus};

use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response for a submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: String,
}

/// Query params for listing tasks.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListTasksQuery {
    /// Maximum number of tasks to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Summary info for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub subject: String,
    pub status: TaskStatus,
    /// Number of recorded steps.
    pub steps: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Response for listing tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
}

fn task_to_summary(task: &Task) -> TaskSummary {
    TaskSummary {
        id: task.id.clone(),
        subject: task.subject.to_string(),
        status: task.status,
        steps: task.steps.len(),
        created_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/tasks - Submit a pipeline-generation task.
///
/// The task record is created synchronously; execution runs detached.
pub async fn submit_task_handler(
    State(state): State<AppState>,
    Json(submission): Json<Submission>,
) -> Result<(StatusCode, Json<SubmitResponse>), ServerError> {
    let task = state.executor().prepare(&submission).await?;
    let task_id = task.id.clone();
    state.spawn_execution(task, submission);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id,
            status: "accepted".to_string(),
        }),
    ))
}

/// GET /api/v1/tasks/{id} - Full task with its ordered step log. Read-only.
pub async fn get_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ServerError> {
    let task = state.store().get(&id).await?;
    Ok(Json(task))
}

/// GET /api/v1/tasks - Recently updated task summaries.
pub async fn list_tasks_handler(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ListTasksResponse>, ServerError> {
    let tasks = state.store().list(query.limit).await?;
    let summaries: Vec<TaskSummary> = tasks.iter().map(task_to_summary).collect();
    let total = summaries.len();
    Ok(Json(ListTasksResponse {
        tasks: summaries,
        total,
    }))
}

/// POST /api/v1/tasks/{id}/cancel - Cancel an in-flight task.
pub async fn cancel_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ServerError> {
    if state.cancel(&id) {
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                task_id: id,
                status: "cancelling".to_string(),
            }),
        ));
    }

    // No in-flight execution; explain why via the task record.
    let task = state.store().get(&id).await?;
    if task.status.is_terminal() {
        Err(ServerError::Conflict(format!(
            "task '{}' already {}",
            id,
            task.status.as_str()
        )))
    } else {
        Err(ServerError::Conflict(format!(
            "task '{}' is not executing in this server",
            id
        )))
    }
}
