//! Task API handlers.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use opsclaw_core::error::SubmitError;
use opsclaw_core::task::{Step, TaskId, TaskStatus, TaskSummary};
use opsclaw_core::tool::{REGISTRY, ToolSpec};
use opsclaw_scheduler::CancelOutcome;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tasks", post(submit_task_handler).get(list_tasks_handler))
        .route("/tasks/{id}", get(get_task_handler))
        .route("/tasks/{id}/steps", get(get_steps_handler))
        .route("/tasks/{id}/cancel", post(cancel_task_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub task: String,
    /// Per-task step budget, capped by `agent.max_steps`.
    #[serde(default)]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// `rejected` for refused submissions, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(code: StatusCode, error: &str, detail: Option<String>) -> ApiError {
    (
        code,
        Json(ErrorBody {
            status: None,
            error: error.into(),
            detail,
        }),
    )
}

fn rejected(code: StatusCode, error: &str, detail: Option<String>) -> ApiError {
    let (code, Json(mut body)) = api_error(code, error, detail);
    body.status = Some("rejected".into());
    (code, Json(body))
}

fn storage_error(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Task log unavailable");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "task_log_error",
        Some(e.to_string()),
    )
}

fn not_found(id: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "not_found",
        Some(format!("no task with id {id}")),
    )
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: TaskId,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: &'static [ToolSpec],
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub agent: String,
    pub llm: String,
    pub rag: String,
}

fn health_word(ok: bool) -> String {
    let word = if ok { "ok" } else { "error" };
    word.to_string()
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn banner_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "OpsClaw",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /tasks": "Submit a task: {\"task\": \"...\", \"max_steps\": 10}",
            "GET /tasks": "List tasks",
            "GET /tasks/{id}": "Task status",
            "GET /tasks/{id}/steps": "Task transcript",
            "POST /tasks/{id}/cancel": "Cancel a task",
            "GET /tools": "Tool schema table",
            "GET /health": "Agent, model, and retrieval health",
        }
    }))
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (llm, rag) = tokio::join!(state.provider.health_check(), state.retriever.health_check());
    let llm = llm.unwrap_or_else(|e| {
        warn!(error = %e, "Model endpoint health check failed");
        false
    });
    let rag = rag.unwrap_or_else(|e| {
        warn!(error = %e, "Retrieval health check failed");
        false
    });

    Json(HealthResponse {
        agent: health_word(state.scheduler.is_accepting()),
        llm: health_word(llm),
        rag: health_word(rag),
    })
}

async fn list_tools_handler() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: REGISTRY,
        count: REGISTRY.len(),
    })
}

async fn submit_task_handler(
    State(state): State<SharedState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    if req.max_steps == Some(0) {
        return Err(rejected(
            StatusCode::BAD_REQUEST,
            "invalid_max_steps",
            Some("max_steps must be at least 1".into()),
        ));
    }

    match state.scheduler.submit(&req.task, req.max_steps).await {
        Ok(task_id) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                task_id,
                status: TaskStatus::Queued.to_string(),
            }),
        )),
        Err(SubmitError::QueueFull { capacity }) => {
            warn!(capacity, "Rejected task: queue full");
            Err(rejected(
                StatusCode::SERVICE_UNAVAILABLE,
                "queue_full",
                Some(format!("queue capacity {capacity} reached")),
            ))
        }
        Err(SubmitError::EmptyTask) => Err(rejected(StatusCode::BAD_REQUEST, "empty_task", None)),
        Err(SubmitError::ShuttingDown) => Err(rejected(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            None,
        )),
        Err(e @ SubmitError::Log(_)) => {
            error!(error = %e, "Could not record task");
            Err(rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                "task_log_error",
                Some(e.to_string()),
            ))
        }
    }
}

async fn list_tasks_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<TaskSummary>>, ApiError> {
    state.log.list().await.map(Json).map_err(storage_error)
}

async fn get_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<TaskSummary>, ApiError> {
    let task = state
        .log
        .read(&TaskId(id.clone()))
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(task.summary()))
}

async fn get_steps_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Step>>, ApiError> {
    let task = state
        .log
        .read(&TaskId(id.clone()))
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(task.steps))
}

async fn cancel_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let task_id = TaskId(id.clone());
    let outcome = state
        .scheduler
        .cancel(&task_id)
        .await
        .map_err(storage_error)?;

    match outcome {
        CancelOutcome::Accepted => Ok((
            StatusCode::ACCEPTED,
            Json(CancelResponse { task_id, outcome }),
        )),
        CancelOutcome::NotFound => Err(not_found(&id)),
        CancelOutcome::AlreadyTerminal => {
            let status = state
                .log
                .read(&task_id)
                .await
                .ok()
                .flatten()
                .map(|t| t.status.to_string());
            Err(api_error(StatusCode::CONFLICT, "already_terminal", status))
        }
    }
}
