//! Error types for the OpsClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

use crate::task::TaskStatus;

/// The top-level error type for all OpsClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model endpoint errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval endpoint errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Task log errors ---
    #[error("Task log error: {0}")]
    TaskLog(#[from] TaskLogError),

    // --- Lifecycle errors ---
    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval timed out after {0}s")]
    Timeout(u64),

    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid retrieval response: {0}")]
    InvalidResponse(String),
}

/// Failures raised by tool handlers. The dispatcher converts every one of
/// these into an `error` [`ToolResult`](crate::tool::ToolResult).
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error(
        "Write to {path} failed unprivileged ({unprivileged}) and escalated ({escalated})"
    )]
    EscalationExhausted {
        path: String,
        unprivileged: String,
        escalated: String,
    },
}

#[derive(Debug, Error)]
pub enum TaskLogError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt task log {task_id}: {reason}")]
    Corrupt { task_id: String, reason: String },

    #[error("Task log rejected move: {0}")]
    Transition(#[from] TransitionError),

    #[error("Task {0} is finished, no more steps accepted")]
    Finished(String),
}

#[derive(Debug, Clone, Error)]
#[error("cannot move task from {from} to {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Task description is empty")]
    EmptyTask,

    #[error("Failed to record task: {0}")]
    Log(String),
}
