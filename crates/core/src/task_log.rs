//! TaskLog trait, durable storage for task transcripts.
//!
//! Steps are persisted one at a time as they happen, so a task's status and
//! transcript can be read back at any point, including after a crash.

use async_trait::async_trait;

use crate::error::TaskLogError;
use crate::task::{Step, Task, TaskId, TaskStatus, TaskSummary};

#[async_trait]
pub trait TaskLog: Send + Sync {
    /// Record a newly queued task.
    async fn create(&self, task: &Task) -> Result<(), TaskLogError>;

    /// Append one step. Must be durable before returning.
    async fn append(&self, task_id: &TaskId, step: &Step) -> Result<(), TaskLogError>;

    /// Record a status change, with the failure reason if any.
    async fn set_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), TaskLogError>;

    /// Rebuild a task from its records.
    async fn read(&self, task_id: &TaskId) -> Result<Option<Task>, TaskLogError>;

    /// Summaries of every known task, oldest first.
    async fn list(&self) -> Result<Vec<TaskSummary>, TaskLogError>;

    /// Mark every non-terminal task failed. Called once at startup.
    async fn recover_stale(&self) -> Result<Vec<TaskId>, TaskLogError>;
}

/// Failure reason recorded by [`TaskLog::recover_stale`].
pub const STALE_REASON: &str = "stale on restart";
