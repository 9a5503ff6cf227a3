//! In-memory task log, for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use opsclaw_core::error::TaskLogError;
use opsclaw_core::task::{Step, Task, TaskId, TaskStatus, TaskSummary};
use opsclaw_core::task_log::{STALE_REASON, TaskLog};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every task in a map. Nothing survives the process.
pub struct InMemoryTaskLog {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskLog {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTaskLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskLog for InMemoryTaskLog {
    async fn create(&self, task: &Task) -> Result<(), TaskLogError> {
        let mut stored = task.clone();
        stored.steps.clear();
        self.tasks.write().await.insert(task.id.clone(), stored);
        Ok(())
    }

    async fn append(&self, task_id: &TaskId, step: &Step) -> Result<(), TaskLogError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskLogError::NotFound(task_id.to_string()))?;
        if task.status.is_terminal() {
            return Err(TaskLogError::Finished(task_id.to_string()));
        }
        task.push_step(step.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), TaskLogError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskLogError::NotFound(task_id.to_string()))?;
        task.transition(status, reason.map(str::to_string))?;
        Ok(())
    }

    async fn read(&self, task_id: &TaskId) -> Result<Option<Task>, TaskLogError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskSummary>, TaskLogError> {
        let mut summaries: Vec<TaskSummary> =
            self.tasks.read().await.values().map(Task::summary).collect();
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }

    async fn recover_stale(&self) -> Result<Vec<TaskId>, TaskLogError> {
        let mut tasks = self.tasks.write().await;
        let mut recovered = Vec::new();
        for task in tasks.values_mut().filter(|t| !t.status.is_terminal()) {
            task.status = TaskStatus::Failed;
            task.failure_reason = Some(STALE_REASON.to_string());
            task.updated_at = Utc::now();
            recovered.push(task.id.clone());
        }
        Ok(recovered)
    }
}
