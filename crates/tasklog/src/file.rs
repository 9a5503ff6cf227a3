//! File-based task log: one JSON-lines file per task.
//!
//! Storage location: `<task_log.dir>/<task_id>.jsonl`
//!
//! Every record is written with a single `write_all` under a writer lock and
//! synced before the call returns, so a step acknowledged by `append` survives
//! a crash. Under the same lock the current task is folded first, and steps or
//! status records it cannot accept are refused. Files are human-inspectable with `tail -f`.

use async_trait::async_trait;
use opsclaw_core::error::TaskLogError;
use opsclaw_core::task::{Step, Task, TaskId, TaskStatus, TaskSummary};
use opsclaw_core::task_log::{STALE_REASON, TaskLog};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::record::{Record, admit, fold};

pub struct FileTaskLog {
    dir: PathBuf,
    writer: Mutex<()>,
}

impl FileTaskLog {
    /// Open (and create if needed) a task log directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, TaskLogError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            TaskLogError::Storage(format!("Failed to create {}: {e}", dir.display()))
        })?;
        debug!(dir = %dir.display(), "File task log opened");
        Ok(Self {
            dir,
            writer: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Task ids become file names, so only UUID-like ids are accepted.
    fn path_for(&self, task_id: &TaskId) -> Option<PathBuf> {
        let id = task_id.as_str();
        let safe = !id.is_empty()
            && id.len() <= 64
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        safe.then(|| self.dir.join(format!("{id}.jsonl")))
    }

    async fn write_record(
        &self,
        task_id: &TaskId,
        record: &Record,
        must_exist: bool,
    ) -> Result<(), TaskLogError> {
        let path = self
            .path_for(task_id)
            .ok_or_else(|| TaskLogError::NotFound(task_id.to_string()))?;
        let mut line = record.to_line()?;

        let _guard = self.writer.lock().await;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(storage(&path, e)),
        };
        if must_exist {
            let current = match content.as_deref() {
                Some(content) => fold(task_id, content)?,
                None => None,
            };
            let current = current.ok_or_else(|| TaskLogError::NotFound(task_id.to_string()))?;
            admit(&current, record)?;
        }

        // A torn earlier write leaves no newline; start on a fresh line so
        // only the torn record is lost.
        if content.is_some_and(|c| !c.is_empty() && !c.ends_with('\n')) {
            line.insert(0, '\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| storage(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| storage(&path, e))?;
        file.sync_data().await.map_err(|e| storage(&path, e))?;
        Ok(())
    }

    async fn read_path(&self, task_id: &TaskId, path: &Path) -> Result<Option<Task>, TaskLogError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => fold(task_id, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage(path, e)),
        }
    }
}

fn storage(path: &Path, e: std::io::Error) -> TaskLogError {
    TaskLogError::Storage(format!("{}: {e}", path.display()))
}

#[async_trait]
impl TaskLog for FileTaskLog {
    async fn create(&self, task: &Task) -> Result<(), TaskLogError> {
        self.write_record(&task.id, &Record::created(task), false)
            .await
    }

    async fn append(&self, task_id: &TaskId, step: &Step) -> Result<(), TaskLogError> {
        self.write_record(task_id, &Record::Step { step: step.clone() }, true)
            .await
    }

    async fn set_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), TaskLogError> {
        self.write_record(task_id, &Record::status(status, reason), true)
            .await
    }

    async fn read(&self, task_id: &TaskId) -> Result<Option<Task>, TaskLogError> {
        match self.path_for(task_id) {
            Some(path) => self.read_path(task_id, &path).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<TaskSummary>, TaskLogError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| storage(&self.dir, e))?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| storage(&self.dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let task_id = TaskId::from(stem);
            match self.read_path(&task_id, &path).await {
                Ok(Some(task)) => summaries.push(task.summary()),
                Ok(None) => {}
                Err(e) => warn!(task_id = %task_id, error = %e, "Skipping unreadable task log"),
            }
        }

        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }

    async fn recover_stale(&self) -> Result<Vec<TaskId>, TaskLogError> {
        let mut recovered = Vec::new();
        for summary in self.list().await? {
            if summary.status.is_terminal() {
                continue;
            }
            self.set_status(&summary.task_id, TaskStatus::Failed, Some(STALE_REASON))
                .await?;
            recovered.push(summary.task_id);
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "Marked stale tasks as failed");
        }
        Ok(recovered)
    }
}
