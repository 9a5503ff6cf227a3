//! Task scheduler: a bounded FIFO queue drained by a fixed worker pool.
//!
//! Submissions beyond the queue capacity are rejected immediately rather than
//! buffered, so callers see backpressure. Capacity is reserved before the task
//! is written to the log, which means a rejected submission leaves no trace.
//!
//! Cancellation is cooperative. A queued task is failed on the spot and
//! skipped by the workers; a running task has its [`CancelFlag`] set and stops
//! at the top of its next iteration.

use futures::FutureExt;
use opsclaw_config::SchedulerConfig;
use opsclaw_core::error::{SubmitError, TaskLogError};
use opsclaw_core::runner::TaskRunner;
use opsclaw_core::task::{CANCELLED_REASON, CancelFlag, Task, TaskId, TaskStatus};
use opsclaw_core::task_log::TaskLog;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Accepted,
    NotFound,
    AlreadyTerminal,
}

/// Where a live task is.
enum Slot {
    Queued(CancelFlag),
    Running(CancelFlag),
}

type ActiveTasks = Arc<Mutex<HashMap<TaskId, Slot>>>;

pub struct Scheduler {
    /// `None` once shutdown has begun.
    sender: std::sync::Mutex<Option<mpsc::Sender<Task>>>,
    capacity: usize,
    log: Arc<dyn TaskLog>,
    active: ActiveTasks,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn `worker_pool_size` workers. Must be called inside a Tokio runtime.
    pub fn start(
        config: &SchedulerConfig,
        runner: Arc<dyn TaskRunner>,
        log: Arc<dyn TaskLog>,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Task>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let active: ActiveTasks = Arc::new(Mutex::new(HashMap::new()));

        let workers = (0..config.worker_pool_size.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    rx.clone(),
                    runner.clone(),
                    log.clone(),
                    active.clone(),
                ))
            })
            .collect();

        info!(
            workers = config.worker_pool_size.max(1),
            queue_capacity = capacity,
            "Scheduler started"
        );

        Self {
            sender: std::sync::Mutex::new(Some(tx)),
            capacity,
            log,
            active,
            workers: Mutex::new(workers),
        }
    }

    /// Whether new submissions are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.current_sender().is_some_and(|tx| !tx.is_closed())
    }

    fn current_sender(&self) -> Option<mpsc::Sender<Task>> {
        self.sender.lock().ok().and_then(|guard| guard.clone())
    }

    /// Queue a new task.
    ///
    /// `max_steps` is the task's own budget; the agent caps it at the
    /// configured maximum.
    pub async fn submit(
        &self,
        description: &str,
        max_steps: Option<u32>,
    ) -> Result<TaskId, SubmitError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SubmitError::EmptyTask);
        }

        let tx = self.current_sender().ok_or(SubmitError::ShuttingDown)?;
        let permit = tx.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => SubmitError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(()) => SubmitError::ShuttingDown,
        })?;

        let mut task = Task::new(description);
        task.max_steps = max_steps;
        self.log
            .create(&task)
            .await
            .map_err(|e| SubmitError::Log(e.to_string()))?;

        let id = task.id.clone();
        self.active
            .lock()
            .await
            .insert(id.clone(), Slot::Queued(CancelFlag::new()));
        permit.send(task);

        info!(task_id = %id, "Task queued");
        Ok(id)
    }

    /// Request cancellation of a task.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<CancelOutcome, TaskLogError> {
        let mut active = self.active.lock().await;
        match active.get(task_id) {
            Some(Slot::Running(flag)) => {
                flag.cancel();
                info!(task_id = %task_id, "Cancellation requested for running task");
                return Ok(CancelOutcome::Accepted);
            }
            Some(Slot::Queued(flag)) => {
                flag.cancel();
                active.remove(task_id);
                self.log
                    .set_status(task_id, TaskStatus::Failed, Some(CANCELLED_REASON))
                    .await?;
                info!(task_id = %task_id, "Queued task cancelled");
                return Ok(CancelOutcome::Accepted);
            }
            None => {}
        }
        drop(active);

        Ok(match self.log.read(task_id).await? {
            None => CancelOutcome::NotFound,
            Some(task) if task.status.is_terminal() => CancelOutcome::AlreadyTerminal,
            Some(_) => {
                // Known to the log but not to this scheduler.
                debug!(task_id = %task_id, "Cancel for a task this process does not own");
                CancelOutcome::NotFound
            }
        })
    }

    /// Stop accepting tasks, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    runner: Arc<dyn TaskRunner>,
    log: Arc<dyn TaskLog>,
    active: ActiveTasks,
) {
    debug!(worker, "Worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        let id = task.id.clone();

        let cancel = {
            let mut active = active.lock().await;
            match active.remove(&id) {
                Some(Slot::Queued(flag)) => {
                    active.insert(id.clone(), Slot::Running(flag.clone()));
                    Some(flag)
                }
                Some(slot @ Slot::Running(_)) => {
                    active.insert(id.clone(), slot);
                    None
                }
                None => None,
            }
        };
        let Some(cancel) = cancel else {
            debug!(worker, task_id = %id, "Skipping cancelled task");
            continue;
        };

        debug!(worker, task_id = %id, "Worker picked up task");
        let outcome = AssertUnwindSafe(runner.run(task, cancel)).catch_unwind().await;
        if outcome.is_err() {
            error!(worker, task_id = %id, "Task runner panicked");
            if let Err(e) = log
                .set_status(&id, TaskStatus::Failed, Some("task runner crashed"))
                .await
            {
                warn!(task_id = %id, error = %e, "Could not record crashed task");
            }
        }

        active.lock().await.remove(&id);
    }
    debug!(worker, "Worker stopped");
}
