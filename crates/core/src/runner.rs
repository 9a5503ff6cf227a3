//! TaskRunner trait, the seam between the scheduler and the agent loop.

use async_trait::async_trait;

use crate::task::{CancelFlag, Task};

/// Drives one queued task to a terminal state.
///
/// Implementations never return an error: every failure ends up recorded
/// on the returned task as a `failed` status with a reason.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: Task, cancel: CancelFlag) -> Task;
}
