//! Task and Step domain types.
//!
//! A [`Task`] is one natural-language request and the ordered [`Step`]s the
//! agent loop took to satisfy it. Steps are append-only, and task status only
//! ever moves forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    StepLimitExceeded,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::StepLimitExceeded
        )
    }

    /// Whether `self → to` is a legal forward move.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        match (self, to) {
            (TaskStatus::Queued, TaskStatus::Running) => true,
            // Cancelled before start, or found stale on restart.
            (TaskStatus::Queued, TaskStatus::Failed) => true,
            (TaskStatus::Running, to) => to.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::StepLimitExceeded => "step_limit_exceeded",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parser strategy produced a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Strict,
    Fenced,
    FirstCall,
    Lenient,
}

/// Non-fatal annotations attached to a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseWarning {
    /// The model sent more than one call (or extra prose); only the first was kept.
    CollapsedToFirstCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureReason {
    NoJson,
    InvalidSchema,
    UnregisteredTool,
    InvalidArgs,
}

impl fmt::Display for ParseFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseFailureReason::NoJson => "no_json",
            ParseFailureReason::InvalidSchema => "invalid_schema",
            ParseFailureReason::UnregisteredTool => "unregistered_tool",
            ParseFailureReason::InvalidArgs => "invalid_args",
        })
    }
}

/// Model output that did not yield a valid tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub reason: ParseFailureReason,
    pub detail: String,
    /// The original model text. Not persisted: the owning step already holds it.
    #[serde(skip)]
    pub raw: String,
}

impl ParseFailure {
    pub fn new(reason: ParseFailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            raw: String::new(),
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }
}

/// What the parser made of one model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Call {
        call: ToolCall,
        strategy: ParseStrategy,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<ParseWarning>,
    },
    ParseFailure {
        reason: ParseFailureReason,
        detail: String,
    },
}

impl StepOutcome {
    pub fn call(&self) -> Option<&ToolCall> {
        match self {
            StepOutcome::Call { call, .. } => Some(call),
            StepOutcome::ParseFailure { .. } => None,
        }
    }
}

/// One iteration of the agent loop: one model call, one parse outcome, one result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position within the task
    pub index: u32,
    pub raw_output: String,
    pub outcome: StepOutcome,
    pub result: ToolResult,
    pub timestamp: DateTime<Utc>,
}

/// A natural-language task and its transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Per-task step budget. `None` means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            description: description.into(),
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
            max_steps: None,
            failure_reason: None,
            steps: Vec::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Move to `to`, rejecting any backward or post-terminal move.
    pub fn transition(
        &mut self,
        to: TaskStatus,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if reason.is_some() {
            self.failure_reason = reason;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn push_step(&mut self, step: Step) {
        self.updated_at = step.timestamp;
        self.steps.push(step);
    }

    pub fn next_index(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id.clone(),
            description: self.description.clone(),
            status: self.status,
            step_count: self.steps.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Status view of a task without its transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Failure reason recorded for a task cancelled before it finished.
pub const CANCELLED_REASON: &str = "cancelled";

/// Cooperative cancellation request, checked at the top of each iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolResult;

    fn step(index: u32) -> Step {
        Step {
            index,
            raw_output: "{}".into(),
            outcome: StepOutcome::ParseFailure {
                reason: ParseFailureReason::InvalidSchema,
                detail: "missing tool".into(),
            },
            result: ToolResult::ok("noop"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_task_is_queued() {
        let task = Task::new("check nginx status");
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.steps.is_empty());
        assert_eq!(task.next_index(), 1);
    }

    #[test]
    fn forward_transitions_succeed() {
        let mut task = Task::new("t");
        task.transition(TaskStatus::Running, None).unwrap();
        task.transition(TaskStatus::Completed, None).unwrap();
        assert!(task.status.is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut task = Task::new("t");
        task.transition(TaskStatus::Running, None).unwrap();
        task.transition(TaskStatus::StepLimitExceeded, None).unwrap();
        let err = task.transition(TaskStatus::Running, None).unwrap_err();
        assert_eq!(err.from, TaskStatus::StepLimitExceeded);
        assert!(task.transition(TaskStatus::Failed, None).is_err());
    }

    #[test]
    fn queued_task_can_fail_without_running() {
        let mut task = Task::new("t");
        task.transition(TaskStatus::Failed, Some(CANCELLED_REASON.into()))
            .unwrap();
        assert_eq!(task.failure_reason.as_deref(), Some("cancelled"));
        assert!(task.transition(TaskStatus::Running, None).is_err());
    }

    #[test]
    fn queued_cannot_jump_to_completed() {
        let mut task = Task::new("t");
        assert!(task.transition(TaskStatus::Completed, None).is_err());
    }

    #[test]
    fn summary_counts_steps() {
        let mut task = Task::new("t");
        task.push_step(step(1));
        task.push_step(step(2));
        let summary = task.summary();
        assert_eq!(summary.step_count, 2);
        assert_eq!(task.next_index(), 3);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::StepLimitExceeded).unwrap();
        assert_eq!(json, "\"step_limit_exceeded\"");
    }

    #[test]
    fn step_outcome_is_tagged() {
        let json = serde_json::to_value(step(1).outcome).unwrap();
        assert_eq!(json["kind"], "parse_failure");
        assert_eq!(json["reason"], "invalid_schema");
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
