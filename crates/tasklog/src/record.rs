//! On-disk record format and the fold that rebuilds a task from it.

use chrono::{DateTime, Utc};
use opsclaw_core::error::{TaskLogError, TransitionError};
use opsclaw_core::task::{Step, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One line of a task's JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Created {
        task_id: TaskId,
        description: String,
        created_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_steps: Option<u32>,
    },
    Step {
        step: Step,
    },
    Status {
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        at: DateTime<Utc>,
    },
}

impl Record {
    pub fn created(task: &Task) -> Self {
        Record::Created {
            task_id: task.id.clone(),
            description: task.description.clone(),
            created_at: task.created_at,
            max_steps: task.max_steps,
        }
    }

    pub fn status(status: TaskStatus, reason: Option<&str>) -> Self {
        Record::Status {
            status,
            reason: reason.map(str::to_string),
            at: Utc::now(),
        }
    }

    /// Serialize as one newline-terminated line.
    pub fn to_line(&self) -> Result<String, TaskLogError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| TaskLogError::Storage(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

/// Whether `record` may follow the current state of `task`.
///
/// Status records must be forward moves and steps stop once the task is
/// terminal.
pub fn admit(task: &Task, record: &Record) -> Result<(), TaskLogError> {
    match record {
        Record::Step { .. } if task.status.is_terminal() => {
            Err(TaskLogError::Finished(task.id.to_string()))
        }
        Record::Status { status, .. } if !task.status.can_transition(*status) => {
            Err(TransitionError {
                from: task.status,
                to: *status,
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Rebuild a task from the text of its log.
///
/// Lines that fail to parse are torn writes from a crash and are skipped.
/// Appends after a crash start on a fresh line, so a torn record never
/// swallows the one after it. Records that [`admit`] rejects are skipped
/// too, so the first terminal status wins.
pub fn fold(task_id: &TaskId, content: &str) -> Result<Option<Task>, TaskLogError> {
    let mut task: Option<Task> = None;

    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(record) => apply(task_id, &mut task, record)?,
            Err(e) => {
                warn!(task_id = %task_id, line = i + 1, error = %e, "Skipping incomplete record");
            }
        }
    }

    Ok(task)
}

fn apply(task_id: &TaskId, task: &mut Option<Task>, record: Record) -> Result<(), TaskLogError> {
    if let Some(t) = task.as_ref()
        && let Err(e) = admit(t, &record)
    {
        warn!(task_id = %task_id, error = %e, "Skipping out-of-order record");
        return Ok(());
    }

    match (task.as_mut(), record) {
        (
            None,
            Record::Created {
                task_id: id,
                description,
                created_at,
                max_steps,
            },
        ) => {
            *task = Some(Task {
                id,
                description,
                status: TaskStatus::Queued,
                created_at,
                updated_at: created_at,
                max_steps,
                failure_reason: None,
                steps: Vec::new(),
            });
        }
        (Some(t), Record::Step { step }) => t.push_step(step),
        (Some(t), Record::Status { status, reason, at }) => {
            t.status = status;
            if reason.is_some() {
                t.failure_reason = reason;
            }
            t.updated_at = at;
        }
        (Some(_), Record::Created { .. }) => {
            return Err(TaskLogError::Corrupt {
                task_id: task_id.to_string(),
                reason: "duplicate created record".into(),
            });
        }
        (None, _) => {
            return Err(TaskLogError::Corrupt {
                task_id: task_id.to_string(),
                reason: "first record is not 'created'".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsclaw_core::tool::{ToolCall, ToolResult};
    use opsclaw_core::task::{ParseStrategy, StepOutcome};

    fn step(index: u32) -> Step {
        Step {
            index,
            raw_output: r#"{"tool":"done","args":{}}"#.into(),
            outcome: StepOutcome::Call {
                call: ToolCall::Done { summary: None },
                strategy: ParseStrategy::Strict,
                warnings: vec![],
            },
            result: ToolResult::ok("Task complete"),
            timestamp: Utc::now(),
        }
    }

    fn lines(records: &[Record]) -> String {
        records.iter().map(|r| r.to_line().unwrap()).collect()
    }

    #[test]
    fn fold_rebuilds_task() {
        let task = Task::new("check nginx");
        let content = lines(&[
            Record::created(&task),
            Record::status(TaskStatus::Running, None),
            Record::Step { step: step(1) },
            Record::status(TaskStatus::Completed, None),
        ]);

        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.id, task.id);
        assert_eq!(rebuilt.status, TaskStatus::Completed);
        assert_eq!(rebuilt.steps.len(), 1);
        assert_eq!(rebuilt.steps[0].outcome.call(), Some(&ToolCall::Done { summary: None }));
    }

    #[test]
    fn torn_trailing_line_is_ignored() {
        let task = Task::new("t");
        let mut content = lines(&[Record::created(&task), Record::Step { step: step(1) }]);
        content.push_str(r#"{"record":"step","step":{"index":2,"raw_out"#);

        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.steps.len(), 1);
        assert_eq!(rebuilt.status, TaskStatus::Queued);
    }

    #[test]
    fn torn_line_mid_file_is_skipped() {
        let task = Task::new("t");
        let content = format!(
            "{}{{\"record\":\"st\n{}",
            Record::created(&task).to_line().unwrap(),
            Record::status(TaskStatus::Running, None).to_line().unwrap()
        );
        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.status, TaskStatus::Running);
    }

    #[test]
    fn missing_created_record_is_corrupt() {
        let content = Record::status(TaskStatus::Running, None).to_line().unwrap();
        assert!(matches!(
            fold(&TaskId::from("x"), &content),
            Err(TaskLogError::Corrupt { .. })
        ));
    }

    #[test]
    fn empty_file_is_no_task() {
        assert!(fold(&TaskId::from("x"), "").unwrap().is_none());
    }

    #[test]
    fn failure_reason_survives() {
        let task = Task::new("t");
        let content = lines(&[
            Record::created(&task),
            Record::status(TaskStatus::Failed, Some("cancelled")),
        ]);
        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.failure_reason.as_deref(), Some("cancelled"));
    }

    #[test]
    fn first_terminal_status_wins() {
        let task = Task::new("t");
        let content = lines(&[
            Record::created(&task),
            Record::status(TaskStatus::Running, None),
            Record::status(TaskStatus::Failed, Some("stale on restart")),
            Record::Step { step: step(1) },
            Record::status(TaskStatus::Completed, None),
        ]);

        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.status, TaskStatus::Failed);
        assert_eq!(rebuilt.failure_reason.as_deref(), Some("stale on restart"));
        assert!(rebuilt.steps.is_empty());
    }

    #[test]
    fn backward_status_is_skipped() {
        let task = Task::new("t");
        let content = lines(&[
            Record::created(&task),
            Record::status(TaskStatus::Running, None),
            Record::status(TaskStatus::Queued, None),
        ]);
        let rebuilt = fold(&task.id, &content).unwrap().unwrap();
        assert_eq!(rebuilt.status, TaskStatus::Running);
    }

    #[test]
    fn admit_names_the_rejected_move() {
        let mut task = Task::new("t");
        task.transition(TaskStatus::Running, None).unwrap();
        task.transition(TaskStatus::Completed, None).unwrap();

        let err = admit(&task, &Record::status(TaskStatus::Running, None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Task log rejected move: cannot move task from completed to running"
        );
        assert!(matches!(
            admit(&task, &Record::Step { step: step(1) }),
            Err(TaskLogError::Finished(_))
        ));
    }
}
