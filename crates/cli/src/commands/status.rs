//! `opsclaw status` and `opsclaw logs`: read a task from the local log.

use opsclaw_core::task::{Step, StepOutcome, Task, TaskId};
use opsclaw_core::task_log::TaskLog;
use opsclaw_tasklog::FileTaskLog;

async fn load_task(task_id: String) -> Result<Task, Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let log = FileTaskLog::open(&config.task_log.dir).await?;
    let task = log
        .read(&TaskId(task_id.clone()))
        .await?
        .ok_or_else(|| format!("No task with id {task_id}"))?;
    Ok(task)
}

pub async fn status(task_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let task = load_task(task_id).await?;

    println!("🦀 OpsClaw Task");
    println!("==================");
    println!("  Id:           {}", task.id);
    println!("  Task:         {}", task.description);
    println!("  Status:       {}", task.status);
    println!("  Steps:        {}", task.steps.len());
    println!("  Created:      {}", task.created_at.to_rfc3339());
    println!("  Updated:      {}", task.updated_at.to_rfc3339());
    if let Some(reason) = &task.failure_reason {
        println!("  Reason:       {reason}");
    }

    Ok(())
}

pub async fn logs(task_id: String, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let task = load_task(task_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task.steps)?);
    } else {
        print_transcript(&task.steps);
    }

    Ok(())
}

/// One block per step: what the model said, what was parsed, what happened.
pub(crate) fn print_transcript(steps: &[Step]) {
    for step in steps {
        println!("── Step {} ({}) ──", step.index, step.timestamp.to_rfc3339());
        println!("  Model:  {}", step.raw_output.trim());
        match &step.outcome {
            StepOutcome::Call { call, strategy, warnings } => {
                let call = serde_json::to_string(call).unwrap_or_default();
                println!("  Call:   {call} [{strategy:?}]");
                if !warnings.is_empty() {
                    println!("  Note:   {warnings:?}");
                }
            }
            StepOutcome::ParseFailure { reason, detail } => {
                println!("  Parse:  {reason}: {detail}");
            }
        }
        let marker = if step.result.is_ok() { "ok" } else { "error" };
        let escalated = if step.result.used_privilege_escalation {
            " (escalated)"
        } else {
            ""
        };
        println!("  Result: {marker}{escalated}");
        for line in step.result.output.lines() {
            println!("    {line}");
        }
    }
}
