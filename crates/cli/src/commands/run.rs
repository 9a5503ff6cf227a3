//! `opsclaw run`: execute one task in the foreground.

use std::sync::Arc;

use opsclaw_agent::AgentLoop;
use opsclaw_core::provider::Provider;
use opsclaw_core::task::{CancelFlag, Task, TaskStatus};
use opsclaw_core::task_log::TaskLog;
use opsclaw_providers::OpenAiCompatProvider;
use opsclaw_tasklog::FileTaskLog;
use tracing::warn;

use super::status::print_transcript;

pub async fn run(description: String, max_steps: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    let description = description.trim();
    if description.is_empty() {
        return Err("Task description is empty".into());
    }
    if max_steps == Some(0) {
        return Err("--max-steps must be at least 1".into());
    }

    let log: Arc<dyn TaskLog> = Arc::new(FileTaskLog::open(&config.task_log.dir).await?);
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let retriever = opsclaw_providers::retriever_from_config(&config.retrieval)?;
    let dispatcher = Arc::new(opsclaw_tools::default_dispatcher(&config.tools));
    let agent = AgentLoop::from_config(&config, provider, retriever, dispatcher, log.clone());

    let mut task = Task::new(description);
    if let Some(steps) = max_steps {
        task = task.with_max_steps(steps);
    }
    log.create(&task).await?;

    eprintln!("  Task {} (budget {} steps)", task.id, agent.step_budget(&task));

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let task = agent.run(task, &cancel).await;

    print_transcript(&task.steps);
    println!();
    match task.status {
        TaskStatus::Completed => println!("  ✅ {}", task.status),
        status => println!(
            "  ❌ {status}{}",
            task.failure_reason
                .as_deref()
                .map(|r| format!(": {r}"))
                .unwrap_or_default()
        ),
    }

    Ok(())
}
