//! The agent task loop.

use chrono::Utc;
use opsclaw_config::AppConfig;
use opsclaw_core::error::{ProviderError, RetrievalError};
use opsclaw_core::provider::{Provider, ProviderRequest};
use opsclaw_core::retriever::{ContextRetriever, RetrievedContext};
use opsclaw_core::runner::TaskRunner;
use opsclaw_core::task::{CANCELLED_REASON, CancelFlag, Step, Task, TaskStatus};
use opsclaw_core::task_log::TaskLog;
use opsclaw_core::tool::ToolResult;
use opsclaw_tools::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::parser::{self, ParseOutcome};
use crate::prompt;

/// How a task's loop ended.
#[derive(Debug, PartialEq)]
enum Exit {
    Completed,
    StepLimit,
    Failed(String),
}

impl Exit {
    fn status(&self) -> TaskStatus {
        match self {
            Exit::Completed => TaskStatus::Completed,
            Exit::StepLimit => TaskStatus::StepLimitExceeded,
            Exit::Failed(_) => TaskStatus::Failed,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            Exit::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Drives one task from `queued` to a terminal state.
///
/// Each iteration fetches context, asks the model for exactly one tool
/// call, parses and dispatches it, and persists the resulting step before
/// deciding whether to go on.
pub struct AgentLoop {
    /// The model endpoint
    provider: Arc<dyn Provider>,

    /// Background snippets for the task description
    retriever: Arc<dyn ContextRetriever>,

    dispatcher: Arc<Dispatcher>,

    /// Durable transcript
    log: Arc<dyn TaskLog>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Upper bound on steps; per-task budgets are capped by it
    max_steps: u32,

    /// Unparseable responses in a row before the task fails
    max_consecutive_failures: u32,

    reject_unknown_args: bool,
    model_timeout: Duration,
    retrieval_timeout: Duration,
}

impl AgentLoop {
    /// Create a loop with default bounds.
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn ContextRetriever>,
        dispatcher: Arc<Dispatcher>,
        log: Arc<dyn TaskLog>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            retriever,
            dispatcher,
            log,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            max_steps: 15,
            max_consecutive_failures: 3,
            reject_unknown_args: false,
            model_timeout: Duration::from_secs(180),
            retrieval_timeout: Duration::from_secs(5),
        }
    }

    /// Create a loop with every bound taken from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn ContextRetriever>,
        dispatcher: Arc<Dispatcher>,
        log: Arc<dyn TaskLog>,
    ) -> Self {
        Self::new(
            provider,
            retriever,
            dispatcher,
            log,
            config.provider.model.clone(),
        )
        .with_temperature(config.provider.temperature)
        .with_max_tokens(config.provider.max_tokens)
        .with_max_steps(config.agent.max_steps)
        .with_max_consecutive_failures(config.agent.max_consecutive_failures)
        .with_reject_unknown_args(config.agent.reject_unknown_args)
        .with_model_timeout(Duration::from_secs(config.provider.timeout_secs))
        .with_retrieval_timeout(Duration::from_secs(config.retrieval.timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn with_reject_unknown_args(mut self, reject: bool) -> Self {
        self.reject_unknown_args = reject;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    /// Step budget for a task: its own limit if set, never above the configured one.
    pub fn step_budget(&self, task: &Task) -> u32 {
        task.max_steps
            .map_or(self.max_steps, |own| own.min(self.max_steps))
            .max(1)
    }

    /// Run a task to completion. Never fails: every problem ends up as the
    /// task's status and failure reason.
    pub async fn run(&self, mut task: Task, cancel: &CancelFlag) -> Task {
        if let Err(e) = self.move_to(&mut task, TaskStatus::Running, None).await {
            warn!(task_id = %task.id, error = %e, "Task not started");
            return task;
        }

        let budget = self.step_budget(&task);
        info!(task_id = %task.id, max_steps = budget, "Task started");

        let exit = self.drive(&mut task, budget, cancel).await;
        match &exit {
            Exit::Completed => info!(task_id = %task.id, steps = task.steps.len(), "Task completed"),
            Exit::StepLimit => {
                warn!(task_id = %task.id, steps = task.steps.len(), "Step limit reached")
            }
            Exit::Failed(reason) => {
                error!(task_id = %task.id, steps = task.steps.len(), reason = %reason, "Task failed")
            }
        }

        if let Err(e) = self.move_to(&mut task, exit.status(), exit.reason()).await {
            error!(task_id = %task.id, error = %e, "Failed to record final status");
        }
        task
    }

    /// Apply a status change in memory, then persist it.
    async fn move_to(
        &self,
        task: &mut Task,
        to: TaskStatus,
        reason: Option<String>,
    ) -> opsclaw_core::Result<()> {
        task.transition(to, reason.clone())?;
        self.log
            .set_status(&task.id, to, reason.as_deref())
            .await?;
        Ok(())
    }

    async fn drive(&self, task: &mut Task, budget: u32, cancel: &CancelFlag) -> Exit {
        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Exit::Failed(CANCELLED_REASON.into());
            }

            let index = task.next_index();
            debug!(task_id = %task.id, step = index, max_steps = budget, "Agent loop iteration");

            let context = match self.fetch_context(&task.description).await {
                Ok(context) => context,
                Err(reason) => return Exit::Failed(reason),
            };

            let raw = match self.ask_model(task, &context).await {
                Ok(raw) => raw,
                Err(reason) => return Exit::Failed(reason),
            };

            let parsed = parser::parse(&raw, self.reject_unknown_args);
            let (result, finished) = match &parsed {
                ParseOutcome::Call { call, warnings, .. } => {
                    consecutive_failures = 0;
                    if !warnings.is_empty() {
                        warn!(task_id = %task.id, step = index, ?warnings, "Model sent more than one call");
                    }
                    let result = self.dispatcher.dispatch(call).await;
                    debug!(
                        task_id = %task.id,
                        step = index,
                        tool = %call.name(),
                        status = ?result.status,
                        exit_code = ?result.exit_code,
                        escalated = result.used_privilege_escalation,
                        "Tool finished"
                    );
                    (result, call.is_done())
                }
                ParseOutcome::Failure(failure) => {
                    consecutive_failures += 1;
                    warn!(
                        task_id = %task.id,
                        step = index,
                        reason = %failure.reason,
                        detail = %failure.detail,
                        consecutive = consecutive_failures,
                        "Unusable model response"
                    );
                    (ToolResult::from_parse_failure(failure), false)
                }
            };

            let step = Step {
                index,
                raw_output: raw,
                outcome: parsed.into_step_outcome(),
                result,
                timestamp: Utc::now(),
            };
            if let Err(e) = self.log.append(&task.id, &step).await {
                return Exit::Failed(format!("task log write failed: {e}"));
            }
            task.push_step(step);

            if finished {
                return Exit::Completed;
            }
            if consecutive_failures >= self.max_consecutive_failures {
                return Exit::Failed(format!(
                    "{consecutive_failures} consecutive unusable model responses"
                ));
            }
            if task.steps.len() as u32 >= budget {
                return Exit::StepLimit;
            }
        }
    }

    /// Retrieval timeouts are fatal; any other retrieval error degrades to
    /// an empty context.
    async fn fetch_context(&self, query: &str) -> Result<RetrievedContext, String> {
        let timeout_secs = self.retrieval_timeout.as_secs();
        match tokio::time::timeout(self.retrieval_timeout, self.retriever.retrieve(query)).await {
            Ok(Ok(context)) => {
                debug!(retriever = self.retriever.name(), hits = context.len(), "Context retrieved");
                Ok(context)
            }
            Ok(Err(RetrievalError::Timeout(secs))) => {
                Err(format!("retrieval timed out after {secs}s"))
            }
            Ok(Err(e)) => {
                warn!(retriever = self.retriever.name(), error = %e, "Retrieval failed, continuing without context");
                Ok(Vec::new())
            }
            Err(_) => Err(format!("retrieval timed out after {timeout_secs}s")),
        }
    }

    async fn ask_model(&self, task: &Task, context: &[String]) -> Result<String, String> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: prompt::build_messages(task, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let timeout_secs = self.model_timeout.as_secs();
        match tokio::time::timeout(self.model_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => {
                debug!(task_id = %task.id, model = %response.model, chars = response.content.len(), "Model responded");
                Ok(response.content)
            }
            Ok(Err(ProviderError::Timeout(secs))) => {
                Err(format!("model call timed out after {secs}s"))
            }
            Ok(Err(e)) => Err(format!("model call failed: {e}")),
            Err(_) => Err(format!("model call timed out after {timeout_secs}s")),
        }
    }
}

#[async_trait::async_trait]
impl TaskRunner for AgentLoop {
    async fn run(&self, task: Task, cancel: CancelFlag) -> Task {
        AgentLoop::run(self, task, &cancel).await
    }
}
