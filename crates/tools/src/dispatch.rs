//! Routes a validated [`ToolCall`] to its handler.
//!
//! `dispatch` never fails to the caller. Handler errors, panics and timeouts
//! all come back as `error` results the model can react to.

use futures::FutureExt;
use opsclaw_config::ToolsConfig;
use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{FailureKind, ToolCall, ToolName, ToolResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::file_read::FileReadTool;
use crate::file_write::FileWriteTool;
use crate::package::PackageInstallTool;
use crate::process::CommandRunner;
use crate::service::ServiceControlTool;
use crate::shell::ShellTool;
use crate::sink::FileSink;

pub struct Dispatcher {
    package: PackageInstallTool,
    service: ServiceControlTool,
    read: FileReadTool,
    write: FileWriteTool,
    shell: ShellTool,
    tool_timeout: Duration,
    package_timeout: Duration,
}

impl Dispatcher {
    /// Wire every handler to the given process and file seams.
    pub fn new(
        config: &ToolsConfig,
        runner: Arc<dyn CommandRunner>,
        direct: Arc<dyn FileSink>,
        elevated: Arc<dyn FileSink>,
    ) -> Self {
        let tail = config.output_tail_chars;
        Self {
            package: PackageInstallTool::new(
                runner.clone(),
                config.elevation_command.clone(),
                config.package_manager.clone(),
                tail,
            ),
            service: ServiceControlTool::new(runner.clone(), config.elevation_command.clone(), tail),
            read: FileReadTool::new(config.read_limit_bytes),
            write: FileWriteTool::new(direct, elevated),
            shell: ShellTool::new(runner, tail),
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            package_timeout: Duration::from_secs(config.package_timeout_secs),
        }
    }

    fn timeout_for(&self, name: ToolName) -> Duration {
        match name {
            ToolName::PackageInstall => self.package_timeout,
            _ => self.tool_timeout,
        }
    }

    /// Execute one call under its timeout, capturing panics.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let name = call.name();
        let limit = self.timeout_for(name);
        debug!(tool = %name, timeout_secs = limit.as_secs(), "Dispatching tool call");

        let guarded = AssertUnwindSafe(self.execute(call)).catch_unwind();
        match tokio::time::timeout(limit, guarded).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(tool = %name, error = %e, "Tool failed");
                e.into()
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(tool = %name, panic = %message, "Tool handler panicked");
                ToolResult::error(
                    FailureKind::Execution,
                    format!("{name} handler crashed: {message}"),
                )
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = limit.as_secs(), "Tool timed out");
                ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: limit.as_secs(),
                }
                .into()
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        match call {
            ToolCall::PackageInstall { name } => self.package.execute(name).await,
            ToolCall::ServiceControl { action, name } => self.service.execute(*action, name).await,
            ToolCall::ReadFile { path } => self.read.execute(path).await,
            ToolCall::WriteFile { path, content } => self.write.execute(path, content).await,
            ToolCall::ShellExec { cmd } => self.shell.execute(cmd).await,
            ToolCall::Done { summary } => Ok(ToolResult::ok(
                summary.clone().unwrap_or_else(|| "Task complete".into()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        HangingRunner, PanickingRunner, RecordingSink, ScriptedRunner, exited,
    };
    use opsclaw_core::tool::{ServiceAction, ToolStatus};

    fn dispatcher(runner: Arc<dyn CommandRunner>) -> Dispatcher {
        Dispatcher::new(
            &ToolsConfig::default(),
            runner,
            Arc::new(RecordingSink::denied()),
            Arc::new(RecordingSink::ok()),
        )
    }

    #[tokio::test]
    async fn routes_service_call() {
        let runner = Arc::new(ScriptedRunner::new(vec![exited(0, "active (running)", "")]));
        let d = dispatcher(runner.clone());

        let result = d
            .dispatch(&ToolCall::ServiceControl {
                action: ServiceAction::Status,
                name: "nginx".into(),
            })
            .await;
        assert_eq!(result.status, ToolStatus::Ok);
        assert_eq!(runner.commands(), vec!["sudo -n systemctl status nginx"]);
    }

    #[tokio::test]
    async fn done_is_never_executed() {
        let runner = Arc::new(ScriptedRunner::default());
        let d = dispatcher(runner.clone());

        let result = d
            .dispatch(&ToolCall::Done {
                summary: Some("nginx is running".into()),
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(result.output, "nginx is running");
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn handler_error_becomes_result() {
        let d = dispatcher(Arc::new(ScriptedRunner::default()));
        let result = d
            .dispatch(&ToolCall::PackageInstall {
                name: "bad name".into(),
            })
            .await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::InvalidArgs));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_tool_times_out() {
        let d = dispatcher(Arc::new(HangingRunner));
        let result = d
            .dispatch(&ToolCall::ShellExec {
                cmd: "sleep 1000".into(),
            })
            .await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert!(result.output.contains("60s"));
    }

    #[tokio::test(start_paused = true)]
    async fn package_install_gets_longer_timeout() {
        let d = dispatcher(Arc::new(HangingRunner));
        let result = d
            .dispatch(&ToolCall::PackageInstall {
                name: "nginx".into(),
            })
            .await;
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert!(result.output.contains("300s"));
    }

    #[tokio::test]
    async fn panic_is_captured() {
        let d = dispatcher(Arc::new(PanickingRunner));
        let result = d
            .dispatch(&ToolCall::ShellExec { cmd: "uptime".into() })
            .await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::Execution));
        assert!(result.output.contains("runner exploded"));
    }

    #[tokio::test]
    async fn write_escalates_through_dispatch() {
        let d = dispatcher(Arc::new(ScriptedRunner::default()));
        let result = d
            .dispatch(&ToolCall::WriteFile {
                path: "/etc/app.conf".into(),
                content: "x=1".into(),
            })
            .await;
        assert!(result.is_ok());
        assert!(result.used_privilege_escalation);
    }
}
