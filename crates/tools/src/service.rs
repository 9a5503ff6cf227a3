//! Service management through systemctl.

use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{ServiceAction, ToolName, ToolResult};
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

use crate::command_result;
use crate::process::{CommandRunner, CommandSpec};

/// systemd unit names, including templated `name@instance.service`.
static UNIT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9@._:-]*$").expect("unit name pattern compiles")
});

pub struct ServiceControlTool {
    runner: Arc<dyn CommandRunner>,
    elevation: Vec<String>,
    tail_chars: usize,
}

impl ServiceControlTool {
    pub fn new(runner: Arc<dyn CommandRunner>, elevation: Vec<String>, tail_chars: usize) -> Self {
        Self {
            runner,
            elevation,
            tail_chars,
        }
    }

    pub async fn execute(
        &self,
        action: ServiceAction,
        name: &str,
    ) -> Result<ToolResult, ToolError> {
        if !UNIT_NAME.is_match(name) {
            return Err(ToolError::InvalidArguments(format!(
                "'{name}' is not a valid service name"
            )));
        }

        info!(
            service = %name,
            action = action.as_str(),
            elevated = !self.elevation.is_empty(),
            "Service control"
        );

        let command = CommandSpec::new("systemctl")
            .args([action.as_str(), name])
            .elevated(&self.elevation);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolName::ServiceControl.to_string(),
                reason: format!("{}: {e}", command.display()),
            })?;

        Ok(command_result(&output, self.tail_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedRunner, exited};
    use opsclaw_core::tool::ToolStatus;

    #[tokio::test]
    async fn status_runs_systemctl() {
        let runner = Arc::new(ScriptedRunner::new(vec![exited(
            0,
            "● nginx.service - A high performance web server\n   Active: active (running)",
            "",
        )]));
        let tool = ServiceControlTool::new(runner.clone(), vec!["sudo".into(), "-n".into()], 2000);

        let result = tool.execute(ServiceAction::Status, "nginx").await.unwrap();
        assert!(result.is_ok());
        assert!(result.output.contains("active (running)"));
        assert_eq!(runner.commands(), vec!["sudo -n systemctl status nginx"]);
    }

    #[tokio::test]
    async fn elevation_prefix_is_not_escalation() {
        let runner = Arc::new(ScriptedRunner::default());
        let tool = ServiceControlTool::new(runner.clone(), vec!["sudo".into(), "-n".into()], 2000);

        let result = tool.execute(ServiceAction::Restart, "nginx").await.unwrap();
        assert!(result.is_ok());
        assert!(!result.used_privilege_escalation);
        assert_eq!(runner.commands(), vec!["sudo -n systemctl restart nginx"]);
    }

    #[tokio::test]
    async fn inactive_service_is_error_result() {
        let runner = Arc::new(ScriptedRunner::new(vec![exited(3, "inactive (dead)", "")]));
        let tool = ServiceControlTool::new(runner, vec![], 2000);

        let result = tool.execute(ServiceAction::Status, "nginx").await.unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn templated_unit_accepted_injection_rejected() {
        let runner = Arc::new(ScriptedRunner::default());
        let tool = ServiceControlTool::new(runner.clone(), vec![], 2000);

        assert!(tool.execute(ServiceAction::Restart, "getty@tty1.service").await.is_ok());
        assert!(matches!(
            tool.execute(ServiceAction::Stop, "nginx && reboot").await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert_eq!(runner.commands(), vec!["systemctl restart getty@tty1.service"]);
    }
}
