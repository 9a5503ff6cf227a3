//! Shell tool: execute a command line exactly as given.
//!
//! No allowlist and no implicit elevation. If the model wants root it writes
//! `sudo` itself.

use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{ToolName, ToolResult};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command_result;
use crate::process::{CommandRunner, CommandSpec};

pub struct ShellTool {
    runner: Arc<dyn CommandRunner>,
    tail_chars: usize,
}

impl ShellTool {
    pub fn new(runner: Arc<dyn CommandRunner>, tail_chars: usize) -> Self {
        Self { runner, tail_chars }
    }

    pub async fn execute(&self, cmd: &str) -> Result<ToolResult, ToolError> {
        if cmd.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'cmd' must not be empty".into()));
        }

        debug!(cmd = %cmd, "Executing shell command");

        let command = CommandSpec::new("sh").args(["-c", cmd]);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolName::ShellExec.to_string(),
                reason: e.to_string(),
            })?;

        if !output.success() {
            warn!(cmd = %cmd, exit_code = ?output.exit_code, "Command failed");
        }

        Ok(command_result(&output, self.tail_chars))
    }
}
