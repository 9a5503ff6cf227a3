//! Package installation through the system package manager.

use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{ToolName, ToolResult};
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::command_result;
use crate::process::{CommandRunner, CommandSpec};

/// Debian package names plus the `name=version` and `name:arch` forms apt accepts.
static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.+_:=~-]*$").expect("package name pattern compiles")
});

pub struct PackageInstallTool {
    runner: Arc<dyn CommandRunner>,
    elevation: Vec<String>,
    package_manager: String,
    tail_chars: usize,
}

impl PackageInstallTool {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        elevation: Vec<String>,
        package_manager: impl Into<String>,
        tail_chars: usize,
    ) -> Self {
        Self {
            runner,
            elevation,
            package_manager: package_manager.into(),
            tail_chars,
        }
    }

    /// Refresh the index, then install. Stops at the first failing command.
    pub async fn execute(&self, name: &str) -> Result<ToolResult, ToolError> {
        if !PACKAGE_NAME.is_match(name) {
            return Err(ToolError::InvalidArguments(format!(
                "'{name}' is not a valid package name"
            )));
        }

        info!(package = %name, elevated = !self.elevation.is_empty(), "Installing package");

        let update = CommandSpec::new(&self.package_manager)
            .arg("update")
            .elevated(&self.elevation);
        let output = self.run(&update).await?;
        if !output.success() {
            warn!(exit_code = ?output.exit_code, "Package index update failed");
            return Ok(command_result(&output, self.tail_chars));
        }

        let install = CommandSpec::new(&self.package_manager)
            .args(["install", "-y", name])
            .elevated(&self.elevation);
        let output = self.run(&install).await?;
        if !output.success() {
            warn!(package = %name, exit_code = ?output.exit_code, "Package install failed");
        }
        Ok(command_result(&output, self.tail_chars))
    }

    async fn run(&self, command: &CommandSpec) -> Result<crate::process::CommandOutput, ToolError> {
        self.runner
            .run(command)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolName::PackageInstall.to_string(),
                reason: format!("{}: {e}", command.display()),
            })
    }
}
