//! Tool handlers for OpsClaw.
//!
//! Tools give the agent the ability to act on the host: install packages,
//! manage services, read and write files, and run shell commands. The set
//! of tools is the closed `ToolCall` enum in `opsclaw-core`; this crate
//! holds the handlers and the [`Dispatcher`] that routes calls to them.

pub mod dispatch;
pub mod file_read;
pub mod file_write;
pub mod package;
pub mod process;
pub mod service;
pub mod shell;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatch::Dispatcher;
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use sink::{DirectSink, ElevatedSink, FileSink};

use opsclaw_config::ToolsConfig;
use opsclaw_core::tool::{FailureKind, ToolResult};
use std::sync::Arc;

/// Create a dispatcher backed by real processes and the real filesystem.
///
/// Privileged commands and the elevated write path use
/// `tools.elevation_command` (default `sudo -n`, which fails instead of
/// prompting for a password).
pub fn default_dispatcher(config: &ToolsConfig) -> Dispatcher {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let elevated = Arc::new(ElevatedSink::new(
        runner.clone(),
        config.elevation_command.clone(),
    ));
    Dispatcher::new(config, runner, Arc::new(DirectSink), elevated)
}

/// Turn a finished process into a result carrying `{returncode, stdout, stderr}`.
pub(crate) fn command_result(output: &CommandOutput, tail_chars: usize) -> ToolResult {
    let data = output.to_data(tail_chars);
    let result = if output.success() {
        let stdout = process::tail(output.stdout.trim_end(), tail_chars);
        ToolResult::ok(if stdout.is_empty() {
            "(no output)".to_string()
        } else {
            stdout
        })
    } else {
        let code = output
            .exit_code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim_end()
        } else {
            output.stderr.trim_end()
        };
        ToolResult::error(
            FailureKind::Execution,
            format!("{code}: {}", process::tail(detail, tail_chars)),
        )
    };
    result.with_data(data).with_exit_code(output.exit_code)
}
