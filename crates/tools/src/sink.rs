//! File write seams: a plain writer and an elevated one.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::process::{CommandRunner, CommandSpec};

#[async_trait]
pub trait FileSink: Send + Sync {
    /// Replace the file at `path` with `content`, creating parent
    /// directories as needed.
    async fn write(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// Writes as the agent's own user.
#[derive(Debug, Default)]
pub struct DirectSink;

#[async_trait]
impl FileSink for DirectSink {
    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }
}

/// Writes through the elevation prefix: `mkdir -p <parent>`, then
/// `tee <path>` with the content on stdin.
pub struct ElevatedSink {
    runner: Arc<dyn CommandRunner>,
    prefix: Vec<String>,
}

impl ElevatedSink {
    pub fn new(runner: Arc<dyn CommandRunner>, prefix: Vec<String>) -> Self {
        Self { runner, prefix }
    }

    async fn run(&self, command: CommandSpec) -> io::Result<()> {
        let command = command.elevated(&self.prefix);
        let output = self.runner.run(&command).await?;
        if output.success() {
            Ok(())
        } else {
            let reason = output.stderr.trim();
            Err(io::Error::other(format!(
                "`{}` exited with {}: {}",
                command.display(),
                output
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                if reason.is_empty() { "no error output" } else { reason }
            )))
        }
    }
}

#[async_trait]
impl FileSink for ElevatedSink {
    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if self.prefix.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "privilege escalation is disabled (tools.elevation_command is empty)",
            ));
        }

        let target = path.to_string_lossy().into_owned();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            self.run(
                CommandSpec::new("mkdir")
                    .arg("-p")
                    .arg(parent.to_string_lossy()),
            )
            .await?;
        }
        self.run(CommandSpec::new("tee").arg(target).stdin(content))
            .await
    }
}
