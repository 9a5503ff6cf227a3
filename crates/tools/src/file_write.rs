//! File write tool with fail-then-escalate semantics.
//!
//! The plain write always goes first. Only a permission failure triggers the
//! elevated retry, and that retry happens exactly once.

use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{ToolName, ToolResult};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::sink::FileSink;

pub struct FileWriteTool {
    direct: Arc<dyn FileSink>,
    elevated: Arc<dyn FileSink>,
}

impl FileWriteTool {
    pub fn new(direct: Arc<dyn FileSink>, elevated: Arc<dyn FileSink>) -> Self {
        Self { direct, elevated }
    }

    pub async fn execute(&self, path: &str, content: &str) -> Result<ToolResult, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'path' must not be empty".into()));
        }
        let target = Path::new(path);
        let written = format!("Wrote {} bytes to {path}", content.len());

        let denied = match self.direct.write(target, content).await {
            Ok(()) => {
                info!(path = %path, escalated = false, "File written");
                return Ok(ToolResult::ok(written));
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => e,
            Err(e) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: ToolName::WriteFile.to_string(),
                    reason: format!("{path}: {e}"),
                });
            }
        };

        warn!(path = %path, error = %denied, "Write denied, retrying with privilege escalation");

        match self.elevated.write(target, content).await {
            Ok(()) => {
                info!(path = %path, escalated = true, "File written");
                Ok(ToolResult::ok(written).escalated(true))
            }
            Err(e) => Err(ToolError::EscalationExhausted {
                path: path.to_string(),
                unprivileged: denied.to_string(),
                escalated: e.to_string(),
            }),
        }
    }
}
