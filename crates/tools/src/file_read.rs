//! File read tool: read the head of a file, bounded in size.

use opsclaw_core::error::ToolError;
use opsclaw_core::tool::{ToolName, ToolResult};
use tokio::io::AsyncReadExt;
use tracing::debug;

pub struct FileReadTool {
    limit_bytes: usize,
}

impl FileReadTool {
    pub fn new(limit_bytes: usize) -> Self {
        Self { limit_bytes }
    }

    pub async fn execute(&self, path: &str) -> Result<ToolResult, ToolError> {
        debug!(path = %path, limit = self.limit_bytes, "Reading file");

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| read_failed(path, e))?;

        // One byte past the limit tells us whether anything was cut.
        let mut buf = Vec::with_capacity(self.limit_bytes.min(64 * 1024));
        file.take(self.limit_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| read_failed(path, e))?;

        let truncated = buf.len() > self.limit_bytes;
        buf.truncate(self.limit_bytes);
        let content = String::from_utf8_lossy(&buf).into_owned();

        Ok(ToolResult::ok(content).with_data(serde_json::json!({
            "path": path,
            "bytes": buf.len(),
            "truncated": truncated,
        })))
    }
}

fn read_failed(path: &str, e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: ToolName::ReadFile.to_string(),
        reason: format!("{path}: {e}"),
    }
}
