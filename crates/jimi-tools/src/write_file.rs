//! Write file tool.

use crate::{Tool, ToolContext, ToolError};
use serde_json::Value;

/// Built-in tool for writing files.
///
/// Sensitive: the engine consults the approval arbiter with action kind
/// `write_file` before this executes.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file. Creates parent directories if they don't exist. \
         Overwrites the file if it already exists."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn action_kind(&self) -> Option<&str> {
        Some("write_file")
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;

        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let path = std::path::Path::new(path);
        if !path.is_absolute() {
            return Err(ToolError::InvalidArguments(
                "path must be an absolute path".into(),
            ));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;

        let bytes = content.len();
        Ok(format!("Wrote {bytes} bytes to {}", path.display()))
    }
}
