//! Read file tool.

use crate::{Tool, ToolContext, ToolError};
use serde_json::Value;

/// Maximum output size in characters before truncation.
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Built-in tool for reading files.
pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file and returns its content as text."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;

        if !std::path::Path::new(path).exists() {
            return Err(ToolError::PathNotFound(path.to_string()));
        }

        let content = tokio::fs::read_to_string(path).await?;
        if content.chars().count() > MAX_OUTPUT_CHARS {
            let truncated: String = content.chars().take(MAX_OUTPUT_CHARS).collect();
            return Ok(format!(
                "{truncated}\n\n... (output truncated — exceeded {MAX_OUTPUT_CHARS} character limit)"
            ));
        }
        Ok(content)
    }
}
