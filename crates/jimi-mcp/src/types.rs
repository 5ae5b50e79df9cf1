//! MCP wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 request or notification (no `id`).
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub(crate) fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }

    pub(crate) fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params: None,
        }
    }
}

/// A JSON-RPC 2.0 response line.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    /// Tool name on the server.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Parameter JSON schema.
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    /// Content parts; text parts carry `{"type": "text", "text": ...}`.
    #[serde(default)]
    pub content: Vec<Value>,
    /// Whether the call failed on the server.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// The first `text` content part, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|part| part.get("text").and_then(Value::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(1, "tools/call", serde_json::json!({"name": "t"}));
        let line = serde_json::to_string(&request).unwrap();
        assert!(line.contains("\"jsonrpc\":\"2.0\""));
        assert!(line.contains("\"id\":1"));

        let notification = JsonRpcRequest::notification("notifications/initialized");
        let line = serde_json::to_string(&notification).unwrap();
        assert!(!line.contains("\"id\""));
    }

    #[test]
    fn test_call_result_first_text() {
        let result: CallToolResult = serde_json::from_str(
            r#"{"content": [{"type": "image", "data": "x"}, {"type": "text", "text": "hello"}]}"#,
        )
        .unwrap();
        assert_eq!(result.first_text(), Some("hello"));
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_info_defaults_schema() {
        let info: McpToolInfo = serde_json::from_str(r#"{"name": "search"}"#).unwrap();
        assert_eq!(info.input_schema["type"], "object");
    }
}
