//! Conversation data model and streaming events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A turn in LLM history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: MessageContent,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message carrying tool calls (and optional text).
    #[must_use]
    pub fn assistant_with_tools(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::ToolCalls { text, tool_calls },
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::ToolResult(ToolResultContent {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
            }),
        }
    }

    /// Text content, if this is a plain text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Tool calls, if this is an assistant tool-call message.
    #[must_use]
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match &self.content {
            MessageContent::ToolCalls { tool_calls, .. } => Some(tool_calls),
            _ => None,
        }
    }

    /// Tool result content, if this is a tool message.
    #[must_use]
    pub fn tool_result_content(&self) -> Option<&ToolResultContent> {
        match &self.content {
            MessageContent::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// Tool result.
    Tool,
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Assistant tool calls with optional accompanying text.
    ToolCalls {
        /// Text emitted alongside the calls, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// The tool calls, in emission order.
        tool_calls: Vec<ToolCall>,
    },
    /// Tool result.
    ToolResult(ToolResultContent),
}

/// The payload of a tool result message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    /// The tool call this result answers.
    pub tool_call_id: String,
    /// Result text handed back to the model.
    pub content: String,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Assembled arguments.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call with empty arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Parameter JSON schema.
    pub input_schema: Value,
}

impl LlmToolDefinition {
    /// Create a definition with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// The model requested tool calls.
    ToolCalls,
    /// Output limit reached.
    Length,
    /// Content filtered.
    ContentFilter,
}

impl FinishReason {
    /// Parse a provider finish-reason string; unknown values map to `Stop`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tool_calls" => Self::ToolCalls,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Stop,
        }
    }
}

/// Streaming event from the model.
///
/// Tool-call fields arrive partially and are keyed by `index`; the id may
/// only be present on the first delta for a call. [`crate::ToolCallAccumulator`]
/// merges deltas into complete calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Partial assistant text.
    TextDelta(String),
    /// Partial tool-call fields for the call at `index`.
    ToolCallDelta {
        /// Provider-assigned call index within this response.
        index: usize,
        /// Call id, when present in this delta.
        id: Option<String>,
        /// Tool name, when present in this delta.
        name: Option<String>,
        /// Incremental arguments JSON piece.
        args_delta: Option<String>,
    },
    /// The provider signalled a finish reason.
    Finished(FinishReason),
    /// Token usage report.
    Usage {
        /// Input tokens.
        input_tokens: usize,
        /// Output tokens.
        output_tokens: usize,
    },
    /// Stream completed.
    Done,
}
