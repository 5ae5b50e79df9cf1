//! OpenAI-compatible streaming chat-completions client.
//!
//! Works with the `OpenAI` API and any compatible endpoint (vLLM, Ollama,
//! LM Studio). Tool-call deltas are surfaced raw, keyed by index; the
//! engine assembles them with [`crate::ToolCallAccumulator`].

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, ProviderConfig, StreamBox};
use crate::types::{
    FinishReason, LlmToolDefinition, Message, MessageContent, MessageRole, StreamEvent,
};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_CONTEXT: usize = 128_000;

/// OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    client: Client,
    model: String,
    max_tokens: usize,
    temperature: Option<f64>,
    top_p: Option<f64>,
    base_url: String,
    api_key: Option<String>,
    max_context: usize,
}

impl OpenAiCompatProvider {
    /// Build a provider from a [`ProviderConfig`].
    #[must_use]
    pub fn from_config(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key: if config.api_key.is_empty() {
                None
            } else {
                Some(config.api_key)
            },
            max_context: config.context_window.unwrap_or(DEFAULT_MAX_CONTEXT),
        }
    }

    /// Build the chat-completions request body.
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> Value {
        let mut wire_messages = Vec::new();

        if !system.is_empty() {
            wire_messages.push(serde_json::json!({
                "role": "system",
                "content": system
            }));
        }

        for msg in messages {
            wire_messages.push(convert_message(msg));
        }

        let mut request = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": self.max_tokens,
            "stream": true
        });

        if let Some(temperature) = self.temperature {
            request["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = self.top_p {
            request["top_p"] = serde_json::json!(top_p);
        }

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    // Strict endpoints reject a missing `properties` field.
                    let mut parameters = t.input_schema.clone();
                    if let Some(obj) = parameters.as_object_mut() {
                        obj.entry("properties")
                            .or_insert_with(|| serde_json::json!({}));
                    }
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": parameters
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(wire_tools);
        }

        request
    }
}

fn convert_message(msg: &Message) -> Value {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    };

    match &msg.content {
        MessageContent::Text(text) => {
            serde_json::json!({
                "role": role,
                "content": text
            })
        },
        MessageContent::ToolCalls { text, tool_calls } => {
            let wire_calls: Vec<Value> = tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": serde_json::to_string(&tc.arguments).unwrap_or_default()
                        }
                    })
                })
                .collect();

            serde_json::json!({
                "role": "assistant",
                "content": text.clone().map_or(Value::Null, Value::String),
                "tool_calls": wire_calls
            })
        },
        MessageContent::ToolResult(result) => {
            serde_json::json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id,
                "content": result.content
            })
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_context_length(&self) -> usize {
        self.max_context
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<StreamBox> {
        // Remote endpoints require an API key; local ones typically do not.
        if self.api_key.as_ref().is_none_or(String::is_empty) && !is_local_url(&self.base_url) {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: "openai-compat".to_string(),
            });
        }

        let request_body = self.build_request(messages, tools, system);

        debug!(
            model = %self.model,
            base_url = %self.base_url,
            "Starting chat-completions stream"
        );

        let mut request = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            let mut auth_value =
                reqwest::header::HeaderValue::try_from(format!("Bearer {api_key}"))
                    .map_err(|e| LlmError::ApiRequestFailed(format!("invalid API key: {e}")))?;
            auth_value.set_sensitive(true);
            request = request.header("Authorization", auth_value);
        }

        let response = request
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Chat-completions error");
            return Err(LlmError::Http { status, body });
        }

        let stream = try_stream! {
            use futures::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::StreamingError(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete SSE events, delimited by blank lines.
                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    buffer = buffer
                        .get(event_end.saturating_add(2)..)
                        .unwrap_or_default()
                        .to_string();

                    for line in event_data.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim() == "[DONE]" {
                            yield StreamEvent::Done;
                            return;
                        }
                        let Ok(event) = serde_json::from_str::<SseChunk>(data) else {
                            continue;
                        };
                        if let Some(usage) = &event.usage {
                            yield StreamEvent::Usage {
                                input_tokens: usage.prompt_tokens,
                                output_tokens: usage.completion_tokens,
                            };
                        }
                        let Some(choice) = event.choices.first() else {
                            continue;
                        };
                        if let Some(content) = &choice.delta.content
                            && !content.is_empty()
                        {
                            yield StreamEvent::TextDelta(content.clone());
                        }
                        if let Some(tool_calls) = &choice.delta.tool_calls {
                            for tc in tool_calls {
                                let (name, args) = match &tc.function {
                                    Some(f) => (f.name.clone(), f.arguments.clone()),
                                    None => (None, None),
                                };
                                yield StreamEvent::ToolCallDelta {
                                    index: tc.index,
                                    id: tc.id.clone(),
                                    name,
                                    args_delta: args,
                                };
                            }
                        }
                        if let Some(reason) = &choice.finish_reason {
                            yield StreamEvent::Finished(FinishReason::parse(reason));
                        }
                    }
                }
            }

            yield StreamEvent::Done;
        };

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("max_tokens", &self.max_tokens)
            .field("max_context", &self.max_context)
            .finish_non_exhaustive()
    }
}

// Streaming response shapes.

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    usage: Option<SseUsage>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    content: Option<String>,
    tool_calls: Option<Vec<SseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCall {
    index: usize,
    id: Option<String>,
    function: Option<SseFunction>,
}

#[derive(Debug, Deserialize)]
struct SseFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

/// Whether a URL points at a local endpoint that needs no API key.
fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
}
