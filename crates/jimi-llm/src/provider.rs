//! LLM provider trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::LlmResult;
use crate::types::{LlmToolDefinition, Message, StreamEvent};

/// Type alias for boxed event streams.
pub type StreamBox = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// Streaming chat-completion provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Model identifier in use.
    fn model(&self) -> &str;

    /// Stream a completion.
    ///
    /// Returns a stream of events as the model generates output. Tool
    /// schemas in `tools` are advertised to the model.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<StreamBox>;

    /// Approximate token count of `text`.
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    /// Maximum context length in tokens.
    fn max_context_length(&self) -> usize;
}

/// Blanket implementation so `Box<dyn LlmProvider>` satisfies bounds that
/// take a concrete provider type.
#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<StreamBox> {
        (**self).stream(messages, tools, system).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn max_context_length(&self) -> usize {
        (**self).max_context_length()
    }
}

/// Configuration for constructing a provider.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key (may be empty for local endpoints).
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f64>,
    /// Chat-completions endpoint URL.
    pub base_url: Option<String>,
    /// Context window override.
    pub context_window: Option<usize>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("has_base_url", &self.base_url.is_some())
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a config with an API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: None,
            top_p: None,
            base_url: None,
            context_window: None,
        }
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    /// Set the nucleus sampling parameter.
    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p.clamp(0.0, 1.0));
        self
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the context window override.
    #[must_use]
    pub fn context_window(mut self, size: usize) -> Self {
        self.context_window = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::new("key", "gpt-4o")
            .max_tokens(2048)
            .temperature(0.3)
            .base_url("http://localhost:1234/v1/chat/completions");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.temperature, Some(0.3));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = ProviderConfig::new("secret", "m");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
    }
}
