#![deny(unsafe_code)]
#![warn(missing_docs)]
//! LLM provider abstraction for the Jimi agent runtime.
//!
//! Defines the conversation data model (messages, tool calls), the
//! streaming event contract, the provider trait, an OpenAI-compatible
//! streaming client, and a scripted mock provider for tests.

mod assembler;
mod error;
pub mod mock;
mod openai_compat;
mod provider;
mod types;

pub use assembler::{AssembledCall, ToolCallAccumulator};
pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{LlmProvider, ProviderConfig, StreamBox};
pub use types::{
    FinishReason, LlmToolDefinition, Message, MessageContent, MessageRole, StreamEvent, ToolCall,
    ToolResultContent,
};
