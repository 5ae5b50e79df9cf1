//! Hook event kinds shared across crates.
//!
//! `HookEvent` lives in `jimi-core` so that both `jimi-hooks` and
//! `jimi-engine` can reference it without a circular dependency.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine milestones that can trigger hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Before user input is appended to history.
    PreUserInput,
    /// After user input is appended to history.
    PostUserInput,
    /// Before a tool call is executed.
    PreToolCall,
    /// After a tool call completes (including rejections).
    PostToolCall,
    /// Before dispatch to a sub-agent.
    PreAgentSwitch,
    /// After a sub-agent returns.
    PostAgentSwitch,
    /// A tool or engine error occurred.
    OnError,
    /// Session has started.
    OnSessionStart,
    /// Session is ending.
    OnSessionEnd,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreUserInput => write!(f, "pre_user_input"),
            Self::PostUserInput => write!(f, "post_user_input"),
            Self::PreToolCall => write!(f, "pre_tool_call"),
            Self::PostToolCall => write!(f, "post_tool_call"),
            Self::PreAgentSwitch => write!(f, "pre_agent_switch"),
            Self::PostAgentSwitch => write!(f, "post_agent_switch"),
            Self::OnError => write!(f, "on_error"),
            Self::OnSessionStart => write!(f, "on_session_start"),
            Self::OnSessionEnd => write!(f, "on_session_end"),
        }
    }
}
