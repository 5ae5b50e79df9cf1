//! Sub-agent spawner seam.
//!
//! The `task` tool needs the engine to run nested agents, but the registry
//! is constructed before the engine exists. The engine injects an
//! implementation of this trait into the [`crate::ToolContext`] at run
//! start, breaking the cycle.

use crate::ToolError;
use async_trait::async_trait;

/// Request to run a sub-agent.
#[derive(Debug, Clone)]
pub struct SubAgentRequest {
    /// Named agent to run; `None` selects the default sub-agent.
    pub agent: Option<String>,
    /// Task description handed to the sub-agent as its prompt.
    pub description: String,
    /// Run in the background instead of blocking the parent loop.
    pub background: bool,
}

impl SubAgentRequest {
    /// Create a synchronous request.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            agent: None,
            description: description.into(),
            background: false,
        }
    }

    /// Select a named agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Run in the background.
    #[must_use]
    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }
}

/// Runs sub-agents on behalf of the `task` tool.
#[async_trait]
pub trait SubAgentSpawner: Send + Sync {
    /// Dispatch a sub-agent.
    ///
    /// Synchronous requests block until the sub-agent completes and return
    /// the parent-context restore block; background requests return
    /// immediately with a task handle description.
    async fn spawn(&self, request: SubAgentRequest) -> Result<String, ToolError>;
}
