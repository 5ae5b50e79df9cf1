//! Engine configuration.

use jimi_context::PromptLimits;
use std::time::Duration;

/// Tunables for the step loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retries for transient provider errors within one step.
    pub max_retries_per_step: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// How long to wait for tool futures after cancellation.
    pub cancel_grace: Duration,
    /// Estimated-token threshold that triggers history compaction.
    pub compaction_threshold_tokens: usize,
    /// Recent messages kept verbatim through compaction.
    pub keep_recent: usize,
    /// Maximum sub-agent nesting depth.
    pub max_depth: usize,
    /// Maximum concurrent background sub-agents.
    pub max_concurrent_subagents: usize,
    /// Active-prompt size limits.
    pub prompt_limits: PromptLimits,
    /// Append history to the session's `history.jsonl`.
    pub persist_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries_per_step: 3,
            retry_base_delay: Duration::from_millis(500),
            cancel_grace: Duration::from_millis(2000),
            compaction_threshold_tokens: 60_000,
            keep_recent: 10,
            max_depth: 5,
            max_concurrent_subagents: 4,
            prompt_limits: PromptLimits::default(),
            persist_history: true,
        }
    }
}
