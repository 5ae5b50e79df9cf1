//! Engine error taxonomy.
//!
//! Tool and hook failures never surface here: they are converted to typed
//! results inside their executors and fed back to the model. Only
//! configuration, provider setup, step budget, and cancellation end a run.

use jimi_config::ConfigError;
use jimi_llm::LlmError;
use thiserror::Error;

/// Fatal errors for one agent run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed configuration; fatal at load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No provider/model configured; fatal at run start.
    #[error("no LLM provider configured")]
    LlmNotSet,

    /// Invalid agent definition; fatal at run start.
    #[error("invalid agent definition: {0}")]
    AgentSpec(String),

    /// The per-run step budget was exhausted.
    #[error("Max steps reached: {max}")]
    MaxStepsReached {
        /// The configured budget.
        max: u64,
    },

    /// The session was cancelled; a clean shutdown signal, not a failure.
    #[error("run cancelled")]
    RunCancelled,

    /// A provider error that exhausted its retries (or was permanent).
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// I/O error (history persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
