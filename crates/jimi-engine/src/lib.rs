#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Agent execution engine for Jimi.
//!
//! Drives the ReAct loop: build the bounded prompt, stream the model,
//! assemble tool calls from deltas, gate them on hooks and approvals,
//! dispatch them concurrently, feed results back, and repeat until the
//! model stops, the step budget runs out, or the session is cancelled.
//! Sub-agents recurse through the same loop with checkpointed parent
//! context.

mod compaction;
mod config;
mod engine;
mod error;
mod history;
mod runtime;
mod subagent;

pub use compaction::{CompactionOutcome, compact_history, estimate_history_tokens};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, RunOutcome};
pub use error::{EngineError, EngineResult};
pub use history::{HistoryWriter, load_history};
pub use runtime::Runtime;
pub use subagent::{SubAgentHandle, SubAgentPool, SubAgentStatus};
