#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Bounded context management for recursive agent runs.
//!
//! Keeps the serialized system prompt O(1) with recursion depth: nested
//! runs get a role-definition slice instead of the full base prompt, a
//! sliding window of key insights replaces an ever-growing transcript,
//! and a parent-context stack checkpoints state across sub-agent
//! boundaries so it can be structurally re-injected on return.

mod insight;
mod prompt;
mod stack;

pub use insight::{HeuristicInsightExtractor, InsightExtractor, InsightLog};
pub use prompt::{ActivePromptBuilder, PromptLimits, estimate_tokens};
pub use stack::{ParentContext, ParentContextStack};
