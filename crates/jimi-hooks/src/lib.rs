#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Hook system for the Jimi agent runtime.
//!
//! Hooks are declarative side-effects fired around engine milestones:
//! before and after tool calls, around sub-agent switches, on errors, and
//! at session boundaries. A hook matches an event through its trigger
//! (event kind, tool names, file glob patterns, agent name, error regex)
//! and executes a shell script, an internal meta-command, or an ordered
//! composite of both. One hook's failure is logged and never aborts the
//! engine.

mod context;
mod dispatcher;
mod error;
mod executor;
mod matcher;
mod spec;

pub use context::{HookContext, substitute_vars};
pub use dispatcher::{HookApprovalGate, HookDispatcher};
pub use error::{HookError, HookResult};
pub use executor::{CommandRunner, HookExecutionRecord, HookOutcome, HookRunner, NoopCommandRunner};
pub use matcher::{glob_matches, glob_to_regex, hook_matches, matching_files};
pub use spec::{HookExecution, HookSpec, HookStep, HookTrigger, StepAction};

// Canonical event kinds live in jimi-core.
pub use jimi_core::HookEvent;
