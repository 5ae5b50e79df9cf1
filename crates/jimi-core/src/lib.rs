#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Core types for the Jimi agent runtime.
//!
//! Holds the types every other crate needs without pulling in the engine:
//! session state, the todo list model, hook event kinds, tool result kinds,
//! and the on-disk layout conventions.

mod dirs;
mod error;
mod hook_event;
mod ids;
mod session;
mod todo;

pub use dirs::{history_file, jimi_dir, session_dir, sessions_dir, user_jimi_dir};
pub use error::{CoreError, CoreResult};
pub use hook_event::HookEvent;
pub use ids::SessionId;
pub use session::Session;
pub use todo::{TodoItem, TodoPatch, TodoStats, TodoStatus, merge_todos};

use serde::{Deserialize, Serialize};

/// Terminal classification of a tool invocation.
///
/// `Rejected` is a normal (non-fatal) observation telling the model the user
/// refused the action; it is not an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    /// Tool executed successfully.
    Ok,
    /// Tool failed internally.
    Error,
    /// The user refused the tool call.
    Rejected,
}

impl ToolResultKind {
    /// Whether the invocation produced usable output.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for ToolResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}
