//! The uniform tool invocation result.

use jimi_core::ToolResultKind;
use serde::{Deserialize, Serialize};

/// Message fed back to the model when the user refuses a tool call.
pub const REJECTION_MESSAGE: &str = "工具调用被用户拒绝。请遵循用户的新指示。";

const BRIEF_MAX_CHARS: usize = 120;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Result classification.
    pub kind: ToolResultKind,
    /// Tool output (empty for errors and rejections).
    pub output: String,
    /// Error or rejection message (empty on success).
    pub message: String,
    /// One-line summary for compact display.
    pub brief: String,
}

impl ToolResult {
    /// Successful result.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        let output = output.into();
        let brief = brief_of(&output);
        Self {
            kind: ToolResultKind::Ok,
            output,
            message: String::new(),
            brief,
        }
    }

    /// Failed result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let brief = brief_of(&message);
        Self {
            kind: ToolResultKind::Error,
            output: String::new(),
            message,
            brief,
        }
    }

    /// The user refused the call.
    ///
    /// Carries the fixed rejection message so the model treats the refusal
    /// as a normal observation and pivots.
    #[must_use]
    pub fn rejected() -> Self {
        Self {
            kind: ToolResultKind::Rejected,
            output: String::new(),
            message: REJECTION_MESSAGE.to_string(),
            brief: REJECTION_MESSAGE.to_string(),
        }
    }

    /// Text handed back to the model in the tool history message.
    #[must_use]
    pub fn feedback(&self) -> String {
        match self.kind {
            ToolResultKind::Ok => self.output.clone(),
            ToolResultKind::Error => format!("Error: {}", self.message),
            ToolResultKind::Rejected => self.message.clone(),
        }
    }

    /// Whether the invocation succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind.is_ok()
    }
}

fn brief_of(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= BRIEF_MAX_CHARS {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(BRIEF_MAX_CHARS).collect();
        format!("{truncated}…")
    }
}
