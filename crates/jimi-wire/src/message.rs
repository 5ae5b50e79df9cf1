//! Messages carried on the wire.

use jimi_core::{TodoItem, TodoStats, ToolResultKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One event broadcast from the engine to all subscribers.
///
/// Messages from sub-agents carry `depth > 0` so UIs can filter or indent
/// nested output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Partial assistant text, in LLM emission order.
    ContentPart {
        /// The text delta.
        text: String,
        /// Nesting depth of the emitting run.
        depth: usize,
    },
    /// A tool call is about to execute.
    ToolCall {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
        /// Assembled arguments.
        arguments: Value,
        /// Nesting depth of the emitting run.
        depth: usize,
    },
    /// A tool call finished.
    ToolResult {
        /// Tool call id this result belongs to.
        id: String,
        /// Tool name.
        name: String,
        /// Result classification.
        kind: ToolResultKind,
        /// One-line summary for compact display.
        brief: String,
        /// Nesting depth of the emitting run.
        depth: usize,
    },
    /// A new step (one LLM call plus its tool dispatches) has begun.
    StepBegin {
        /// Session-global step number.
        step: u64,
        /// Nesting depth of the emitting run.
        depth: usize,
    },
    /// The current step was aborted (cancellation or step budget).
    StepInterrupted,
    /// Free-form status fields for observability.
    StatusUpdate {
        /// Key-value status fields.
        fields: HashMap<String, String>,
    },
    /// Context compaction is starting.
    CompactionBegin,
    /// Context compaction finished.
    CompactionEnd,
    /// The session todo list changed.
    TodoUpdate {
        /// Full merged list.
        items: Vec<TodoItem>,
        /// Counts per status.
        stats: TodoStats,
    },
    /// A tool call is paused awaiting a user decision.
    ApprovalRequired {
        /// Tool call id awaiting the decision.
        id: String,
        /// Action kind (approval cache key).
        action_kind: String,
        /// Human-readable description of the pending action.
        description: String,
    },
}

impl WireMessage {
    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentPart { .. } => "content_part",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::StepBegin { .. } => "step_begin",
            Self::StepInterrupted => "step_interrupted",
            Self::StatusUpdate { .. } => "status_update",
            Self::CompactionBegin => "compaction_begin",
            Self::CompactionEnd => "compaction_end",
            Self::TodoUpdate { .. } => "todo_update",
            Self::ApprovalRequired { .. } => "approval_required",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagging() {
        let msg = WireMessage::StepBegin { step: 3, depth: 0 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "step_begin");
        assert_eq!(json["step"], 3);
    }

    #[test]
    fn test_kind_tags() {
        let msg = WireMessage::ApprovalRequired {
            id: "call_1".to_string(),
            action_kind: "write_file".to_string(),
            description: "write /tmp/x.txt".to_string(),
        };
        assert_eq!(msg.kind(), "approval_required");
    }
}
