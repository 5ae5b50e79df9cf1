//! Parent-context stack for sub-agent recursion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint of a parent run taken just before dispatching a sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentContext {
    /// Parent history length at dispatch time.
    pub checkpoint_id: usize,
    /// The parent's last assistant text before the dispatch.
    pub latest_thought: String,
    /// Depth of the sub-agent being dispatched.
    pub depth: usize,
    /// Task handed to the sub-agent.
    pub sub_goal: String,
    /// When the frame was pushed.
    pub timestamp: DateTime<Utc>,
}

impl ParentContext {
    /// Create a frame for a dispatch at `depth`.
    pub fn new(
        checkpoint_id: usize,
        latest_thought: impl Into<String>,
        depth: usize,
        sub_goal: impl Into<String>,
    ) -> Self {
        Self {
            checkpoint_id,
            latest_thought: latest_thought.into(),
            depth,
            sub_goal: sub_goal.into(),
            timestamp: Utc::now(),
        }
    }

    /// The structured message re-injected into parent history when this
    /// frame is popped.
    #[must_use]
    pub fn restore_message(&self, sub_result: &str) -> String {
        format!(
            "=== 父级上下文恢复 (深度: {}) ===\n子目标: {}\n之前的思考: {}\n子代理结果: {}",
            self.depth, self.sub_goal, self.latest_thought, sub_result
        )
    }
}

/// Stack of parent checkpoints; its size equals the current depth.
#[derive(Debug, Clone, Default)]
pub struct ParentContextStack {
    frames: Vec<ParentContext>,
}

impl ParentContextStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame before dispatching a sub-agent.
    pub fn push(&mut self, frame: ParentContext) {
        self.frames.push(frame);
    }

    /// Pop the frame on sub-agent return.
    pub fn pop(&mut self) -> Option<ParentContext> {
        self.frames.pop()
    }

    /// Current stack size (equals the active recursion depth).
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame most recently pushed.
    #[must_use]
    pub fn top(&self) -> Option<&ParentContext> {
        self.frames.last()
    }
}
