//! Per-run mutable state.

use jimi_approval::ApprovalArbiter;
use jimi_config::AgentSpec;
use jimi_context::{ActivePromptBuilder, InsightLog, ParentContextStack};
use jimi_core::Session;
use jimi_llm::Message;
use jimi_tools::ToolRegistry;
use jimi_wire::Wire;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::EngineConfig;
use crate::history::HistoryWriter;

/// Mutable state for one agent run.
///
/// History is owned here and mutated only by the engine from one task;
/// everything shared (session, approval, wire, parent stack) is behind an
/// `Arc`.
pub struct Runtime {
    /// The agent being executed.
    pub agent: Arc<AgentSpec>,
    /// Session shared across every run in the conversation.
    pub session: Arc<Session>,
    /// Approval arbiter shared with nested runs.
    pub approval: Arc<ApprovalArbiter>,
    /// The wire this run broadcasts on.
    pub wire: Wire,
    /// Nesting depth (0 for the main agent).
    pub depth: usize,
    /// Conversation history for this run.
    pub history: Vec<Message>,
    /// Parent-context stack, shared across the recursion.
    pub parent_stack: Arc<Mutex<ParentContextStack>>,
    /// Rolling key insights.
    pub insights: InsightLog,
    /// The verbatim first user utterance of this run.
    pub intent: Option<String>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) prompt_builder: ActivePromptBuilder,
    pub(crate) dispatched: HashSet<String>,
    history_writer: Option<HistoryWriter>,
}

impl Runtime {
    /// Create the root runtime for a user turn.
    #[must_use]
    pub fn new(
        agent: Arc<AgentSpec>,
        session: Arc<Session>,
        approval: Arc<ApprovalArbiter>,
        wire: Wire,
        registry: Arc<ToolRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let history_writer = if config.persist_history {
            match HistoryWriter::open(&session.history_file) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!(error = %e, "History persistence disabled for this run");
                    None
                },
            }
        } else {
            None
        };

        let prompt_builder =
            ActivePromptBuilder::new(agent.system_prompt.clone(), config.prompt_limits);
        let insights = InsightLog::new(config.prompt_limits.insights_window);

        Self {
            agent,
            session,
            approval,
            wire,
            depth: 0,
            history: Vec::new(),
            parent_stack: Arc::new(Mutex::new(ParentContextStack::new())),
            insights,
            intent: None,
            registry,
            prompt_builder,
            dispatched: HashSet::new(),
            history_writer,
        }
    }

    /// Create a nested runtime for a sub-agent.
    ///
    /// The child gets fresh history and insights but shares the session,
    /// approval arbiter, wire, and parent stack. Sub-agent history is not
    /// persisted; only the summary returns to the parent.
    #[must_use]
    pub fn child(
        &self,
        agent: Arc<AgentSpec>,
        registry: Arc<ToolRegistry>,
        config: &EngineConfig,
        depth: usize,
    ) -> Self {
        Self::nested(
            agent,
            Arc::clone(&self.session),
            Arc::clone(&self.approval),
            self.wire.clone(),
            registry,
            config,
            depth,
            Arc::clone(&self.parent_stack),
        )
    }

    /// Assemble a nested runtime from its shared parts.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub(crate) fn nested(
        agent: Arc<AgentSpec>,
        session: Arc<Session>,
        approval: Arc<ApprovalArbiter>,
        wire: Wire,
        registry: Arc<ToolRegistry>,
        config: &EngineConfig,
        depth: usize,
        parent_stack: Arc<Mutex<ParentContextStack>>,
    ) -> Self {
        let prompt_builder =
            ActivePromptBuilder::new(agent.system_prompt.clone(), config.prompt_limits);
        let insights = InsightLog::new(config.prompt_limits.insights_window);

        Self {
            agent,
            session,
            approval,
            wire,
            depth,
            history: Vec::new(),
            parent_stack,
            insights,
            intent: None,
            registry,
            prompt_builder,
            dispatched: HashSet::new(),
            history_writer: None,
        }
    }

    /// Append a message to history (and the history file, at depth 0).
    pub fn push_message(&mut self, message: Message) {
        if let Some(writer) = self.history_writer.as_mut() {
            writer.append(&message);
        }
        self.history.push(message);
    }

    /// The last assistant text in history, if any.
    #[must_use]
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .filter(|m| m.role == jimi_llm::MessageRole::Assistant)
            .find_map(Message::text)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("agent", &self.agent.name)
            .field("depth", &self.depth)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}
