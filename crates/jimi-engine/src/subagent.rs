//! Sub-agent dispatch: synchronous (Task tool) and background modes.
//!
//! Both modes run the same engine; only the awaiting pattern differs. The
//! synchronous path checkpoints the parent on the shared context stack and
//! returns the structured restore block as the tool result, so the frame
//! arrives in parent history before the parent's next LLM call. The
//! background path hands back a task id immediately; output is polled
//! through the pool and completion is announced as a `StatusUpdate`.

use async_trait::async_trait;
use jimi_approval::ApprovalArbiter;
use jimi_config::AgentSpec;
use jimi_context::{ParentContext, ParentContextStack};
use jimi_core::{HookEvent, Session};
use jimi_tools::{SubAgentRequest, SubAgentSpawner, ToolError};
use jimi_wire::{Wire, WireMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::runtime::Runtime;

/// Status of a background sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAgentStatus {
    /// Still running.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl std::fmt::Display for SubAgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Handle to a background sub-agent, polled for its outcome.
#[derive(Debug)]
pub struct SubAgentHandle {
    /// Task id.
    pub id: String,
    /// The dispatched task description.
    pub task: String,
    /// Nesting depth of the sub-agent.
    pub depth: usize,
    status: Mutex<SubAgentStatus>,
    result: Mutex<Option<String>>,
    error: Mutex<Option<String>>,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
    permit: Mutex<Option<tokio::sync::OwnedSemaphorePermit>>,
}

impl SubAgentHandle {
    fn new(task: impl Into<String>, depth: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            depth,
            status: Mutex::new(SubAgentStatus::Running),
            result: Mutex::new(None),
            error: Mutex::new(None),
            join: Mutex::new(None),
            permit: Mutex::new(None),
        }
    }

    /// Current status.
    pub fn status(&self) -> SubAgentStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Result summary, when completed.
    pub fn result(&self) -> Option<String> {
        self.result
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Error message, when failed.
    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Whether the sub-agent reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.status() != SubAgentStatus::Running
    }

    fn complete(&self, result: String) {
        *self
            .result
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result);
        self.set_status(SubAgentStatus::Completed);
    }

    fn fail(&self, error: String) {
        *self
            .error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
        self.set_status(SubAgentStatus::Failed);
    }

    fn set_status(&self, status: SubAgentStatus) {
        *self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = status;
        if status != SubAgentStatus::Running {
            // Terminal: release the concurrency permit.
            let _ = self
                .permit
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
        }
    }

    fn attach(&self, join: tokio::task::JoinHandle<()>) {
        *self
            .join
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(join);
    }
}

/// Pool of background sub-agents.
#[derive(Debug)]
pub struct SubAgentPool {
    semaphore: Arc<Semaphore>,
    tasks: Mutex<HashMap<String, Arc<SubAgentHandle>>>,
}

impl SubAgentPool {
    /// Create a pool allowing `max_concurrent` background sub-agents.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a task by id.
    pub fn get(&self, id: &str) -> Option<Arc<SubAgentHandle>> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Every known task, running and finished.
    pub fn list(&self) -> Vec<Arc<SubAgentHandle>> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Cancel a running task.
    ///
    /// Honors explicit task-cancel requests; session-wide cancellation
    /// reaches background runs through the shared cancellation flag.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        if handle.is_done() {
            return false;
        }
        if let Some(join) = handle
            .join
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            join.abort();
        }
        handle.set_status(SubAgentStatus::Cancelled);
        info!(id, "Background sub-agent cancelled");
        true
    }

    fn register(&self, task: &str, depth: usize) -> Result<Arc<SubAgentHandle>, ToolError> {
        let permit = self.semaphore.clone().try_acquire_owned().map_err(|_| {
            ToolError::ExecutionFailed("maximum concurrent sub-agents reached".to_string())
        })?;
        let handle = Arc::new(SubAgentHandle::new(task, depth));
        *handle
            .permit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(permit);
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(handle.id.clone(), Arc::clone(&handle));
        Ok(handle)
    }
}

/// Runs sub-agents for the `task` tool within one dispatch round.
pub(crate) struct EngineSpawner {
    pub engine: Arc<Engine>,
    pub parent_agent: Arc<AgentSpec>,
    pub session: Arc<Session>,
    pub approval: Arc<ApprovalArbiter>,
    pub wire: Wire,
    pub parent_stack: Arc<Mutex<ParentContextStack>>,
    pub parent_depth: usize,
    pub latest_thought: String,
    pub checkpoint_id: usize,
}

impl EngineSpawner {
    fn resolve_agent(&self, request: &SubAgentRequest) -> Result<Arc<AgentSpec>, ToolError> {
        match &request.agent {
            Some(name) => {
                if !self.parent_agent.subagents.is_empty()
                    && !self.parent_agent.subagents.iter().any(|s| s == name)
                {
                    return Err(ToolError::ExecutionFailed(format!(
                        "sub-agent '{name}' is not allowed for agent '{}'",
                        self.parent_agent.name
                    )));
                }
                self.engine.agent(name).ok_or_else(|| {
                    ToolError::ExecutionFailed(format!("unknown sub-agent '{name}'"))
                })
            },
            None => Ok(Arc::clone(&self.parent_agent)),
        }
    }

    async fn spawn_sync(
        &self,
        agent: Arc<AgentSpec>,
        request: &SubAgentRequest,
        child_depth: usize,
    ) -> Result<String, ToolError> {
        let frame = ParentContext::new(
            self.checkpoint_id,
            &self.latest_thought,
            child_depth,
            &request.description,
        );
        self.parent_stack
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(frame);

        let registry = self.engine.registry_for(&agent);
        let mut child = Runtime::nested(
            Arc::clone(&agent),
            Arc::clone(&self.session),
            Arc::clone(&self.approval),
            self.wire.clone(),
            registry,
            self.engine.config(),
            child_depth,
            Arc::clone(&self.parent_stack),
        );

        debug!(agent = %agent.name, depth = child_depth, "Dispatching sub-agent");
        let outcome = self.engine.run_turn(&mut child, &request.description).await;

        let frame = self
            .parent_stack
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| {
                ParentContext::new(
                    self.checkpoint_id,
                    &self.latest_thought,
                    child_depth,
                    &request.description,
                )
            });

        self.engine
            .fire_agent_switch(HookEvent::PostAgentSwitch, &agent.name, &self.session)
            .await;

        match outcome {
            Ok(outcome) => {
                let summary = if outcome.final_text.is_empty() {
                    "（子代理未产生文本输出）".to_string()
                } else {
                    outcome.final_text
                };
                Ok(frame.restore_message(&summary))
            },
            Err(e) => Err(ToolError::ExecutionFailed(format!("sub-agent failed: {e}"))),
        }
    }

    fn spawn_background(
        &self,
        agent: Arc<AgentSpec>,
        request: &SubAgentRequest,
        child_depth: usize,
    ) -> Result<String, ToolError> {
        let handle = self
            .engine
            .pool()
            .register(&request.description, child_depth)?;

        let registry = self.engine.registry_for(&agent);
        let mut child = Runtime::nested(
            Arc::clone(&agent),
            Arc::clone(&self.session),
            Arc::clone(&self.approval),
            self.wire.clone(),
            registry,
            self.engine.config(),
            child_depth,
            Arc::new(Mutex::new(ParentContextStack::new())),
        );

        let engine = Arc::clone(&self.engine);
        let wire = self.wire.clone();
        let description = request.description.clone();
        let task_handle = Arc::clone(&handle);
        let agent_name = agent.name.clone();
        let session = Arc::clone(&self.session);

        let join = tokio::spawn(async move {
            let outcome = engine.run_turn(&mut child, &description).await;
            match outcome {
                Ok(outcome) => task_handle.complete(outcome.final_text),
                Err(e) => task_handle.fail(e.to_string()),
            }
            engine
                .fire_agent_switch(HookEvent::PostAgentSwitch, &agent_name, &session)
                .await;
            let mut fields = HashMap::new();
            fields.insert("subagent_id".to_string(), task_handle.id.clone());
            fields.insert("status".to_string(), task_handle.status().to_string());
            fields.insert("task".to_string(), task_handle.task.clone());
            wire.send(WireMessage::StatusUpdate { fields });
        });
        handle.attach(join);

        Ok(format!("Background sub-agent started: {}", handle.id))
    }
}

#[async_trait]
impl SubAgentSpawner for EngineSpawner {
    async fn spawn(&self, request: SubAgentRequest) -> Result<String, ToolError> {
        let child_depth = self.parent_depth.saturating_add(1);
        let max_depth = self.engine.config().max_depth;
        if child_depth > max_depth {
            warn!(depth = child_depth, "Sub-agent depth limit exceeded");
            return Err(ToolError::ExecutionFailed(format!(
                "maximum sub-agent depth ({max_depth}) exceeded"
            )));
        }

        let agent = self.resolve_agent(&request)?;

        self.engine
            .fire_agent_switch(HookEvent::PreAgentSwitch, &agent.name, &self.session)
            .await;

        if request.background {
            self.spawn_background(agent, &request, child_depth)
        } else {
            self.spawn_sync(agent, &request, child_depth).await
        }
    }
}
