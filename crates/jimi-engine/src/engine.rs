//! The step loop.
//!
//! One user turn executes:
//!
//! ```text
//! INITIAL → BUILD_PROMPT → STREAM_LLM → PROCESS_STREAM
//!         → [TOOL_DISPATCH → COLLECT_RESULTS → BUILD_PROMPT]* → FINALIZE
//! ```
//!
//! The engine suspends only while awaiting stream chunks, approval
//! decisions, tool futures, and sub-agent completion; every suspension
//! point observes the session cancellation flag.

use jimi_approval::ApprovalArbiter;
use jimi_config::AgentSpec;
use jimi_context::{HeuristicInsightExtractor, InsightExtractor};
use jimi_core::{HookEvent, Session, ToolResultKind};
use jimi_hooks::{HookContext, HookDispatcher, HookRunner};
use jimi_llm::{
    AssembledCall, FinishReason, LlmProvider, LlmToolDefinition, Message, OpenAiCompatProvider,
    ProviderConfig, StreamEvent, ToolCallAccumulator,
};
use jimi_tools::{BuiltinToolProvider, ToolContext, ToolProvider, ToolRegistry, ToolResult};
use jimi_wire::{Wire, WireMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::compaction::{compact_history, estimate_history_tokens};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::runtime::Runtime;
use crate::subagent::{EngineSpawner, SubAgentPool};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The assistant's final text reply.
    pub final_text: String,
    /// LLM steps consumed by this run.
    pub steps: u64,
}

/// Orchestrates agent runs.
///
/// One engine serves many turns and many nested runs; per-run state lives
/// in [`Runtime`].
pub struct Engine {
    llm: Arc<dyn LlmProvider>,
    hooks: Arc<HookDispatcher>,
    agents: HashMap<String, Arc<AgentSpec>>,
    providers: Vec<Arc<dyn ToolProvider>>,
    extractor: Arc<dyn InsightExtractor>,
    pool: Arc<SubAgentPool>,
    config: EngineConfig,
    /// Weak self-reference for sub-agent spawner injection; set by
    /// [`EngineBuilder::build`] via `Arc::new_cyclic`.
    self_ref: std::sync::Weak<Engine>,
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Look up a loaded agent by name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<Arc<AgentSpec>> {
        self.agents.get(name).cloned()
    }

    /// The background sub-agent pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<SubAgentPool> {
        &self.pool
    }

    /// Assemble the per-run tool registry for an agent.
    #[must_use]
    pub fn registry_for(&self, agent: &AgentSpec) -> Arc<ToolRegistry> {
        let allowed = if agent.tools.is_empty() {
            None
        } else {
            Some(agent.tools.as_slice())
        };
        Arc::new(ToolRegistry::from_providers(&self.providers, allowed))
    }

    /// Create the root runtime for a user turn.
    ///
    /// # Errors
    ///
    /// Fails when `agent_name` is not a loaded agent.
    pub fn create_runtime(
        &self,
        agent_name: &str,
        session: Arc<Session>,
        approval: Arc<ApprovalArbiter>,
        wire: Wire,
    ) -> EngineResult<Runtime> {
        let agent = self
            .agent(agent_name)
            .ok_or_else(|| EngineError::AgentSpec(format!("unknown agent '{agent_name}'")))?;
        let registry = self.registry_for(&agent);
        Ok(Runtime::new(
            agent,
            session,
            approval,
            wire,
            registry,
            &self.config,
        ))
    }

    /// Fire session-start hooks.
    pub async fn fire_session_start(&self, runtime: &Runtime) {
        let ctx = HookContext::new(HookEvent::OnSessionStart, &runtime.session.work_dir)
            .with_agent(&runtime.agent.name);
        self.hooks.fire(&ctx).await;
    }

    /// Fire session-end hooks.
    pub async fn fire_session_end(&self, runtime: &Runtime) {
        let ctx = HookContext::new(HookEvent::OnSessionEnd, &runtime.session.work_dir)
            .with_agent(&runtime.agent.name);
        self.hooks.fire(&ctx).await;
    }

    pub(crate) async fn fire_agent_switch(
        &self,
        event: HookEvent,
        agent_name: &str,
        session: &Arc<Session>,
    ) {
        let ctx = HookContext::new(event, &session.work_dir).with_agent(agent_name);
        self.hooks.fire(&ctx).await;
    }

    /// Execute one turn: user input in, terminal reply (or error) out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MaxStepsReached`] when the step budget is
    /// exhausted, [`EngineError::RunCancelled`] on cancellation, and a
    /// provider error when retries are exhausted. Tool and hook failures
    /// do not abort the run.
    pub async fn run_turn(&self, runtime: &mut Runtime, input: &str) -> EngineResult<RunOutcome> {
        if runtime.depth == 0 {
            runtime.session.reset_cancelled();
        }
        if runtime.intent.is_none() {
            runtime.intent = Some(input.to_string());
        }

        self.fire_user_input(HookEvent::PreUserInput, runtime).await;
        runtime.push_message(Message::user(input));
        self.fire_user_input(HookEvent::PostUserInput, runtime).await;

        let mut steps_this_run: u64 = 0;
        let final_text;

        loop {
            if runtime.session.is_cancelled() {
                runtime.wire.send(WireMessage::StepInterrupted);
                return Err(EngineError::RunCancelled);
            }
            if steps_this_run >= runtime.agent.max_steps {
                info!(max = runtime.agent.max_steps, "Step budget exhausted");
                runtime.wire.send(WireMessage::StepInterrupted);
                runtime.push_message(Message::assistant(format!(
                    "Max steps reached: {}",
                    runtime.agent.max_steps
                )));
                return Err(EngineError::MaxStepsReached {
                    max: runtime.agent.max_steps,
                });
            }

            self.maybe_compact(runtime);

            // BUILD_PROMPT
            let system = runtime.prompt_builder.build(
                runtime.intent.as_deref(),
                &runtime.insights.entries(),
                runtime.depth,
            );
            let definitions = runtime.registry.definitions();

            let step = runtime.session.next_step();
            steps_this_run = steps_this_run.saturating_add(1);
            runtime.wire.send(WireMessage::StepBegin {
                step,
                depth: runtime.depth,
            });

            // STREAM_LLM / PROCESS_STREAM
            let output = self.stream_step(runtime, &system, &definitions).await?;
            if output.interrupted || runtime.session.is_cancelled() {
                runtime.wire.send(WireMessage::StepInterrupted);
                return Err(EngineError::RunCancelled);
            }

            // Identical call ids are deduplicated: dispatch happens once
            // even if the provider restarts streaming.
            let calls: Vec<AssembledCall> = output
                .calls
                .into_iter()
                .filter(|c| !runtime.dispatched.contains(&c.id))
                .collect();

            if calls.is_empty() {
                if !output.text.is_empty() {
                    runtime
                        .insights
                        .extend(self.extractor.extract(&output.text));
                    runtime.push_message(Message::assistant(output.text.clone()));
                }
                final_text = output.text;
                break;
            }

            // TOOL_DISPATCH
            let text = if output.text.is_empty() {
                None
            } else {
                runtime
                    .insights
                    .extend(self.extractor.extract(&output.text));
                Some(output.text.clone())
            };
            let tool_calls: Vec<jimi_llm::ToolCall> =
                calls.iter().map(AssembledCall::to_tool_call).collect();
            runtime.push_message(Message::assistant_with_tools(text, tool_calls));

            let results = self.dispatch_tools(runtime, &calls, &output.text).await;

            if runtime.session.is_cancelled() {
                runtime.wire.send(WireMessage::StepInterrupted);
                return Err(EngineError::RunCancelled);
            }

            // COLLECT_RESULTS
            for (call, result) in calls.iter().zip(results) {
                runtime.dispatched.insert(call.id.clone());
                runtime.push_message(Message::tool_result(&call.id, result.feedback()));
            }

            if output.finish == Some(FinishReason::ContentFilter) {
                warn!("Provider filtered the response content");
            }
        }

        Ok(RunOutcome {
            final_text,
            steps: steps_this_run,
        })
    }

    async fn fire_user_input(&self, event: HookEvent, runtime: &Runtime) {
        let ctx = HookContext::new(event, &runtime.session.work_dir)
            .with_agent(&runtime.agent.name);
        self.hooks.fire(&ctx).await;
    }

    fn maybe_compact(&self, runtime: &mut Runtime) {
        let estimated = estimate_history_tokens(&runtime.history);
        if estimated <= self.config.compaction_threshold_tokens {
            return;
        }
        runtime.wire.send(WireMessage::CompactionBegin);
        if let Some(outcome) = compact_history(&mut runtime.history, self.config.keep_recent) {
            info!(
                evicted = outcome.evicted,
                kept = outcome.kept,
                "History compacted"
            );
        }
        runtime.wire.send(WireMessage::CompactionEnd);
    }

    /// Stream one LLM call, retrying transient failures with exponential
    /// backoff.
    async fn stream_step(
        &self,
        runtime: &Runtime,
        system: &str,
        definitions: &[LlmToolDefinition],
    ) -> EngineResult<StepOutput> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_stream_step(runtime, system, definitions).await {
                Ok(output) => return Ok(output),
                Err(EngineError::Llm(e))
                    if e.is_transient() && attempt < self.config.max_retries_per_step =>
                {
                    attempt = attempt.saturating_add(1);
                    let delay = self
                        .config
                        .retry_base_delay
                        .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Transient provider error, retrying");
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    let ctx = HookContext::new(HookEvent::OnError, &runtime.session.work_dir)
                        .with_agent(&runtime.agent.name)
                        .with_error(e.to_string());
                    self.hooks.fire(&ctx).await;
                    return Err(e);
                },
            }
        }
    }

    async fn try_stream_step(
        &self,
        runtime: &Runtime,
        system: &str,
        definitions: &[LlmToolDefinition],
    ) -> EngineResult<StepOutput> {
        use futures::StreamExt;

        let mut stream = self.llm.stream(&runtime.history, definitions, system).await?;
        let cancel = runtime.session.cancel_token();

        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut finish = None;

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Cancelled mid-stream, abandoning provider stream");
                    return Ok(StepOutput {
                        text,
                        calls: Vec::new(),
                        finish,
                        interrupted: true,
                    });
                },
                event = stream.next() => event,
            };

            match event {
                None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(StreamEvent::TextDelta(delta))) => {
                    runtime.wire.send(WireMessage::ContentPart {
                        text: delta.clone(),
                        depth: runtime.depth,
                    });
                    text.push_str(&delta);
                },
                Some(Ok(StreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    args_delta,
                })) => {
                    accumulator.push(index, id.as_deref(), name.as_deref(), args_delta.as_deref());
                },
                Some(Ok(StreamEvent::Finished(reason))) => finish = Some(reason),
                Some(Ok(StreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                })) => {
                    debug!(input = input_tokens, output = output_tokens, "Token usage");
                },
                Some(Ok(StreamEvent::Done)) => break,
            }
        }

        Ok(StepOutput {
            text,
            calls: accumulator.finish(),
            finish,
            interrupted: false,
        })
    }

    /// Dispatch every complete tool call of one assistant response.
    ///
    /// Calls run concurrently; results return in emission order.
    async fn dispatch_tools(
        &self,
        runtime: &Runtime,
        calls: &[AssembledCall],
        step_text: &str,
    ) -> Vec<ToolResult> {
        let tool_ctx = ToolContext::new(Arc::clone(&runtime.session), runtime.wire.clone());

        let latest_thought = if step_text.is_empty() {
            runtime.last_assistant_text().unwrap_or_default().to_string()
        } else {
            step_text.to_string()
        };
        if let Some(engine) = self.self_ref.upgrade() {
            tool_ctx
                .set_spawner(Some(Arc::new(EngineSpawner {
                    engine,
                    parent_agent: Arc::clone(&runtime.agent),
                    session: Arc::clone(&runtime.session),
                    approval: Arc::clone(&runtime.approval),
                    wire: runtime.wire.clone(),
                    parent_stack: Arc::clone(&runtime.parent_stack),
                    parent_depth: runtime.depth,
                    latest_thought,
                    checkpoint_id: runtime.history.len(),
                })))
                .await;
        }

        let futures = calls
            .iter()
            .map(|call| self.execute_one(runtime, &tool_ctx, call));
        futures::future::join_all(futures).await
    }

    async fn execute_one(
        &self,
        runtime: &Runtime,
        tool_ctx: &ToolContext,
        call: &AssembledCall,
    ) -> ToolResult {
        let tool_call = call.to_tool_call();
        let files = affected_files(&tool_call.arguments);

        runtime.wire.send(WireMessage::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: tool_call.arguments.clone(),
            depth: runtime.depth,
        });

        // PRE_TOOL_CALL hooks; a veto becomes a REJECTED result.
        let pre_ctx = HookContext::new(HookEvent::PreToolCall, &runtime.session.work_dir)
            .with_tool(&call.name, &call.id)
            .with_agent(&runtime.agent.name)
            .with_modified_files(files.clone());
        let pre_records = self.hooks.fire(&pre_ctx).await;

        let result = if let Some(reason) = HookDispatcher::first_veto(&pre_records) {
            info!(tool = %call.name, reason = %reason, "Tool call vetoed by hook");
            ToolResult::rejected()
        } else {
            match runtime
                .registry
                .get(&call.name)
                .and_then(|t| t.action_kind().map(ToString::to_string))
            {
                Some(kind) => {
                    let decision = runtime
                        .approval
                        .request(
                            &runtime.session.cancel_token(),
                            &call.id,
                            &kind,
                            &format!("{}: {}", call.name, call.raw_arguments),
                        )
                        .await;
                    if decision.is_allowed() {
                        self.invoke_with_cancel(runtime, tool_ctx, call).await
                    } else {
                        ToolResult::rejected()
                    }
                },
                None => self.invoke_with_cancel(runtime, tool_ctx, call).await,
            }
        };

        runtime.wire.send(WireMessage::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            kind: result.kind,
            brief: result.brief.clone(),
            depth: runtime.depth,
        });

        // POST_TOOL_CALL hooks fire for every outcome, rejections included.
        let tool_result_text = match result.kind {
            ToolResultKind::Rejected => "rejected".to_string(),
            _ => result.feedback(),
        };
        let post_ctx = HookContext::new(HookEvent::PostToolCall, &runtime.session.work_dir)
            .with_tool(&call.name, &call.id)
            .with_agent(&runtime.agent.name)
            .with_modified_files(files)
            .with_tool_result(tool_result_text);
        self.hooks.fire(&post_ctx).await;

        if result.kind == ToolResultKind::Error {
            let error_ctx = HookContext::new(HookEvent::OnError, &runtime.session.work_dir)
                .with_tool(&call.name, &call.id)
                .with_agent(&runtime.agent.name)
                .with_error(result.message.clone());
            self.hooks.fire(&error_ctx).await;
        }

        result
    }

    /// Invoke a tool with its timeout, honoring cancellation with a grace
    /// period before the future is dropped.
    async fn invoke_with_cancel(
        &self,
        runtime: &Runtime,
        tool_ctx: &ToolContext,
        call: &AssembledCall,
    ) -> ToolResult {
        let timeout = runtime
            .registry
            .get(&call.name)
            .map_or(jimi_tools::DEFAULT_TOOL_TIMEOUT, |t| t.timeout());
        let cancel = runtime.session.cancel_token();

        let invocation = runtime
            .registry
            .invoke(&call.name, &call.raw_arguments, tool_ctx);
        tokio::pin!(invocation);

        tokio::select! {
            result = tokio::time::timeout(timeout, &mut invocation) => match result {
                Ok(result) => result,
                Err(_) => ToolResult::error(format!(
                    "Tool '{}' timed out after {}s",
                    call.name,
                    timeout.as_secs()
                )),
            },
            () = cancel.cancelled() => {
                debug!(tool = %call.name, "Cancellation during tool execution, granting grace period");
                match tokio::time::timeout(self.config.cancel_grace, &mut invocation).await {
                    Ok(result) => result,
                    Err(_) => ToolResult::error(format!("Tool '{}' cancelled", call.name)),
                }
            },
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("model", &self.llm.model())
            .field("agents", &self.agents.len())
            .finish_non_exhaustive()
    }
}

struct StepOutput {
    text: String,
    calls: Vec<AssembledCall>,
    finish: Option<FinishReason>,
    interrupted: bool,
}

/// Files a tool call touches, extracted from its arguments.
fn affected_files(arguments: &Value) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(object) = arguments.as_object() {
        for key in ["path", "file_path"] {
            if let Some(path) = object.get(key).and_then(Value::as_str) {
                files.push(PathBuf::from(path));
            }
        }
        if let Some(paths) = object.get("paths").and_then(Value::as_array) {
            files.extend(
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from),
            );
        }
    }
    files
}

/// Builds an [`Engine`].
pub struct EngineBuilder {
    llm: Option<Arc<dyn LlmProvider>>,
    hooks: Option<Arc<HookDispatcher>>,
    agents: Option<HashMap<String, Arc<AgentSpec>>>,
    providers: Vec<Arc<dyn ToolProvider>>,
    extractor: Option<Arc<dyn InsightExtractor>>,
    config: EngineConfig,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            llm: None,
            hooks: None,
            agents: None,
            providers: Vec::new(),
            extractor: None,
            config: EngineConfig::default(),
        }
    }

    /// Use an already-constructed provider.
    #[must_use]
    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Use an OpenAI-compatible provider built from `config`.
    #[must_use]
    pub fn openai_compat(mut self, config: ProviderConfig) -> Self {
        self.llm = Some(Arc::new(OpenAiCompatProvider::from_config(config)));
        self
    }

    /// Install the hook dispatcher.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<HookDispatcher>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Install the loaded agent set.
    #[must_use]
    pub fn agents(mut self, agents: HashMap<String, Arc<AgentSpec>>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Add a tool provider (applied in order after the built-ins).
    #[must_use]
    pub fn tool_provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the default insight extractor.
    #[must_use]
    pub fn insight_extractor(mut self, extractor: Arc<dyn InsightExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::LlmNotSet`] when no provider was configured
    /// and [`EngineError::AgentSpec`] when the agent set is empty.
    pub fn build(self) -> EngineResult<Arc<Engine>> {
        let llm = self.llm.ok_or(EngineError::LlmNotSet)?;

        let agents = self.agents.unwrap_or_else(|| {
            let main = AgentSpec::default_main();
            HashMap::from([(main.name.clone(), Arc::new(main))])
        });
        if agents.is_empty() {
            return Err(EngineError::AgentSpec("no agents configured".to_string()));
        }

        let mut providers: Vec<Arc<dyn ToolProvider>> = vec![Arc::new(BuiltinToolProvider)];
        providers.extend(self.providers);

        let hooks = self
            .hooks
            .unwrap_or_else(|| Arc::new(HookDispatcher::new(HookRunner::new())));
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(HeuristicInsightExtractor));
        let pool = Arc::new(SubAgentPool::new(self.config.max_concurrent_subagents));
        let config = self.config;

        Ok(Arc::new_cyclic(|weak| Engine {
            llm,
            hooks,
            agents,
            providers,
            extractor,
            pool,
            config,
            self_ref: weak.clone(),
        }))
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("has_llm", &self.llm.is_some())
            .finish_non_exhaustive()
    }
}
