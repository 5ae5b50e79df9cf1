#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Tool abstraction and registry for the Jimi agent runtime.
//!
//! Each tool is a standalone struct implementing the [`Tool`] trait with an
//! async `execute`. The registry is assembled per run from ordered
//! [`ToolProvider`]s and is read-only afterwards. Invocation goes through
//! [`ToolRegistry::invoke`], which converts every failure mode (unknown
//! name, malformed arguments, tool error, tool panic) into a typed
//! [`ToolResult`] so the engine never aborts from a single faulty tool.

mod read_file;
mod result;
mod spawner;
mod task;
mod todo_write;
mod write_file;

pub use read_file::ReadFileTool;
pub use result::ToolResult;
pub use spawner::{SubAgentRequest, SubAgentSpawner};
pub use task::TaskTool;
pub use todo_write::TodoWriteTool;
pub use write_file::WriteFileTool;

use jimi_core::Session;
use jimi_llm::LlmToolDefinition;
use jimi_wire::Wire;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Default per-tool execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A tool the model can invoke.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as advertised to the model.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON schema of the parameters record.
    fn parameters_schema(&self) -> Value;

    /// Approval action kind for sensitive tools.
    ///
    /// `None` means the tool is read-only and never consults the approval
    /// arbiter before executing.
    fn action_kind(&self) -> Option<&str> {
        None
    }

    /// Maximum execution time before the engine abandons the call.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    /// Execute the tool with parsed arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Shared context available to every tool invocation.
pub struct ToolContext {
    /// Session shared across the conversation.
    pub session: Arc<Session>,
    /// Wire for tools that publish their own events (todo updates).
    pub wire: Wire,
    /// Workspace root directory.
    pub work_dir: PathBuf,
    /// Sub-agent spawner, injected by the engine before each run.
    spawner: RwLock<Option<Arc<dyn SubAgentSpawner>>>,
}

impl ToolContext {
    /// Create a context for one run.
    #[must_use]
    pub fn new(session: Arc<Session>, wire: Wire) -> Self {
        let work_dir = session.work_dir.clone();
        Self {
            session,
            wire,
            work_dir,
            spawner: RwLock::new(None),
        }
    }

    /// Install the sub-agent spawner (engine, at run start).
    pub async fn set_spawner(&self, spawner: Option<Arc<dyn SubAgentSpawner>>) {
        *self.spawner.write().await = spawner;
    }

    /// Fetch the sub-agent spawner ([`TaskTool`]).
    pub async fn spawner(&self) -> Option<Arc<dyn SubAgentSpawner>> {
        self.spawner.read().await.clone()
    }
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Path not found.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Timed out.
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Contributes tools to a per-run registry.
///
/// Providers are applied in order; a later provider overwrites tools with
/// colliding names.
pub trait ToolProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// The tools this provider contributes.
    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Provider of the built-in tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinToolProvider;

impl ToolProvider for BuiltinToolProvider {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(ReadFileTool),
            Arc::new(WriteFileTool),
            Arc::new(TodoWriteTool),
            Arc::new(TaskTool),
        ]
    }
}

/// Name-keyed tool registry, read-only after construction.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a registry from ordered providers.
    ///
    /// When `allowed` is given, only tools whose name appears in it are
    /// registered (resolving an agent's `tools` list).
    #[must_use]
    pub fn from_providers(
        providers: &[Arc<dyn ToolProvider>],
        allowed: Option<&[String]>,
    ) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            for tool in provider.tools() {
                if let Some(allowed) = allowed
                    && !allowed.iter().any(|n| n == tool.name())
                {
                    continue;
                }
                registry.register(tool);
            }
        }
        registry
    }

    /// Register a tool. Re-registering a name overwrites and logs.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool re-registered, previous definition replaced");
        }
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Export tool definitions for the model, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<LlmToolDefinition> {
        let mut definitions: Vec<LlmToolDefinition> = self
            .tools
            .values()
            .map(|t| {
                LlmToolDefinition::new(t.name())
                    .with_description(t.description())
                    .with_schema(t.parameters_schema())
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Invoke a tool by name with raw JSON arguments.
    ///
    /// Never returns an `Err`: missing tools, malformed arguments, tool
    /// errors, and tool panics all become `ERROR` results fed back to the
    /// model as observations.
    pub async fn invoke(&self, name: &str, raw_args: &str, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"));
        };

        let args: Value = if raw_args.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(raw_args) {
                Ok(value) => value,
                Err(e) => {
                    return ToolResult::error(format!("Invalid arguments JSON: {e}"));
                },
            }
        };

        use futures::FutureExt;
        let outcome = std::panic::AssertUnwindSafe(tool.execute(args, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => ToolResult::ok(output),
            Ok(Err(e)) => ToolResult::error(e.to_string()),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ToolResult::error(format!("Tool panicked: {message}"))
            },
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
