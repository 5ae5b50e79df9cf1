//! Context an event carries into hook matching and execution.

use jimi_core::HookEvent;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Snapshot of engine state at the moment an event fires.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The event kind.
    pub event: HookEvent,
    /// Workspace root.
    pub work_dir: PathBuf,
    /// Current tool name (tool events only).
    pub tool_name: Option<String>,
    /// Current tool call id (tool events only).
    pub tool_call_id: Option<String>,
    /// Name of the running agent.
    pub agent_name: Option<String>,
    /// Error message (`on_error` events).
    pub error_message: Option<String>,
    /// Absolute paths of files affected by the current tool call.
    pub modified_files: Vec<PathBuf>,
    /// Stringified tool result (`post_tool_call` events).
    pub tool_result: Option<String>,
}

impl HookContext {
    /// Create a context for an event in `work_dir`.
    #[must_use]
    pub fn new(event: HookEvent, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            event,
            work_dir: work_dir.into(),
            tool_name: None,
            tool_call_id: None,
            agent_name: None,
            error_message: None,
            modified_files: Vec::new(),
            tool_result: None,
        }
    }

    /// Set the tool name.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, call_id: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self.tool_call_id = Some(call_id.into());
        self
    }

    /// Set the agent name.
    #[must_use]
    pub fn with_agent(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Set the error message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set the affected files.
    #[must_use]
    pub fn with_modified_files(mut self, files: Vec<PathBuf>) -> Self {
        self.modified_files = files;
        self
    }

    /// Set the stringified tool result.
    #[must_use]
    pub fn with_tool_result(mut self, result: impl Into<String>) -> Self {
        self.tool_result = Some(result.into());
        self
    }

    /// Environment variables injected into hook scripts.
    ///
    /// `files` is the (possibly pattern-filtered) file list to expose; the
    /// dispatcher narrows it to the hook's matching files.
    #[must_use]
    pub fn env_vars(&self, files: &[PathBuf]) -> Vec<(String, String)> {
        let mut vars = vec![(
            "JIMI_WORK_DIR".to_string(),
            self.work_dir.display().to_string(),
        )];
        if let Some(ref tool_name) = self.tool_name {
            vars.push(("JIMI_TOOL_NAME".to_string(), tool_name.clone()));
        }
        if let Some(ref call_id) = self.tool_call_id {
            vars.push(("JIMI_TOOL_CALL_ID".to_string(), call_id.clone()));
        }
        if let Some(ref agent) = self.agent_name {
            vars.push(("JIMI_AGENT_NAME".to_string(), agent.clone()));
        }
        if let Some(ref error) = self.error_message {
            vars.push(("JIMI_ERROR_MESSAGE".to_string(), error.clone()));
        }
        if !files.is_empty() {
            let joined = files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            vars.push(("JIMI_MODIFIED_FILES".to_string(), joined));
        }
        vars
    }
}

static VAR_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap_or_else(|_| unreachable!())
});

/// Substitute `${VAR}` placeholders in a script.
///
/// A bare name resolves against the injected variables directly, then with
/// a `JIMI_` prefix (`${MODIFIED_FILES}` reads `JIMI_MODIFIED_FILES`).
/// Unknown placeholders are left untouched for the shell to resolve.
#[must_use]
pub fn substitute_vars(script: &str, vars: &[(String, String)]) -> String {
    VAR_PATTERN
        .replace_all(script, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let prefixed = format!("JIMI_{name}");
            vars.iter()
                .find(|(k, _)| k == name || k == &prefixed)
                .map_or_else(|| caps[0].to_string(), |(_, v)| v.clone())
        })
        .into_owned()
}
