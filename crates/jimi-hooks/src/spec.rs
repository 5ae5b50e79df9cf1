//! Hook definitions as loaded from YAML.

use jimi_core::HookEvent;
use serde::{Deserialize, Serialize};

/// A declarative hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
    /// Unique name; later config scopes override earlier ones by name.
    pub name: String,
    /// Description of what this hook does.
    #[serde(default)]
    pub description: Option<String>,
    /// When this hook fires.
    pub trigger: HookTrigger,
    /// What this hook runs.
    pub execution: HookExecution,
    /// Execution order within an event kind (higher first).
    #[serde(default)]
    pub priority: i32,
    /// Whether the hook is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Gate execution on user consent.
    #[serde(default)]
    pub require_approval: bool,
}

fn default_enabled() -> bool {
    true
}

impl HookSpec {
    /// Create a hook with the given name and trigger event.
    pub fn new(name: impl Into<String>, event: HookEvent) -> Self {
        Self {
            name: name.into(),
            description: None,
            trigger: HookTrigger::on(event),
            execution: HookExecution::Script {
                script: String::new(),
                timeout_secs: default_timeout(),
            },
            priority: 0,
            enabled: true,
            require_approval: false,
        }
    }

    /// Set the execution.
    #[must_use]
    pub fn with_execution(mut self, execution: HookExecution) -> Self {
        self.execution = execution;
        self
    }

    /// Restrict to specific tool names.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.trigger.tools = tools;
        self
    }

    /// Restrict to file glob patterns.
    #[must_use]
    pub fn with_file_patterns(mut self, patterns: Vec<String>) -> Self {
        self.trigger.file_patterns = patterns;
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Disable the hook.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Matching predicate for a hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookTrigger {
    /// The event kind this hook listens to.
    #[serde(rename = "type")]
    pub event: HookEvent,
    /// Tool names to match; empty matches every tool.
    #[serde(default)]
    pub tools: Vec<String>,
    /// File glob patterns; empty matches every file set.
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Restrict to one agent by name.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Regex the error message must match.
    #[serde(default)]
    pub error_pattern: Option<String>,
}

impl HookTrigger {
    /// Trigger on an event with no further restrictions.
    #[must_use]
    pub fn on(event: HookEvent) -> Self {
        Self {
            event,
            tools: Vec::new(),
            file_patterns: Vec::new(),
            agent_name: None,
            error_pattern: None,
        }
    }
}

/// What a hook runs when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum HookExecution {
    /// Spawn a shell with the configured script.
    Script {
        /// The script text; `${VAR}` placeholders are substituted before
        /// shell invocation.
        script: String,
        /// Timeout in seconds.
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    /// Execute a named internal meta-command.
    Command {
        /// The command name.
        command: String,
    },
    /// Ordered sub-steps; a failing step aborts the rest unless its
    /// `continue_on_failure` flag is set.
    Composite {
        /// The steps, in order.
        steps: Vec<HookStep>,
    },
}

fn default_timeout() -> u64 {
    30
}

impl HookExecution {
    /// A script execution with the default timeout.
    pub fn script(script: impl Into<String>) -> Self {
        Self::Script {
            script: script.into(),
            timeout_secs: default_timeout(),
        }
    }

    /// A meta-command execution.
    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
        }
    }
}

/// One step of a composite execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookStep {
    /// The action this step runs.
    #[serde(flatten)]
    pub action: StepAction,
    /// Keep going when this step fails.
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// Action of a composite step (scripts and commands only; composites do
/// not nest).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StepAction {
    /// Spawn a shell script.
    Script {
        /// The script text.
        script: String,
        /// Timeout in seconds.
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    /// Execute a named meta-command.
    Command {
        /// The command name.
        command: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let yaml = r"
name: auto-format
description: format written java files
trigger:
  type: post_tool_call
  tools: [write_file]
  file_patterns: ['*.java']
execution:
  type: script
  script: fmt ${MODIFIED_FILES}
priority: 10
";
        let hook: HookSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(hook.name, "auto-format");
        assert_eq!(hook.trigger.event, HookEvent::PostToolCall);
        assert_eq!(hook.trigger.tools, vec!["write_file"]);
        assert_eq!(hook.priority, 10);
        assert!(hook.enabled);
        assert!(!hook.require_approval);
        match &hook.execution {
            HookExecution::Script { script, timeout_secs } => {
                assert_eq!(script, "fmt ${MODIFIED_FILES}");
                assert_eq!(*timeout_secs, 30);
            },
            other => panic!("unexpected execution: {other:?}"),
        }
    }

    #[test]
    fn test_composite_yaml() {
        let yaml = r"
name: check-then-notify
trigger:
  type: on_error
  error_pattern: 'timeout'
execution:
  type: composite
  steps:
    - type: script
      script: echo failing
      continue_on_failure: true
    - type: command
      command: notify
";
        let hook: HookSpec = serde_yaml::from_str(yaml).unwrap();
        match &hook.execution {
            HookExecution::Composite { steps } => {
                assert_eq!(steps.len(), 2);
                assert!(steps[0].continue_on_failure);
                assert!(matches!(steps[1].action, StepAction::Command { .. }));
            },
            other => panic!("unexpected execution: {other:?}"),
        }
    }

    #[test]
    fn test_builder() {
        let hook = HookSpec::new("lint", HookEvent::PostToolCall)
            .with_tools(vec!["write_file".to_string()])
            .with_execution(HookExecution::script("lint ${MODIFIED_FILES}"))
            .with_priority(5);
        assert_eq!(hook.name, "lint");
        assert_eq!(hook.priority, 5);
    }
}
