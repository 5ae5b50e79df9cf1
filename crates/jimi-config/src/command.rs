//! Custom command definitions.

use jimi_hooks::HookExecution;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user-defined meta-command.
///
/// Commands share the hook execution model (script, internal command, or
/// composite) and are resolvable by name or alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name.
    pub name: String,
    /// What the command does.
    #[serde(default)]
    pub description: String,
    /// Alternative names.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// What the command runs.
    pub execution: HookExecution,
    /// Parameter schema for invocation arguments.
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Shell preconditions checked before execution.
    #[serde(default)]
    pub preconditions: Vec<String>,
    /// Gate execution on user consent.
    #[serde(default)]
    pub require_approval: bool,
    /// Whether the command is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CommandSpec {
    /// Whether `name` refers to this command (name or alias).
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_parse() {
        let yaml = r"
name: format-all
description: run the formatter over the workspace
aliases: [fmt]
execution:
  type: script
  script: cargo fmt
require_approval: true
";
        let command: CommandSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(command.name, "format-all");
        assert!(command.answers_to("fmt"));
        assert!(command.answers_to("format-all"));
        assert!(!command.answers_to("other"));
        assert!(command.require_approval);
        assert!(command.enabled);
    }
}
