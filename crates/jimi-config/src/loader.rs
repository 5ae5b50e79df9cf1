//! Layered configuration discovery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::AgentSpec;
use crate::command::CommandSpec;
use crate::error::{ConfigError, ConfigResult};

/// Discovers agents, commands, and hook directories across config scopes.
///
/// Scopes are ordered; a definition in a later scope overrides an earlier
/// one with the same name.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    scopes: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader over explicit scope directories.
    #[must_use]
    pub fn new(scopes: Vec<PathBuf>) -> Self {
        Self { scopes }
    }

    /// The standard scopes for a workspace: `~/.jimi`, then
    /// `<work_dir>/.jimi`.
    #[must_use]
    pub fn standard(work_dir: &Path) -> Self {
        let mut scopes = Vec::new();
        if let Some(user) = jimi_core::user_jimi_dir() {
            scopes.push(user);
        }
        scopes.push(jimi_core::jimi_dir(work_dir));
        Self { scopes }
    }

    /// The scope directories, in order.
    #[must_use]
    pub fn scopes(&self) -> &[PathBuf] {
        &self.scopes
    }

    /// Hook directories (`<scope>/hooks`) for the hook dispatcher.
    #[must_use]
    pub fn hook_dirs(&self) -> Vec<PathBuf> {
        self.scopes.iter().map(|s| s.join("hooks")).collect()
    }

    /// Load every agent definition.
    ///
    /// Each agent lives in `<scope>/agents/<name>/` with an `agent.yaml`
    /// and an optional `system_prompt.md`. The built-in main agent is
    /// always present unless a scope overrides it by name.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed agent definition.
    pub fn load_agents(&self) -> ConfigResult<HashMap<String, Arc<AgentSpec>>> {
        let mut agents: HashMap<String, Arc<AgentSpec>> = HashMap::new();
        let default_main = AgentSpec::default_main();
        agents.insert(default_main.name.clone(), Arc::new(default_main));

        for scope in &self.scopes {
            let agents_dir = scope.join("agents");
            if !agents_dir.is_dir() {
                continue;
            }
            let entries =
                std::fs::read_dir(&agents_dir).map_err(|e| ConfigError::Io {
                    path: agents_dir.clone(),
                    message: e.to_string(),
                })?;
            for entry in entries.filter_map(Result::ok) {
                let dir = entry.path();
                if !dir.is_dir() || !dir.join("agent.yaml").is_file() {
                    continue;
                }
                let agent = AgentSpec::load_from_dir(&dir)?;
                debug!(agent = %agent.name, path = %dir.display(), "Loaded agent");
                agents.insert(agent.name.clone(), Arc::new(agent));
            }
        }

        validate_subagent_references(&agents)?;
        info!(count = agents.len(), "Agents loaded");
        Ok(agents)
    }

    /// Load every command definition from `<scope>/commands/*.yaml`.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed command definition.
    pub fn load_commands(&self) -> ConfigResult<HashMap<String, CommandSpec>> {
        let mut commands: HashMap<String, CommandSpec> = HashMap::new();

        for scope in &self.scopes {
            let commands_dir = scope.join("commands");
            if !commands_dir.is_dir() {
                continue;
            }
            let entries =
                std::fs::read_dir(&commands_dir).map_err(|e| ConfigError::Io {
                    path: commands_dir.clone(),
                    message: e.to_string(),
                })?;
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                let is_yaml = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml");
                if !is_yaml {
                    continue;
                }
                let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                let command: CommandSpec =
                    serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                if command.name.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        path,
                        field: "name",
                    });
                }
                commands.insert(command.name.clone(), command);
            }
        }

        info!(count = commands.len(), "Commands loaded");
        Ok(commands)
    }
}

fn validate_subagent_references(
    agents: &HashMap<String, Arc<AgentSpec>>,
) -> ConfigResult<()> {
    for agent in agents.values() {
        for subagent in &agent.subagents {
            if !agents.contains_key(subagent) {
                warn!(agent = %agent.name, subagent = %subagent, "Unknown sub-agent reference");
                return Err(ConfigError::UnknownSubAgent {
                    agent: agent.name.clone(),
                    subagent: subagent.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_agent(scope: &Path, name: &str, yaml: &str) {
        let dir = scope.join("agents").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("agent.yaml"), yaml).unwrap();
    }

    #[test]
    fn test_default_main_always_present() {
        let scope = TempDir::new().unwrap();
        let loader = ConfigLoader::new(vec![scope.path().to_path_buf()]);
        let agents = loader.load_agents().unwrap();
        assert!(agents.contains_key("jimi"));
    }

    #[test]
    fn test_later_scope_overrides_by_name() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write_agent(user.path(), "design", "name: design\nmax_steps: 10\n");
        write_agent(project.path(), "design", "name: design\nmax_steps: 30\n");

        let loader = ConfigLoader::new(vec![
            user.path().to_path_buf(),
            project.path().to_path_buf(),
        ]);
        let agents = loader.load_agents().unwrap();
        assert_eq!(agents["design"].max_steps, 30);
    }

    #[test]
    fn test_unknown_subagent_reference_is_fatal() {
        let scope = TempDir::new().unwrap();
        write_agent(
            scope.path(),
            "main2",
            "name: main2\nsubagents: [ghost]\n",
        );
        let loader = ConfigLoader::new(vec![scope.path().to_path_buf()]);
        let err = loader.load_agents().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSubAgent { .. }));
    }

    #[test]
    fn test_load_commands() {
        let scope = TempDir::new().unwrap();
        let commands_dir = scope.path().join("commands");
        std::fs::create_dir_all(&commands_dir).unwrap();
        std::fs::write(
            commands_dir.join("fmt.yaml"),
            r"
name: format-all
aliases: [fmt]
execution:
  type: script
  script: cargo fmt
",
        )
        .unwrap();

        let loader = ConfigLoader::new(vec![scope.path().to_path_buf()]);
        let commands = loader.load_commands().unwrap();
        assert!(commands["format-all"].answers_to("fmt"));
    }

    #[test]
    fn test_hook_dirs_per_scope() {
        let loader = ConfigLoader::new(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(
            loader.hook_dirs(),
            vec![PathBuf::from("/a/hooks"), PathBuf::from("/b/hooks")]
        );
    }
}
