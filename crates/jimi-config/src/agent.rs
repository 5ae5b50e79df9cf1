//! Agent definitions.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Default per-run step budget.
pub const DEFAULT_MAX_STEPS: u64 = 100;

/// System prompt used by the built-in main agent.
const DEFAULT_SYSTEM_PROMPT: &str = "\
你是 Jimi，一个交互式 AI 编程助手。你通过调用工具来完成用户的任务：读写文件、\
维护待办列表、把复杂任务委派给子代理。每一步先简要说明你的思路，再发出需要的\
工具调用；收到工具结果后继续，直到任务完成为止。

工作准则：
- 一次只做一件事，优先使用工具获取事实而不是猜测。
- 修改文件前先读取它；被用户拒绝的操作不要原样重试。
- 任务可以分解时，用 todo_write 维护待办列表并及时更新状态。

示例：
用户：在 /tmp/notes.txt 写入今天的计划
助手：我先确认文件是否已有内容，然后写入。
（调用 read_file {\"path\": \"/tmp/notes.txt\"}，随后调用 write_file 写入计划内容）
";

/// Immutable agent configuration.
///
/// Loaded from `agent.yaml` plus a sibling `system_prompt.md`; the
/// executor resolves `tools` against the tool registry and `subagents`
/// against the loaded agent set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent name.
    pub name: String,
    /// What this agent is for.
    #[serde(default)]
    pub description: String,
    /// Definition version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Model override; the engine falls back to its configured provider.
    #[serde(default)]
    pub model: Option<String>,
    /// Names of tools this agent may use; empty means every registered tool.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Names of agents this agent may dispatch to.
    #[serde(default)]
    pub subagents: Vec<String>,
    /// Per-run step budget.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Base system prompt (role definition plus few-shot examples).
    #[serde(skip)]
    pub system_prompt: String,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

impl AgentSpec {
    /// The built-in main agent, used when no configuration is present.
    #[must_use]
    pub fn default_main() -> Self {
        Self {
            name: "jimi".to_string(),
            description: "默认主代理".to_string(),
            version: default_version(),
            model: None,
            tools: Vec::new(),
            subagents: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Load an agent from its directory (`agent.yaml` + `system_prompt.md`).
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, malformed YAML, or missing fields.
    pub fn load_from_dir(dir: &Path) -> ConfigResult<Self> {
        let yaml_path = dir.join("agent.yaml");
        let content = std::fs::read_to_string(&yaml_path).map_err(|e| ConfigError::Io {
            path: yaml_path.clone(),
            message: e.to_string(),
        })?;
        let mut spec: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            path: yaml_path.clone(),
            message: e.to_string(),
        })?;

        if spec.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: yaml_path,
                field: "name",
            });
        }
        if spec.max_steps == 0 {
            return Err(ConfigError::MissingField {
                path: yaml_path,
                field: "max_steps",
            });
        }

        let prompt_path = dir.join("system_prompt.md");
        spec.system_prompt = if prompt_path.is_file() {
            std::fs::read_to_string(&prompt_path).map_err(|e| ConfigError::Io {
                path: prompt_path,
                message: e.to_string(),
            })?
        } else {
            DEFAULT_SYSTEM_PROMPT.to_string()
        };

        Ok(spec)
    }
}
