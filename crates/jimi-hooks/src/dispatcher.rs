//! Hook registry and event dispatch.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::context::HookContext;
use crate::error::{HookError, HookResult};
use crate::executor::{HookExecutionRecord, HookOutcome, HookRunner};
use crate::matcher::{hook_matches, matching_files};
use crate::spec::HookSpec;

/// Gate consulted before a hook with `require_approval` executes.
#[async_trait]
pub trait HookApprovalGate: Send + Sync {
    /// Whether the hook may run.
    async fn approve(&self, hook: &HookSpec, ctx: &HookContext) -> bool;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HookFile {
    Many(Vec<HookSpec>),
    One(HookSpec),
}

/// Matches events to hooks and runs them.
///
/// The hook set is guarded by a read-write lock: dispatch takes the read
/// side, enable/disable/reload take the write side.
pub struct HookDispatcher {
    hooks: RwLock<Vec<HookSpec>>,
    runner: HookRunner,
    gate: RwLock<Option<Arc<dyn HookApprovalGate>>>,
    scopes: RwLock<Vec<PathBuf>>,
}

impl HookDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new(runner: HookRunner) -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            runner,
            gate: RwLock::new(None),
            scopes: RwLock::new(Vec::new()),
        }
    }

    /// Create a dispatcher with a fixed hook set (tests, embedding).
    #[must_use]
    pub fn with_specs(runner: HookRunner, specs: Vec<HookSpec>) -> Self {
        let dispatcher = Self::new(runner);
        *dispatcher
            .hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = specs;
        dispatcher
    }

    /// Install the approval gate for `require_approval` hooks.
    pub fn set_approval_gate(&self, gate: Arc<dyn HookApprovalGate>) {
        *self
            .gate
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(gate);
    }

    /// Load hooks from ordered scope directories.
    ///
    /// Typical scopes are the built-in defaults directory, `~/.jimi/hooks`,
    /// and `<project>/.jimi/hooks`; a hook in a later scope overrides an
    /// earlier one with the same name.
    pub fn load_scopes(&self, scopes: &[PathBuf]) {
        let mut merged: Vec<HookSpec> = Vec::new();
        for scope in scopes {
            if !scope.is_dir() {
                continue;
            }
            match load_hooks_from_dir(scope) {
                Ok(found) => {
                    info!(path = %scope.display(), count = found.len(), "Loaded hooks");
                    for hook in found {
                        if let Some(existing) =
                            merged.iter_mut().find(|h| h.name == hook.name)
                        {
                            debug!(hook = %hook.name, "Hook overridden by later scope");
                            *existing = hook;
                        } else {
                            merged.push(hook);
                        }
                    }
                },
                Err(e) => warn!(path = %scope.display(), error = %e, "Failed to load hooks"),
            }
        }

        *self
            .hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = merged;
        *self
            .scopes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = scopes.to_vec();
    }

    /// Re-read the previously loaded scopes.
    pub fn reload(&self) {
        let scopes = self
            .scopes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        self.load_scopes(&scopes);
    }

    /// Enable or disable a hook by name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut hooks = self
            .hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match hooks.iter_mut().find(|h| h.name == name) {
            Some(hook) => {
                hook.enabled = enabled;
                true
            },
            None => false,
        }
    }

    /// Snapshot of the registered hooks.
    pub fn hooks(&self) -> Vec<HookSpec> {
        self.hooks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Fire every hook matching the event, in priority order.
    ///
    /// Hooks of the event's kind are sorted by priority descending (stable
    /// for ties) and executed sequentially. A failing hook is logged and
    /// the rest continue.
    pub async fn fire(&self, ctx: &HookContext) -> Vec<HookExecutionRecord> {
        let mut matched: Vec<HookSpec> = {
            let hooks = self
                .hooks
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            hooks
                .iter()
                .filter(|h| h.enabled && h.trigger.event == ctx.event && hook_matches(h, ctx))
                .cloned()
                .collect()
        };
        matched.sort_by_key(|h| std::cmp::Reverse(h.priority));

        let mut records = Vec::with_capacity(matched.len());
        for hook in &matched {
            if hook.require_approval && !self.gate_approves(hook, ctx).await {
                records.push(HookExecutionRecord {
                    hook: hook.name.clone(),
                    outcome: HookOutcome::Skipped {
                        reason: "approval not granted".to_string(),
                    },
                    duration_ms: 0,
                });
                continue;
            }

            let files = matching_files(hook, ctx);
            records.push(self.runner.execute(hook, ctx, &files).await);
        }
        records
    }

    async fn gate_approves(&self, hook: &HookSpec, ctx: &HookContext) -> bool {
        let gate = self
            .gate
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        match gate {
            Some(gate) => gate.approve(hook, ctx).await,
            None => {
                warn!(hook = %hook.name, "No approval gate installed, skipping hook");
                false
            },
        }
    }

    /// First veto among the records, if any.
    #[must_use]
    pub fn first_veto(records: &[HookExecutionRecord]) -> Option<String> {
        records
            .iter()
            .find_map(|r| r.outcome.blocked_reason().map(ToString::to_string))
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("hooks", &self.hooks().len())
            .finish_non_exhaustive()
    }
}

/// Load hook specs from every YAML file in a directory.
fn load_hooks_from_dir(dir: &Path) -> HookResult<Vec<HookSpec>> {
    let mut hooks = Vec::new();

    let entries = std::fs::read_dir(dir).map_err(|e| HookError::DirectoryReadFailed {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    paths.sort();

    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(|e| HookError::ParseFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let parsed: HookFile =
            serde_yaml::from_str(&content).map_err(|e| HookError::ParseFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        match parsed {
            HookFile::Many(list) => hooks.extend(list),
            HookFile::One(hook) => hooks.push(hook),
        }
    }

    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::HookExecution;
    use jimi_core::HookEvent;
    use tempfile::TempDir;

    fn script_hook(name: &str, priority: i32, script: &str) -> HookSpec {
        HookSpec::new(name, HookEvent::PreToolCall)
            .with_execution(HookExecution::script(script))
            .with_priority(priority)
    }

    #[tokio::test]
    async fn test_fire_filters_by_event() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![
                script_hook("pre", 0, "echo pre"),
                HookSpec::new("post", HookEvent::PostToolCall)
                    .with_execution(HookExecution::script("echo post")),
            ],
        );
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        let records = dispatcher.fire(&ctx).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hook, "pre");
    }

    #[tokio::test]
    async fn test_fire_priority_order() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![
                script_hook("low", 1, "echo low"),
                script_hook("high", 10, "echo high"),
                script_hook("mid", 5, "echo mid"),
            ],
        );
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        let records = dispatcher.fire(&ctx).await;
        let order: Vec<&str> = records.iter().map(|r| r.hook.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_fire_stable_for_priority_ties() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![
                script_hook("first", 5, "echo 1"),
                script_hook("second", 5, "echo 2"),
            ],
        );
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        let records = dispatcher.fire(&ctx).await;
        let order: Vec<&str> = records.iter().map(|r| r.hook.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_disabled_hook_not_fired() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![script_hook("off", 0, "echo off").disabled()],
        );
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        assert!(dispatcher.fire(&ctx).await.is_empty());
    }

    #[tokio::test]
    async fn test_set_enabled_toggles() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![script_hook("toggle", 0, "echo on")],
        );
        assert!(dispatcher.set_enabled("toggle", false));
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        assert!(dispatcher.fire(&ctx).await.is_empty());
        assert!(dispatcher.set_enabled("toggle", true));
        assert_eq!(dispatcher.fire(&ctx).await.len(), 1);
        assert!(!dispatcher.set_enabled("missing", true));
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let dispatcher = HookDispatcher::with_specs(
            HookRunner::new(),
            vec![
                script_hook("bad", 10, "exit 1"),
                script_hook("good", 0, "echo fine"),
            ],
        );
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        let records = dispatcher.fire(&ctx).await;
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].outcome, HookOutcome::Failed { .. }));
        assert!(records[1].outcome.is_success());
    }

    #[tokio::test]
    async fn test_require_approval_without_gate_skips() {
        let mut hook = script_hook("gated", 0, "echo gated");
        hook.require_approval = true;
        let dispatcher = HookDispatcher::with_specs(HookRunner::new(), vec![hook]);
        let ctx = HookContext::new(HookEvent::PreToolCall, std::env::temp_dir());
        let records = dispatcher.fire(&ctx).await;
        assert!(matches!(records[0].outcome, HookOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_scope_override_by_name() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        std::fs::write(
            user.path().join("fmt.yaml"),
            r"
name: auto-format
trigger:
  type: post_tool_call
execution:
  type: script
  script: echo user-scope
",
        )
        .unwrap();
        std::fs::write(
            project.path().join("fmt.yaml"),
            r"
name: auto-format
trigger:
  type: post_tool_call
execution:
  type: script
  script: echo project-scope
",
        )
        .unwrap();

        let dispatcher = HookDispatcher::new(HookRunner::new());
        dispatcher.load_scopes(&[user.path().to_path_buf(), project.path().to_path_buf()]);

        let hooks = dispatcher.hooks();
        assert_eq!(hooks.len(), 1);
        match &hooks[0].execution {
            HookExecution::Script { script, .. } => {
                assert!(script.contains("project-scope"));
            },
            other => panic!("unexpected execution: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_list_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("hooks.yaml"),
            r"
- name: a
  trigger:
    type: pre_tool_call
  execution:
    type: script
    script: echo a
- name: b
  trigger:
    type: on_error
  execution:
    type: script
    script: echo b
",
        )
        .unwrap();

        let dispatcher = HookDispatcher::new(HookRunner::new());
        dispatcher.load_scopes(&[dir.path().to_path_buf()]);
        assert_eq!(dispatcher.hooks().len(), 2);
    }

    #[tokio::test]
    async fn test_first_veto() {
        let records = vec![
            HookExecutionRecord {
                hook: "a".to_string(),
                outcome: HookOutcome::Completed {
                    stdout: String::new(),
                },
                duration_ms: 0,
            },
            HookExecutionRecord {
                hook: "b".to_string(),
                outcome: HookOutcome::Blocked {
                    reason: "nope".to_string(),
                },
                duration_ms: 0,
            },
        ];
        assert_eq!(HookDispatcher::first_veto(&records), Some("nope".to_string()));
    }
}
