//! Hook execution: scripts, meta-commands, and composites.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::context::{HookContext, substitute_vars};
use crate::error::{HookError, HookResult};
use crate::spec::{HookExecution, HookSpec, StepAction};

/// Outcome of one hook execution.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    /// The hook ran to completion.
    Completed {
        /// Captured stdout.
        stdout: String,
    },
    /// The hook vetoed the triggering operation.
    Blocked {
        /// Veto reason.
        reason: String,
    },
    /// The hook failed; logged and isolated.
    Failed {
        /// Error message.
        error: String,
    },
    /// The hook did not run.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

impl HookOutcome {
    /// Whether the hook ran successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Veto reason, when this outcome blocks the operation.
    #[must_use]
    pub fn blocked_reason(&self) -> Option<&str> {
        match self {
            Self::Blocked { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Record of one executed hook.
#[derive(Debug, Clone)]
pub struct HookExecutionRecord {
    /// Hook name.
    pub hook: String,
    /// The outcome.
    pub outcome: HookOutcome,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Executes named meta-commands on behalf of `command` hooks.
///
/// The engine provides the implementation; hooks resolve command names
/// through this seam so internal commands participate in composites.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a named command, returning its output.
    async fn run(&self, command: &str, ctx: &HookContext) -> HookResult<String>;
}

/// A runner that rejects every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCommandRunner;

#[async_trait]
impl CommandRunner for NoopCommandRunner {
    async fn run(&self, command: &str, _ctx: &HookContext) -> HookResult<String> {
        Err(HookError::NoCommandRunner(command.to_string()))
    }
}

/// Runs one hook with the appropriate handler.
pub struct HookRunner {
    command_runner: std::sync::Arc<dyn CommandRunner>,
}

impl HookRunner {
    /// Create a runner with no meta-command support.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command_runner: std::sync::Arc::new(NoopCommandRunner),
        }
    }

    /// Create a runner resolving meta-commands through `command_runner`.
    #[must_use]
    pub fn with_command_runner(command_runner: std::sync::Arc<dyn CommandRunner>) -> Self {
        Self { command_runner }
    }

    /// Execute a single hook against `ctx`, exposing `files` to its script
    /// environment.
    pub async fn execute(
        &self,
        hook: &HookSpec,
        ctx: &HookContext,
        files: &[std::path::PathBuf],
    ) -> HookExecutionRecord {
        let started = Instant::now();
        debug!(hook = %hook.name, event = %ctx.event, "Executing hook");

        let outcome = match self.run_execution(&hook.execution, ctx, files).await {
            Ok(outcome) => {
                info!(hook = %hook.name, "Hook executed");
                outcome
            },
            Err(e) => {
                error!(hook = %hook.name, error = %e, "Hook execution failed");
                HookOutcome::Failed {
                    error: e.to_string(),
                }
            },
        };

        HookExecutionRecord {
            hook: hook.name.clone(),
            outcome,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn run_execution(
        &self,
        execution: &HookExecution,
        ctx: &HookContext,
        files: &[std::path::PathBuf],
    ) -> HookResult<HookOutcome> {
        match execution {
            HookExecution::Script {
                script,
                timeout_secs,
            } => self.run_script(script, *timeout_secs, ctx, files).await,
            HookExecution::Command { command } => {
                let stdout = self.command_runner.run(command, ctx).await?;
                Ok(parse_outcome(&stdout))
            },
            HookExecution::Composite { steps } => {
                let mut combined = String::new();
                for step in steps {
                    let result = match &step.action {
                        StepAction::Script {
                            script,
                            timeout_secs,
                        } => self.run_script(script, *timeout_secs, ctx, files).await,
                        StepAction::Command { command } => self
                            .command_runner
                            .run(command, ctx)
                            .await
                            .map(|stdout| parse_outcome(&stdout)),
                    };
                    match result {
                        Ok(HookOutcome::Blocked { reason }) => {
                            return Ok(HookOutcome::Blocked { reason });
                        },
                        Ok(HookOutcome::Completed { stdout }) => {
                            if !stdout.is_empty() {
                                combined.push_str(&stdout);
                                combined.push('\n');
                            }
                        },
                        Ok(_) => {},
                        Err(e) if step.continue_on_failure => {
                            debug!(error = %e, "Composite step failed, continuing");
                        },
                        Err(e) => return Err(e),
                    }
                }
                Ok(HookOutcome::Completed { stdout: combined })
            },
        }
    }

    async fn run_script(
        &self,
        script: &str,
        timeout_secs: u64,
        ctx: &HookContext,
        files: &[std::path::PathBuf],
    ) -> HookResult<HookOutcome> {
        let env = ctx.env_vars(files);
        let resolved = substitute_vars(script, &env);

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(&resolved);
        for (key, value) in &env {
            command.env(key, value);
        }
        if ctx.work_dir.is_dir() {
            command.current_dir(&ctx.work_dir);
        }

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), command.output())
            .await
            .map_err(|_| HookError::Timeout(timeout_secs))?
            .map_err(|e| HookError::SpawnFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(HookError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(parse_outcome(&stdout))
    }
}

impl Default for HookRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRunner").finish_non_exhaustive()
    }
}

/// Interpret captured stdout: a first line of `block` (optionally
/// `block: reason`) vetoes the triggering operation.
fn parse_outcome(stdout: &str) -> HookOutcome {
    let first_line = stdout.lines().next().unwrap_or_default().trim();
    if first_line == "block" {
        return HookOutcome::Blocked {
            reason: "blocked by hook".to_string(),
        };
    }
    if let Some(reason) = first_line.strip_prefix("block:") {
        return HookOutcome::Blocked {
            reason: reason.trim().to_string(),
        };
    }
    HookOutcome::Completed {
        stdout: stdout.to_string(),
    }
}
