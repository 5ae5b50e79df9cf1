//! Meta-command execution.
//!
//! Resolves `command`-type hook steps against the loaded command set and
//! runs them through the hook execution machinery, so user-defined
//! commands participate in composite hooks.

use async_trait::async_trait;
use jimi_hooks::{
    CommandRunner, HookContext, HookError, HookExecution, HookOutcome, HookResult, HookRunner,
    HookSpec,
};
use std::collections::HashMap;
use tracing::debug;

use crate::command::CommandSpec;

/// Runs named meta-commands from loaded [`CommandSpec`]s.
pub struct CommandSpecRunner {
    commands: HashMap<String, CommandSpec>,
    runner: HookRunner,
}

impl CommandSpecRunner {
    /// Create a runner over the loaded command set.
    #[must_use]
    pub fn new(commands: HashMap<String, CommandSpec>) -> Self {
        Self {
            commands,
            runner: HookRunner::new(),
        }
    }

    fn resolve(&self, name: &str) -> Option<&CommandSpec> {
        self.commands
            .get(name)
            .or_else(|| self.commands.values().find(|c| c.answers_to(name)))
    }
}

#[async_trait]
impl CommandRunner for CommandSpecRunner {
    async fn run(&self, command: &str, ctx: &HookContext) -> HookResult<String> {
        let spec = self
            .resolve(command)
            .ok_or_else(|| HookError::CommandFailed {
                command: command.to_string(),
                message: "unknown command".to_string(),
            })?;

        if !spec.enabled {
            return Err(HookError::CommandFailed {
                command: command.to_string(),
                message: "command is disabled".to_string(),
            });
        }
        // Approval-gated commands go through an interactive frontend, not
        // the hook path.
        if spec.require_approval {
            return Err(HookError::CommandFailed {
                command: command.to_string(),
                message: "command requires approval".to_string(),
            });
        }

        for precondition in &spec.preconditions {
            let check = HookSpec::new(format!("{}:precondition", spec.name), ctx.event)
                .with_execution(HookExecution::script(precondition));
            let record = self.runner.execute(&check, ctx, &ctx.modified_files).await;
            if !record.outcome.is_success() {
                return Err(HookError::CommandFailed {
                    command: command.to_string(),
                    message: format!("precondition failed: {precondition}"),
                });
            }
        }

        debug!(command = %spec.name, "Executing meta-command");
        let wrapper = HookSpec::new(spec.name.clone(), ctx.event)
            .with_execution(spec.execution.clone());
        let record = self.runner.execute(&wrapper, ctx, &ctx.modified_files).await;

        match record.outcome {
            HookOutcome::Completed { stdout } => Ok(stdout),
            HookOutcome::Blocked { reason } => Ok(format!("block: {reason}")),
            HookOutcome::Failed { error } => Err(HookError::CommandFailed {
                command: command.to_string(),
                message: error,
            }),
            HookOutcome::Skipped { reason } => Err(HookError::CommandFailed {
                command: command.to_string(),
                message: format!("skipped: {reason}"),
            }),
        }
    }
}

impl std::fmt::Debug for CommandSpecRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpecRunner")
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}
