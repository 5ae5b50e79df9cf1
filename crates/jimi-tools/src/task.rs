//! Task tool — dispatches sub-agents.

use crate::{SubAgentRequest, Tool, ToolContext, ToolError};
use serde_json::Value;
use std::time::Duration;

/// Sub-agents inherit a generous budget; the nested run enforces its own
/// step limits.
const TASK_TIMEOUT: Duration = Duration::from_secs(600);

/// Built-in tool for dispatching a task to a sub-agent.
pub struct TaskTool;

#[async_trait::async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegates a task to a sub-agent. Blocks until the sub-agent \
         completes and returns its summary, or runs it in the background \
         and returns a task id."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "subagent": {
                    "type": "string",
                    "description": "Name of the sub-agent to run (default sub-agent when omitted)"
                },
                "description": {
                    "type": "string",
                    "description": "The task to hand to the sub-agent"
                },
                "background": {
                    "type": "boolean",
                    "description": "Run asynchronously and return a task id immediately"
                }
            },
            "required": ["description"]
        })
    }

    fn timeout(&self) -> Duration {
        TASK_TIMEOUT
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("description is required".into()))?;

        let mut request = SubAgentRequest::new(description);
        if let Some(agent) = args.get("subagent").and_then(Value::as_str) {
            request = request.with_agent(agent);
        }
        if args.get("background").and_then(Value::as_bool) == Some(true) {
            request = request.in_background();
        }

        let spawner = ctx.spawner().await.ok_or_else(|| {
            ToolError::ExecutionFailed("sub-agent dispatch is unavailable in this run".into())
        })?;

        spawner.spawn(request).await
    }
}
