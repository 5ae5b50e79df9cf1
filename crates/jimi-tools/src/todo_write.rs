//! Todo list tool.
//!
//! Applies a differential patch to the session todo list and announces the
//! merged state on the wire.

use crate::{Tool, ToolContext, ToolError};
use jimi_core::TodoPatch;
use jimi_wire::WireMessage;
use serde_json::Value;

/// Built-in tool for maintaining the session todo list.
pub struct TodoWriteTool;

#[async_trait::async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Updates the session todo list with a differential patch: items to \
         update or add, keys to delete, and an optional flag to drop every \
         completed item."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "description": "Items to update in place (matched by id or title) or append",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "title": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "done", "cancelled", "error"]
                            },
                            "parent_id": {"type": "string"}
                        },
                        "required": ["title"]
                    }
                },
                "deletes": {
                    "type": "array",
                    "description": "Keys (id or title) of items to remove",
                    "items": {"type": "string"}
                },
                "remove_completed": {
                    "type": "boolean",
                    "description": "Drop every done item after applying the patch"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let patch: TodoPatch = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let (items, stats) = ctx.session.apply_todo_patch(&patch);
        ctx.wire.send(WireMessage::TodoUpdate {
            items,
            stats,
        });

        Ok(format!(
            "Todo list updated: {} items ({} pending, {} in progress, {} done)",
            stats.total, stats.pending, stats.in_progress, stats.done
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jimi_core::Session;
    use jimi_wire::Wire;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_todo_write_applies_patch_and_emits() {
        let session = Arc::new(Session::new(std::env::temp_dir()));
        let wire = Wire::new();
        let mut receiver = wire.subscribe();
        let ctx = ToolContext::new(Arc::clone(&session), wire);

        let result = TodoWriteTool
            .execute(
                serde_json::json!({
                    "items": [
                        {"title": "design api", "status": "in_progress"},
                        {"title": "write tests"}
                    ]
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert!(result.contains("2 items"));
        assert_eq!(session.todos().len(), 2);

        let msg = receiver.recv().await.unwrap();
        match msg.as_ref() {
            WireMessage::TodoUpdate { stats, .. } => {
                assert_eq!(stats.in_progress, 1);
                assert_eq!(stats.pending, 1);
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_todo_write_invalid_patch() {
        let session = Arc::new(Session::new(std::env::temp_dir()));
        let ctx = ToolContext::new(session, Wire::new());
        let result = TodoWriteTool
            .execute(serde_json::json!({"items": [{"status": "done"}]}), &ctx)
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
