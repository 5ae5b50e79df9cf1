//! Wrapping MCP server tools as core tools.

use jimi_tools::{Tool, ToolContext, ToolError};
use serde_json::Value;
use std::sync::Arc;

use crate::client::McpClient;
use crate::types::McpToolInfo;

/// An MCP server tool participating in the normal dispatch flow.
///
/// Named `server:tool` to distinguish bridged tools from built-ins. Every
/// bridged tool is sensitive with a per-server action kind, so one
/// allow-always decision covers a server.
pub struct McpTool {
    client: Arc<McpClient>,
    info: McpToolInfo,
    full_name: String,
    action_kind: String,
}

impl McpTool {
    /// Wrap one discovered tool.
    #[must_use]
    pub fn new(client: Arc<McpClient>, info: McpToolInfo) -> Self {
        let full_name = format!("{}:{}", client.name(), info.name);
        let action_kind = format!("mcp:{}", client.name());
        Self {
            client,
            info,
            full_name,
            action_kind,
        }
    }

    /// Discover and wrap every tool on a server.
    ///
    /// # Errors
    ///
    /// Fails when `tools/list` fails.
    pub async fn discover_all(client: Arc<McpClient>) -> crate::McpResult<Vec<Self>> {
        let infos = client.list_tools().await?;
        Ok(infos
            .into_iter()
            .map(|info| Self::new(Arc::clone(&client), info))
            .collect())
    }
}

/// Tool provider contributing one server's discovered tools to a per-run
/// registry.
pub struct McpToolProvider {
    tools: Vec<Arc<dyn Tool>>,
}

impl McpToolProvider {
    /// Discover a server's tools and build a provider over them.
    ///
    /// # Errors
    ///
    /// Fails when discovery fails.
    pub async fn discover(client: Arc<McpClient>) -> crate::McpResult<Self> {
        let tools = McpTool::discover_all(client)
            .await?
            .into_iter()
            .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            .collect();
        Ok(Self { tools })
    }
}

impl jimi_tools::ToolProvider for McpToolProvider {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }
}

impl std::fmt::Debug for McpToolProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolProvider")
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or("MCP tool")
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    fn action_kind(&self) -> Option<&str> {
        Some(&self.action_kind)
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let result = self
            .client
            .call_tool(&self.info.name, args)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let text = result.first_text().unwrap_or_default().to_string();
        if result.is_error {
            return Err(ToolError::ExecutionFailed(if text.is_empty() {
                "MCP tool reported an error".to_string()
            } else {
                text
            }));
        }
        Ok(text)
    }
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.full_name)
            .finish_non_exhaustive()
    }
}
