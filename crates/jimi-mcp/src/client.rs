//! Line-delimited JSON-RPC client over child process stdio.

use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::{McpError, McpResult};
use crate::types::{CallToolResult, JsonRpcRequest, JsonRpcResponse, McpToolInfo};

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration of one MCP server process.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server name (prefixes bridged tool names).
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    /// Create a config for `command`.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Add arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Client for one MCP server process.
pub struct McpClient {
    name: String,
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl McpClient {
    /// Spawn the server process and perform the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned or the handshake fails.
    pub async fn connect(config: &McpServerConfig) -> McpResult<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::SpawnFailed {
                server: config.name.clone(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailed {
            server: config.name.clone(),
            message: "no stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailed {
            server: config.name.clone(),
            message: "no stdout pipe".to_string(),
        })?;

        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));

        // Reader task: route response lines to their waiting requests.
        {
            let pending = Arc::clone(&pending);
            let server = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                        Ok(response) => {
                            let Some(id) = response.id else {
                                debug!(server = %server, "Ignoring server notification");
                                continue;
                            };
                            let sender = pending
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner)
                                .remove(&id);
                            if let Some(sender) = sender {
                                let _ = sender.send(response);
                            } else {
                                warn!(server = %server, id, "Response for unknown request");
                            }
                        },
                        Err(e) => {
                            warn!(server = %server, error = %e, "Unparseable MCP line");
                        },
                    }
                }
                debug!(server = %server, "MCP stdout closed");
            });
        }

        let client = Self {
            name: config.name.clone(),
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
        };

        client
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "jimi", "version": env!("CARGO_PKG_VERSION")}
                }),
            )
            .await?;
        client.notify("notifications/initialized").await?;

        info!(server = %client.name, "MCP server initialized");
        Ok(client)
    }

    /// Server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discover the server's tools.
    ///
    /// # Errors
    ///
    /// Fails on transport or protocol errors.
    pub async fn list_tools(&self) -> McpResult<Vec<McpToolInfo>> {
        let result = self
            .request("tools/list", serde_json::json!({}))
            .await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(tools)?)
    }

    /// Call a tool on the server.
    ///
    /// # Errors
    ///
    /// Fails on transport or protocol errors; a tool-level failure is a
    /// successful response with `is_error` set.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({"name": name, "arguments": arguments}),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Terminate the server process.
    pub async fn shutdown(&self) {
        if let Err(e) = self.child.lock().await.kill().await {
            warn!(server = %self.name, error = %e, "Failed to kill MCP server");
        }
    }

    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, sender);

        self.send_line(&JsonRpcRequest::new(id, method, params))
            .await?;

        let response =
            tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), receiver)
                .await
                .map_err(|_| {
                    self.pending
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .remove(&id);
                    McpError::Timeout {
                        method: method.to_string(),
                        seconds: REQUEST_TIMEOUT_SECS,
                    }
                })?
                .map_err(|_| McpError::Transport("server closed the connection".to_string()))?;

        if let Some(error) = response.error {
            return Err(McpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str) -> McpResult<()> {
        self.send_line(&JsonRpcRequest::notification(method)).await
    }

    async fn send_line(&self, request: &JsonRpcRequest) -> McpResult<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
