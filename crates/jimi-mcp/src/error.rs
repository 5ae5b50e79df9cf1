//! MCP error types.

use thiserror::Error;

/// Errors from the MCP bridge.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be started.
    #[error("failed to spawn MCP server '{server}': {message}")]
    SpawnFailed {
        /// Server name.
        server: String,
        /// Error message.
        message: String,
    },

    /// The stdio transport broke.
    #[error("MCP transport error: {0}")]
    Transport(String),

    /// The server returned a JSON-RPC error.
    #[error("MCP error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// A request timed out.
    #[error("MCP request '{method}' timed out after {seconds}s")]
    Timeout {
        /// The method that timed out.
        method: String,
        /// The timeout in seconds.
        seconds: u64,
    },

    /// A message could not be serialized or parsed.
    #[error("MCP serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;
