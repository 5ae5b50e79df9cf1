#![deny(unsafe_code)]
#![warn(missing_docs)]
//! MCP external tool bridge.
//!
//! Speaks JSON-RPC 2.0 as a line-delimited protocol over a child
//! process's stdio. After the `initialize` handshake the client discovers
//! the server's tools with `tools/list`; each one is wrapped as a core
//! [`jimi_tools::Tool`] and participates in the normal dispatch flow via
//! `tools/call`.

mod bridge;
mod client;
mod error;
mod types;

pub use bridge::{McpTool, McpToolProvider};
pub use client::{McpClient, McpServerConfig};
pub use error::{McpError, McpResult};
pub use types::{CallToolResult, McpToolInfo};
