//! MCP tool server over stdio.
//!
//! Reads newline-delimited JSON-RPC 2.0 requests, dispatches the MCP
//! lifecycle and tool methods to a [`Handler`], and writes responses
//! through a single write pump so concurrent calls never interleave
//! their output lines.

mod connection;
mod handler;
mod server;

pub use connection::{SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::ToolServer;

/// Capacity of the outgoing response queue.
///
/// Responses are queued with back-pressure, never dropped; this only bounds
/// how far in-flight calls can run ahead of a slow stdout.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the tool server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server already running")]
    AlreadyRunning,
}

/// Failure of a `tools/call` that the client must see as a protocol error.
///
/// Failures of the tool itself are not errors at this level: they are
/// returned as a [`CallToolResult`](linshare_protocol::CallToolResult)
/// with `isError` set.
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}
