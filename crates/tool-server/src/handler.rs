//! Handler trait for MCP tool calls.
//!
//! Implementors provide the tool catalogue and the tool logic; the server
//! takes care of framing, the lifecycle handshake and error mapping.

use std::future::Future;
use std::pin::Pin;

use linshare_protocol::{CallToolResult, ServerInfo, ToolDescriptor};
use serde_json::Value;

use crate::ToolCallError;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Domain side of the tool server.
///
/// Each `tools/call` runs in its own task, so `call_tool` may be invoked
/// concurrently, including for the same tool.
pub trait Handler: Send + Sync + 'static {
    /// Name and version reported in the `initialize` reply.
    fn server_info(&self) -> ServerInfo;

    /// Usage notes for the assistant, sent with the `initialize` reply.
    fn instructions(&self) -> Option<String> {
        None
    }

    /// Tools advertised by `tools/list`.
    fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Runs a tool.
    ///
    /// Return [`ToolCallError`] only for an unknown tool or arguments that do
    /// not match its schema; report anything the tool itself failed at as
    /// [`CallToolResult::error`].
    fn call_tool(
        &self,
        name: String,
        arguments: Value,
    ) -> HandlerFuture<'_, Result<CallToolResult, ToolCallError>>;

    /// Called when the client sends `notifications/initialized`.
    fn on_initialized(&self) -> HandlerFuture<'_, ()> {
        Box::pin(async {})
    }
}
