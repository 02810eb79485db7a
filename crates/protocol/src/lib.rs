//! Wire types for the LinShare MCP tool server.
//!
//! JSON-RPC 2.0 envelopes, MCP lifecycle and tool payloads, and the
//! argument shapes of the tools exposed by the server.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Method;
pub use envelope::{Request, RequestId, Response, RpcError};
pub use messages::{CallToolParams, CallToolResult, InitializeParams, InitializeResult};
pub use types::{ServerCapabilities, ServerInfo, ToolContent, ToolDescriptor};
