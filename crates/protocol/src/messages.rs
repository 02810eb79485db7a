use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ServerCapabilities, ServerInfo, ToolContent, ToolDescriptor};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Client side of the `initialize` handshake.
///
/// Every field is optional so that lenient clients still get a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

/// Name and version announced by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Server side of the `initialize` handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Result of `tools/call`.
///
/// Tool failures are reported here with `is_error` set rather than as
/// JSON-RPC errors, so the assistant can read and react to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Failed result with a single text block.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tool arguments
// ---------------------------------------------------------------------------

/// Arguments of `user_remote_upload_by_chunks`.
///
/// `data_b64` is kept as text: decoding belongs to the session manager so
/// that a malformed payload is rejected without touching the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadChunkArgs {
    pub filename: String,
    pub chunk_index: u64,
    pub data_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workgroup_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uuid: Option<String>,
}

impl UploadChunkArgs {
    /// Upload session key: the explicit id, or the filename when absent.
    pub fn session_key(&self) -> &str {
        match self.session_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.filename,
        }
    }

    /// Whether this chunk closes the sequence.
    ///
    /// An explicit flag wins; otherwise the last index of a declared total
    /// is treated as final.
    pub fn is_final(&self) -> bool {
        self.is_final.unwrap_or_else(|| {
            self.total_chunks
                .is_some_and(|total| self.chunk_index.checked_add(1) == Some(total))
        })
    }
}

/// Arguments of `finalize_chunked_upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeUploadArgs {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workgroup_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uuid: Option<String>,
}

/// Arguments of `upload_file_from_local_directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLocalFileArgs {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workgroup_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uuid: Option<String>,
    #[serde(default = "default_true")]
    pub async_task: bool,
}

fn default_true() -> bool {
    true
}
