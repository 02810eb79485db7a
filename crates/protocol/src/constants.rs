/// JSON-RPC version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision this server prefers.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// MCP protocol revisions the server can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Maximum accepted length of a single JSON-RPC line (64 MiB).
///
/// Chunk payloads travel base64-encoded inside `tools/call` arguments, so a
/// line must hold at least one encoded chunk plus the envelope.
pub const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

// JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Negotiates the protocol revision from the one requested by the client.
///
/// Echoes the client's revision when supported, otherwise answers with the
/// latest revision and lets the client decide whether to disconnect.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// MCP methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    // Lifecycle
    Initialize,
    Initialized,
    Ping,

    // Tools
    ToolsList,
    ToolsCall,

    // Notifications from the client
    Cancelled,
}

impl Method {
    /// Parses a JSON-RPC method name.
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            "initialize" => Self::Initialize,
            "notifications/initialized" => Self::Initialized,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            "notifications/cancelled" => Self::Cancelled,
            _ => return None,
        };
        Some(method)
    }

    /// Returns the wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Cancelled => "notifications/cancelled",
        }
    }

    /// Returns `true` for methods sent as notifications (no reply expected).
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Initialized | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_roundtrip() {
        for m in [
            Method::Initialize,
            Method::Initialized,
            Method::Ping,
            Method::ToolsList,
            Method::ToolsCall,
            Method::Cancelled,
        ] {
            assert_eq!(Method::from_name(m.as_str()), Some(m));
        }
    }

    #[test]
    fn unknown_method_is_none() {
        assert_eq!(Method::from_name("resources/list"), None);
        assert_eq!(Method::from_name(""), None);
    }

    #[test]
    fn notifications_are_flagged() {
        assert!(Method::Initialized.is_notification());
        assert!(Method::Cancelled.is_notification());
        assert!(!Method::ToolsCall.is_notification());
    }

    #[test]
    fn negotiation_echoes_supported_version() {
        assert_eq!(negotiate_protocol_version("2024-11-05"), "2024-11-05");
    }

    #[test]
    fn negotiation_falls_back_to_latest() {
        assert_eq!(negotiate_protocol_version("1999-01-01"), LATEST_PROTOCOL_VERSION);
    }
}
