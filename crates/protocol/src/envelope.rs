use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::constants::{self, JSONRPC_VERSION};

/// JSON-RPC request identifier (string or number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

/// Error details in a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Incoming JSON-RPC request or notification.
///
/// `params` stays a `RawValue` until the dispatcher knows which payload type
/// the method expects. A missing `id` marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl Request {
    /// Creates a request with the given id, method and params.
    pub fn new<T: Serialize>(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id.into()),
            method: method.into(),
            params: to_raw(params)?,
        })
    }

    /// Creates a notification (request without id).
    pub fn notification<T: Serialize>(
        method: impl Into<String>,
        params: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: None,
            method: method.into(),
            params: to_raw(params)?,
        })
    }

    /// Returns `true` if no response should be sent.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Deserializes the params into the given type.
    pub fn parse_params<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.params {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Creates a success response for this request.
    pub fn reply<T: Serialize>(&self, result: &T) -> Result<Response, serde_json::Error> {
        Response::success(self.id.clone(), result)
    }

    /// Creates an error response for this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Response {
        Response::error(self.id.clone(), code, message)
    }
}

/// Outgoing JSON-RPC response.
///
/// `id` is serialized as `null` when the request could not be parsed far
/// enough to recover one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Creates a success response.
    pub fn success<T: Serialize>(
        id: Option<RequestId>,
        result: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: to_raw(Some(result))?,
            error: None,
        })
    }

    /// Creates an error response.
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error response for a line that is not valid JSON.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(None, constants::PARSE_ERROR, message)
    }

    /// Deserializes the result into the given type.
    pub fn parse_result<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.result {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

fn to_raw<T: Serialize>(value: Option<&T>) -> Result<Option<Box<RawValue>>, serde_json::Error> {
    match value {
        Some(v) => {
            let json = serde_json::to_string(v)?;
            Ok(Some(RawValue::from_string(json)?))
        }
        None => Ok(None),
    }
}
