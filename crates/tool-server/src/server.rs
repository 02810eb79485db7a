//! MCP server loop.
//!
//! Reads newline-delimited JSON-RPC messages, runs each request in its own
//! task and sends the replies through the write pump. Notifications never
//! get a reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use linshare_protocol::constants::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, MAX_LINE_LENGTH,
    METHOD_NOT_FOUND, negotiate_protocol_version,
};
use linshare_protocol::messages::ListToolsResult;
use linshare_protocol::{
    CallToolParams, InitializeParams, InitializeResult, Method, Request, RequestId, Response,
    ServerCapabilities,
};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::connection::{self, Sender};
use crate::handler::Handler;
use crate::{ServerError, ToolCallError};

/// The MCP tool server.
pub struct ToolServer<H: Handler> {
    handler: Arc<H>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl<H: Handler> ToolServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(handler: H) -> Arc<Self> {
        Self::with_handler(Arc::new(handler))
    }

    /// Creates a server sharing an existing handler.
    pub fn with_handler(handler: Arc<H>) -> Arc<Self> {
        Arc::new(Self {
            handler,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Stops reading input; in-flight calls are abandoned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Serves the process's stdin and stdout.
    pub async fn run_stdio(self: &Arc<Self>) -> Result<(), ServerError> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves a reader/writer pair until the input ends or
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// On end of input, calls still running are awaited and their replies
    /// written before returning.
    pub async fn run<R, W>(self: &Arc<Self>, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let (sender, rx) = connection::channel();
        let write_cancel = self.cancel.clone();
        let pump = tokio::spawn(connection::write_pump(writer, rx, write_cancel));

        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut in_flight = JoinSet::new();
        // The framed reader yields `None` once after a decode error, then
        // resumes with the next line.
        let mut recovering = false;
        tracing::info!("tool server ready on stdio");

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("tool server shutting down");
                    break;
                }
                // Reap finished calls so the set does not grow unbounded.
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
                line = lines.next() => line,
            };

            match line {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.accept_line(&line, &sender, &mut in_flight).await;
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(max = MAX_LINE_LENGTH, "discarding oversized message");
                    recovering = true;
                    let _ = sender
                        .send(&Response::error(None, INVALID_REQUEST, "message too large"))
                        .await;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    tracing::error!("read error: {e}");
                    break;
                }
                None if recovering => recovering = false,
                None => {
                    tracing::info!("input closed");
                    break;
                }
            }
        }

        if self.cancel.is_cancelled() {
            in_flight.abort_all();
        }
        while in_flight.join_next().await.is_some() {}

        drop(sender);
        let result = pump.await.map_err(std::io::Error::other)?;
        self.running.store(false, Ordering::SeqCst);
        Ok(result?)
    }

    /// Parses one line and either replies at once or spawns the request.
    async fn accept_line(
        self: &Arc<Self>,
        line: &str,
        sender: &Sender,
        in_flight: &mut JoinSet<()>,
    ) {
        let request = match parse_line(line) {
            Ok(request) => request,
            Err(reply) => {
                let _ = sender.send(&reply).await;
                return;
            }
        };

        let handler = Arc::clone(&self.handler);
        let sender = sender.clone();
        in_flight.spawn(async move {
            if let Some(reply) = dispatch(handler.as_ref(), request).await {
                if sender.send(&reply).await.is_err() {
                    tracing::warn!("reply dropped: connection closed");
                }
            }
        });
    }
}

/// Decodes a line into a request, or the error reply to send instead.
fn parse_line(line: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        tracing::debug!("unparseable message: {e}");
        Response::parse_error(format!("parse error: {e}"))
    })?;

    // Recover the id, if any, so even a malformed request gets a reply the
    // client can match.
    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

    if !value.is_object() {
        return Err(Response::error(None, INVALID_REQUEST, "expected a JSON object"));
    }

    // `params` is a `RawValue`, which only deserializes from text.
    let request: Request = serde_json::from_str(line).map_err(|e| {
        Response::error(id.clone(), INVALID_REQUEST, format!("invalid request: {e}"))
    })?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(Response::error(
            id,
            INVALID_REQUEST,
            format!("unsupported jsonrpc version: {}", request.jsonrpc),
        ));
    }
    Ok(request)
}

/// Runs one request. Returns `None` for notifications.
async fn dispatch<H: Handler>(handler: &H, request: Request) -> Option<Response> {
    let Some(method) = Method::from_name(&request.method) else {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "ignoring unknown notification");
            return None;
        }
        tracing::debug!(method = %request.method, "method not found");
        return Some(request.reply_error(
            METHOD_NOT_FOUND,
            format!("method not found: {}", request.method),
        ));
    };

    tracing::debug!(method = method.as_str(), id = ?request.id, "dispatching");

    let reply = match method {
        Method::Initialize => initialize(handler, &request),
        Method::Ping => reply(&request, &serde_json::json!({})),
        Method::ToolsList => reply(
            &request,
            &ListToolsResult {
                tools: handler.list_tools(),
            },
        ),
        Method::ToolsCall => call_tool(handler, &request).await,
        Method::Initialized => {
            handler.on_initialized().await;
            reply(&request, &serde_json::json!({}))
        }
        Method::Cancelled => {
            // Calls run to completion; a cancelled one still answers.
            tracing::debug!("client cancelled a request");
            reply(&request, &serde_json::json!({}))
        }
    };

    if request.is_notification() {
        None
    } else {
        Some(reply)
    }
}

fn initialize<H: Handler>(handler: &H, request: &Request) -> Response {
    let params: InitializeParams = match request.parse_params() {
        Ok(params) => params.unwrap_or_default(),
        Err(e) => return request.reply_error(INVALID_PARAMS, format!("invalid params: {e}")),
    };

    let client = params.client_info.as_ref().map(|c| c.name.as_str());
    let version = negotiate_protocol_version(&params.protocol_version);
    tracing::info!(client, requested = %params.protocol_version, version, "client initializing");

    reply(
        request,
        &InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities::with_tools(),
            server_info: handler.server_info(),
            instructions: handler.instructions(),
        },
    )
}

async fn call_tool<H: Handler>(handler: &H, request: &Request) -> Response {
    let params: CallToolParams = match request.parse_params() {
        Ok(Some(params)) => params,
        Ok(None) => return request.reply_error(INVALID_PARAMS, "missing params"),
        Err(e) => return request.reply_error(INVALID_PARAMS, format!("invalid params: {e}")),
    };

    let tool = params.name.clone();
    match handler.call_tool(params.name, params.arguments).await {
        Ok(result) => {
            if result.is_error {
                tracing::info!(%tool, "tool reported an error");
            }
            reply(request, &result)
        }
        Err(e) => {
            tracing::warn!(%tool, "tool call rejected: {e}");
            request.reply_error(INVALID_PARAMS, e.to_string())
        }
    }
}

fn reply<T: Serialize>(request: &Request, result: &T) -> Response {
    request.reply(result).unwrap_or_else(|e| {
        tracing::error!("failed to serialize result: {e}");
        request.reply_error(INTERNAL_ERROR, "internal error")
    })
}
