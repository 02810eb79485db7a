//! Handler implementation for the MCP tool server.
//!
//! `McpHandler` implements the `tool_server::Handler` trait and dispatches
//! every `tools/call` to the matching method in `handlers/`.

use std::sync::Arc;

use linshare_protocol::{CallToolResult, ServerInfo, ToolDescriptor};
use linshare_tool_server::{Handler, HandlerFuture, ToolCallError};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::state::ServerState;
use crate::tools;

const INSTRUCTIONS: &str = "Upload files to LinShare. Send large files with \
user_remote_upload_by_chunks (base64 chunks, zero-based chunk_index, mark the last one with \
is_final or declare total_chunks). Files placed in the upload directory can be sent with \
upload_file_from_local_directory.";

pub struct McpHandler {
    pub state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

/// Decodes tool arguments; a missing `arguments` object counts as empty.
fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolCallError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ToolCallError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

impl Handler for McpHandler {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    fn instructions(&self) -> Option<String> {
        Some(INSTRUCTIONS.into())
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        tools::catalogue()
    }

    fn call_tool(
        &self,
        name: String,
        arguments: Value,
    ) -> HandlerFuture<'_, Result<CallToolResult, ToolCallError>> {
        Box::pin(async move {
            tracing::info!(tool = %name, "tool called");

            let result = match name.as_str() {
                tools::UPLOAD_BY_CHUNKS => {
                    self.handle_upload_chunk(parse_args(&name, arguments)?)
                        .await
                }
                tools::FINALIZE_UPLOAD => {
                    self.handle_finalize_upload(parse_args(&name, arguments)?)
                        .await
                }
                tools::LIST_UPLOAD_SESSIONS => self.handle_list_upload_sessions().await,
                tools::LIST_UPLOAD_FILES => self.handle_list_upload_files().await,
                tools::GET_DIRECTORY_INFO => self.handle_get_directory_info().await,
                tools::UPLOAD_LOCAL_FILE => {
                    self.handle_upload_local_file(parse_args(&name, arguments)?)
                        .await
                }
                _ => return Err(ToolCallError::UnknownTool(name)),
            };

            if result.is_error {
                tracing::warn!(tool = %name, "tool failed: {}", result.joined_text());
            }
            Ok(result)
        })
    }

    fn on_initialized(&self) -> HandlerFuture<'_, ()> {
        Box::pin(async {
            tracing::info!("client initialized");
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use linshare_client::{ClientError, Destination, DocumentUploader, UploadFuture, UploadedDocument};
    use tempfile::TempDir;

    use super::McpHandler;
    use crate::state::ServerState;

    /// A recorded upload: file name, bytes read from disk, destination.
    pub(crate) type Upload = (String, Vec<u8>, Destination);

    /// In-memory uploader that records what it was asked to send.
    #[derive(Default)]
    pub(crate) struct FakeUploader {
        pub uploads: Mutex<Vec<Upload>>,
        pub fail_with: Mutex<Option<String>>,
    }

    impl DocumentUploader for FakeUploader {
        fn upload<'a>(
            &'a self,
            path: &'a Path,
            file_name: &'a str,
            destination: &'a Destination,
        ) -> UploadFuture<'a> {
            Box::pin(async move {
                let failure = self.fail_with.lock().unwrap().clone();
                if let Some(msg) = failure {
                    return Err(ClientError::Upload(msg));
                }
                let data = tokio::fs::read(path).await?;
                let size = data.len() as u64;
                self.uploads
                    .lock()
                    .unwrap()
                    .push((file_name.to_string(), data, destination.clone()));
                Ok(UploadedDocument {
                    file_name: file_name.to_string(),
                    size,
                    upload_uuid: "doc-123".into(),
                    destination: destination.clone(),
                    chunks_sent: 1,
                    chunks_skipped: 0,
                })
            })
        }
    }

    pub(crate) struct Fixture {
        pub dir: TempDir,
        pub handler: McpHandler,
        pub uploader: Arc<FakeUploader>,
    }

    impl Fixture {
        pub(crate) fn upload_dir(&self) -> PathBuf {
            self.dir.path().join("uploads")
        }
    }

    /// Handler with a fake uploader and fresh directories.
    pub(crate) fn fixture() -> Fixture {
        build(true)
    }

    /// Handler with no LinShare configuration.
    pub(crate) fn unconfigured() -> Fixture {
        build(false)
    }

    fn build(configured: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let upload_dir = dir.path().join("uploads");
        let download_dir = dir.path().join("downloads");
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::create_dir_all(&download_dir).unwrap();

        let uploader = Arc::new(FakeUploader::default());
        let handoff: Option<Arc<dyn DocumentUploader>> = if configured {
            Some(uploader.clone())
        } else {
            None
        };
        let state = ServerState::new(upload_dir, download_dir, handoff);
        Fixture {
            dir,
            handler: McpHandler::new(Arc::new(state)),
            uploader,
        }
    }
}
