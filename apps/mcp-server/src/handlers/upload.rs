use linshare_client::{Destination, UploadedDocument, format_file_size};
use linshare_protocol::CallToolResult;
use linshare_protocol::messages::{FinalizeUploadArgs, UploadChunkArgs, UploadLocalFileArgs};
use linshare_transfer::{AssembledFile, ChunkSubmission, TransferError, resolve_existing_in_dir};

use crate::handler::McpHandler;
use crate::tools;

impl McpHandler {
    pub(crate) async fn handle_upload_chunk(&self, args: UploadChunkArgs) -> CallToolResult {
        let submission = ChunkSubmission {
            session_id: args.session_key(),
            file_name: &args.filename,
            chunk_index: args.chunk_index,
            data_b64: &args.data_b64,
            is_final: args.is_final(),
            total_chunks: args.total_chunks,
        };

        let ack = match self.state.sessions.begin_or_continue_chunk(submission).await {
            Ok(ack) => ack,
            Err(e) => return transfer_error(&e),
        };

        match ack.assembled {
            Some(file) => {
                let destination =
                    Destination::new(args.workgroup_uuid.as_deref(), args.folder_uuid.as_deref());
                self.hand_off(&file, &destination).await
            }
            None => {
                let progress = match args.total_chunks {
                    Some(total) => format!("{}/{total}", ack.received_count),
                    None => ack.received_count.to_string(),
                };
                let note = if ack.duplicate {
                    " (already received, ignored)"
                } else {
                    ""
                };
                CallToolResult::text(format!(
                    "Chunk {} of '{}' received{note}. Chunks held: {progress}. Session: {}",
                    ack.chunk_index, args.filename, ack.session_id
                ))
            }
        }
    }

    pub(crate) async fn handle_finalize_upload(&self, args: FinalizeUploadArgs) -> CallToolResult {
        let file = match self.state.sessions.finalize(&args.session_id).await {
            Ok(file) => file,
            Err(e) => return transfer_error(&e),
        };
        let destination =
            Destination::new(args.workgroup_uuid.as_deref(), args.folder_uuid.as_deref());
        self.hand_off(&file, &destination).await
    }

    pub(crate) async fn handle_list_upload_sessions(&self) -> CallToolResult {
        // Expired sessions would otherwise linger until the next tick.
        self.state.sweeper.sweep_now();
        let sessions = self.state.sessions.snapshot().await;
        if sessions.is_empty() {
            return CallToolResult::text("No upload sessions.");
        }

        let mut out = format!("Upload sessions ({}):\n\n", sessions.len());
        for (i, s) in sessions.iter().enumerate() {
            let state = if s.complete { "complete" } else { "open" };
            let expected = s
                .expected_total
                .map(|t| format!("/{t}"))
                .unwrap_or_default();
            out.push_str(&format!(
                "{}. {} [{state}]\n   File: {}\n   Chunks: {}{expected}\n   Buffered: {}\n   Idle: {}s\n",
                i + 1,
                s.session_id,
                s.file_name,
                s.received_count,
                format_file_size(s.buffered_bytes),
                s.idle.as_secs()
            ));
            if let Some(path) = &s.staged_path {
                out.push_str(&format!("   Staged at: {}\n", path.display()));
            }
            out.push('\n');
        }
        CallToolResult::text(out)
    }

    pub(crate) async fn handle_upload_local_file(&self, args: UploadLocalFileArgs) -> CallToolResult {
        let not_found = || {
            CallToolResult::error(format!(
                "Error: File '{}' not found in upload directory: {}",
                args.filename,
                self.state.upload_dir.display()
            ))
        };

        let path = match resolve_existing_in_dir(&self.state.upload_dir, &args.filename).await {
            Ok(path) => path,
            Err(TransferError::InvalidPath(reason)) => {
                tracing::warn!(file = %args.filename, %reason, "local upload refused");
                return CallToolResult::error(format!(
                    "Error: Access denied - '{}' is outside the upload directory",
                    args.filename
                ));
            }
            Err(_) => return not_found(),
        };

        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return not_found();
        }

        let Some(uploader) = &self.state.uploader else {
            return not_configured();
        };

        let destination = Destination {
            async_task: args.async_task,
            ..Destination::new(args.workgroup_uuid.as_deref(), args.folder_uuid.as_deref())
        };
        match uploader.upload(&path, &args.filename, &destination).await {
            Ok(doc) => CallToolResult::text(uploaded_summary(&doc, None)),
            Err(e) => CallToolResult::error(format!("Error: upload of '{}' failed: {e}", args.filename)),
        }
    }

    /// Sends an assembled file to LinShare.
    ///
    /// The staged file stays in the upload directory either way, so a failed
    /// handoff can be retried with `upload_file_from_local_directory`.
    async fn hand_off(&self, file: &AssembledFile, destination: &Destination) -> CallToolResult {
        tracing::info!(
            session_id = %file.session_id,
            file = %file.file_name,
            size = file.size,
            destination = destination.label(),
            "handing assembled file to LinShare"
        );

        let Some(uploader) = &self.state.uploader else {
            return CallToolResult::error(format!(
                "File '{}' was assembled ({}) at {}, but it was not sent. {}",
                file.file_name,
                format_file_size(file.size),
                file.path.display(),
                not_configured().joined_text()
            ));
        };

        let staged = file.clone();
        let verified = tokio::task::spawn_blocking(move || staged.verify())
            .await
            .unwrap_or_else(|e| Err(TransferError::Io(std::io::Error::other(e))));
        if let Err(e) = verified {
            tracing::warn!(session_id = %file.session_id, error = %e, "staged file check failed");
            return CallToolResult::error(format!(
                "Error: '{}' was not sent: {e}\nUpload it again under a new session id and filename.",
                file.file_name
            ));
        }

        match uploader.upload(&file.path, &file.file_name, destination).await {
            Ok(doc) => CallToolResult::text(uploaded_summary(&doc, Some(file))),
            Err(e) => CallToolResult::error(format!(
                "Error: '{}' was assembled at {} but the LinShare upload failed: {e}\n\
                 Retry with {} (filename: '{}').",
                file.file_name,
                file.path.display(),
                tools::UPLOAD_LOCAL_FILE,
                file.file_name
            )),
        }
    }
}

fn not_configured() -> CallToolResult {
    CallToolResult::error(
        "Error: LinShare is not configured. Set LINSHARE_USER_URL and LINSHARE_JWT_TOKEN.",
    )
}

fn uploaded_summary(doc: &UploadedDocument, file: Option<&AssembledFile>) -> String {
    let mut out = format!(
        "File uploaded successfully!\n\nName: {}\nSize: {}\nUpload UUID: {}\nDestination: {}\n",
        doc.file_name,
        format_file_size(doc.size),
        doc.upload_uuid,
        doc.destination.label()
    );
    if let Some(wg) = &doc.destination.workgroup_uuid {
        out.push_str(&format!("Workgroup: {wg}\n"));
    }
    if let Some(folder) = &doc.destination.folder_uuid {
        out.push_str(&format!("Folder: {folder}\n"));
    }
    if doc.chunks_skipped > 0 {
        out.push_str(&format!(
            "Chunks: {} sent, {} already on server\n",
            doc.chunks_sent, doc.chunks_skipped
        ));
    }
    if let Some(file) = file {
        out.push_str(&format!(
            "Assembled from {} chunk(s), SHA-256 {}\n",
            file.chunk_count, file.sha256
        ));
    }
    out
}

/// Renders a reassembly failure for the assistant.
fn transfer_error(e: &TransferError) -> CallToolResult {
    let hint = match e {
        TransferError::SequenceGap { .. } => {
            "\nThe chunks received so far are kept; send the missing ones to complete the upload."
        }
        TransferError::IoWrite { .. } => {
            "\nThe chunks are kept; retry with finalize_chunked_upload."
        }
        TransferError::SessionAlreadyComplete(_) => {
            "\nStart a new session id to upload another file."
        }
        TransferError::FileNameInUse { .. } => {
            "\nUse another filename, or finish that session first."
        }
        _ => "",
    };
    CallToolResult::error(format!("Error: {e}{hint}"))
}
