//! LinShare user API v5 client.
//!
//! Async HTTP client using `reqwest` with Bearer (JWT) authentication.

use std::path::Path;
use std::time::Duration;

use linshare_transfer::{ChunkReader, DEFAULT_CHUNK_SIZE, TransferError};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::format_file_size;
use crate::types::{
    AuthorizedUser, Destination, FlowChunkResponse, FlowStatus, Quota, UploadedDocument,
};

/// Characters escaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Longest response body kept in an [`ClientError::Api`].
const MAX_ERROR_BODY: usize = 1000;

/// Errors from the LinShare client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("quota check failed: {0}")]
    Quota(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("LinShare is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid JWT token")]
    InvalidToken,
}

/// LinShare user API client.
pub struct LinShareClient {
    http: reqwest::Client,
    base_url: String,
    chunk_size: usize,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl LinShareClient {
    /// Creates a client for the user API at `user_url` (e.g.
    /// `https://linshare.example.org/linshare/webservice/rest/user/v5`).
    pub fn new(user_url: &str, token: &str) -> Result<Self, ClientError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: user_url.trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        })
    }

    /// Creates a client from optional settings, failing with
    /// [`ClientError::NotConfigured`] when either is missing.
    pub fn from_config(user_url: Option<&str>, token: Option<&str>) -> Result<Self, ClientError> {
        let user_url = user_url
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ClientError::NotConfigured("no user API URL".into()))?;
        let token = token
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ClientError::NotConfigured("no JWT token".into()))?;
        Self::new(user_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the Flow.js chunk size (for testing).
    #[cfg(test)]
    pub(crate) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the status polling cadence (for testing).
    #[cfg(test)]
    pub(crate) fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Performs an authenticated GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.http.get(&url).timeout(QUERY_TIMEOUT).send().await?;
        let body = check_status(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Returns the authenticated account.
    pub async fn authorized_user(&self) -> Result<AuthorizedUser, ClientError> {
        self.get_json("/authentication/authorized").await
    }

    /// Returns a quota by id.
    pub async fn quota(&self, quota_uuid: &str) -> Result<Quota, ClientError> {
        self.get_json(&format!("/quota/{}", encode_segment(quota_uuid)))
            .await
    }

    /// Checks that a file of `file_size` bytes fits the account quota and
    /// the per-file limit.
    pub async fn check_quota(&self, file_size: u64) -> Result<Quota, ClientError> {
        let user = self.authorized_user().await?;
        let quota_uuid = user
            .quota_uuid
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::Quota("could not retrieve quotaUuid".into()))?;

        let quota = self.quota(&quota_uuid).await?;
        let available = quota.available();
        if file_size > available {
            return Err(ClientError::Quota(format!(
                "insufficient quota: file size {}, available {}",
                format_file_size(file_size),
                format_file_size(available)
            )));
        }
        if let Some(max) = quota.max_file_size {
            let max = max.max(0) as u64;
            if file_size > max {
                return Err(ClientError::Quota(format!(
                    "file size {} exceeds the per-file limit of {}",
                    format_file_size(file_size),
                    format_file_size(max)
                )));
            }
        }
        Ok(quota)
    }

    /// Asks whether the server already holds a chunk.
    async fn chunk_exists(&self, params: &FlowParams<'_>) -> Result<bool, ClientError> {
        let url = format!("{}/flow.json", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&params.query())
            .timeout(QUERY_TIMEOUT)
            .send()
            .await?;
        Ok(resp.status() == StatusCode::OK)
    }

    /// Posts one chunk as multipart form data.
    async fn send_chunk(
        &self,
        params: &FlowParams<'_>,
        data: Vec<u8>,
    ) -> Result<FlowChunkResponse, ClientError> {
        let url = format!("{}/flow.json", self.base_url);
        let resp = self
            .http
            .post(&url)
            .query(&[("asyncTask", params.destination.async_task.to_string())])
            .multipart(params.form(data)?)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;
        let body = check_status(resp).await?;
        let reply: FlowChunkResponse = serde_json::from_slice(&body)?;

        if reply.chunk_upload_success == Some(false) {
            return Err(ClientError::Upload(format!(
                "chunk {} rejected: {}",
                params.chunk_number,
                reply.error_message.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(reply)
    }

    /// Polls the upload until LinShare reports success.
    pub async fn wait_for_completion(&self, upload_uuid: &str) -> Result<FlowStatus, ClientError> {
        let endpoint = format!("/flow/{}", encode_segment(upload_uuid));
        for attempt in 1..=self.poll_attempts {
            let status: FlowStatus = self.get_json(&endpoint).await?;
            if status.is_success() {
                return Ok(status);
            }
            if !status.is_processing() {
                return Err(ClientError::Upload(format!(
                    "upload ended with status {}: {}",
                    status.status,
                    status.error_msg.as_deref().unwrap_or("unknown error")
                )));
            }
            debug!(upload_uuid, attempt, "upload still processing");
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(ClientError::Upload(format!(
            "timed out waiting for upload {upload_uuid} to be processed"
        )))
    }

    /// Uploads a local file: quota check, Flow.js chunks, then status
    /// polling.
    ///
    /// Chunks the server already holds are skipped, so re-running an upload
    /// that was interrupted resumes it.
    pub async fn upload_file(
        &self,
        path: &Path,
        file_name: &str,
        destination: &Destination,
    ) -> Result<UploadedDocument, ClientError> {
        let mut reader = ChunkReader::new(path, self.chunk_size)?;
        let file_size = reader.file_size();
        let chunk_size = reader.chunk_size();
        let total_chunks = reader.total_chunks();
        self.check_quota(file_size).await?;

        let identifier = uuid::Uuid::new_v4().to_string();
        info!(
            file_name,
            size = file_size,
            total_chunks,
            destination = destination.label(),
            "uploading to LinShare"
        );

        let mut upload_uuid = None;
        let mut chunks_sent = 0u64;
        let mut chunks_skipped = 0u64;

        loop {
            // Chunk reads are blocking file I/O.
            let (returned, next) = tokio::task::spawn_blocking(move || {
                let next = reader.next_chunk();
                (reader, next)
            })
            .await
            .map_err(|e| ClientError::Upload(format!("chunk reader task failed: {e}")))?;
            reader = returned;

            let Some(chunk) = next? else {
                break;
            };

            let params = FlowParams {
                identifier: &identifier,
                file_name,
                chunk_number: chunk.number,
                chunk_size,
                current_chunk_size: chunk.len(),
                total_size: file_size,
                total_chunks,
                destination,
            };

            if self.chunk_exists(&params).await? {
                debug!(chunk = chunk.number, "chunk already on server, skipping");
                chunks_skipped += 1;
                continue;
            }

            let reply = self.send_chunk(&params, chunk.data).await?;
            chunks_sent += 1;
            debug!(
                chunk = chunk.number,
                total_chunks,
                sha256 = %chunk.checksum,
                "chunk uploaded"
            );

            if reply.uuid.is_some() {
                upload_uuid = reply.uuid;
            }
            if reply.last_chunk {
                break;
            }
        }

        let upload_uuid = upload_uuid.ok_or_else(|| {
            ClientError::Upload("upload finished but the server returned no upload id".into())
        })?;
        self.wait_for_completion(&upload_uuid).await?;

        info!(file_name, %upload_uuid, chunks_sent, chunks_skipped, "upload complete");
        Ok(UploadedDocument {
            file_name: file_name.to_string(),
            size: file_size,
            upload_uuid,
            destination: destination.clone(),
            chunks_sent,
            chunks_skipped,
        })
    }
}

/// Flow.js parameters of one chunk.
struct FlowParams<'a> {
    identifier: &'a str,
    file_name: &'a str,
    chunk_number: u64,
    chunk_size: usize,
    current_chunk_size: usize,
    total_size: u64,
    total_chunks: u64,
    destination: &'a Destination,
}

impl FlowParams<'_> {
    fn flow_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("flowChunkNumber", self.chunk_number.to_string()),
            ("flowChunkSize", self.chunk_size.to_string()),
            ("flowCurrentChunkSize", self.current_chunk_size.to_string()),
            ("flowTotalSize", self.total_size.to_string()),
            ("flowIdentifier", self.identifier.to_string()),
            ("flowFilename", self.file_name.to_string()),
            ("flowRelativePath", self.file_name.to_string()),
            ("flowTotalChunks", self.total_chunks.to_string()),
        ]
    }

    fn workgroup_fields(&self) -> [(&'static str, String); 2] {
        [
            (
                "workGroupUuid",
                self.destination.workgroup_uuid.clone().unwrap_or_default(),
            ),
            (
                "workGroupParentNodeUuid",
                self.destination.folder_uuid.clone().unwrap_or_default(),
            ),
        ]
    }

    /// Query of the existence check: every parameter, blanks included.
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("asyncTask", self.destination.async_task.to_string())];
        query.extend(self.flow_fields());
        query.extend(self.workgroup_fields());
        query
    }

    /// Form of the chunk POST; blank workgroup fields are left out.
    fn form(&self, data: Vec<u8>) -> Result<Form, ClientError> {
        let mut form = Form::new();
        for (name, value) in self.flow_fields() {
            form = form.text(name, value);
        }
        for (name, value) in self.workgroup_fields() {
            if !value.is_empty() {
                form = form.text(name, value);
            }
        }
        let file = Part::bytes(data)
            .file_name(self.file_name.to_string())
            .mime_str("application/octet-stream")?;
        Ok(form.part("file", file))
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Returns the body of a successful response, or an [`ClientError::Api`].
async fn check_status(resp: reqwest::Response) -> Result<Vec<u8>, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}
