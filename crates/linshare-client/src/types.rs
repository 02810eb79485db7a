use serde::{Deserialize, Serialize};

/// The authenticated account, as returned by `authentication/authorized`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedUser {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub quota_uuid: Option<String>,
}

/// Storage quota of an account, in bytes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    #[serde(default)]
    pub quota: i64,
    #[serde(default)]
    pub used_space: i64,
    #[serde(default)]
    pub max_file_size: Option<i64>,
}

impl Quota {
    /// Remaining space, never negative.
    pub fn available(&self) -> u64 {
        self.quota.saturating_sub(self.used_space).max(0) as u64
    }
}

/// Reply to a Flow.js chunk POST.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowChunkResponse {
    #[serde(default)]
    pub last_chunk: bool,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub chunk_upload_success: Option<bool>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Processing state of an uploaded document (`flow/{uuid}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl FlowStatus {
    pub const SUCCESS: &'static str = "SUCCESS";
    pub const PROCESSING: &'static str = "PROCESSING";

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }

    pub fn is_processing(&self) -> bool {
        self.status == Self::PROCESSING
    }
}

/// Where an uploaded document lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    /// Workgroup to upload into; personal space when empty.
    pub workgroup_uuid: Option<String>,
    /// Folder inside the workgroup; the workgroup root when empty.
    pub folder_uuid: Option<String>,
    /// Let LinShare finish the document asynchronously.
    pub async_task: bool,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            workgroup_uuid: None,
            folder_uuid: None,
            async_task: true,
        }
    }
}

impl Destination {
    /// Builds a destination, treating blank ids as absent.
    pub fn new(workgroup_uuid: Option<&str>, folder_uuid: Option<&str>) -> Self {
        let non_blank = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            workgroup_uuid: non_blank(workgroup_uuid),
            folder_uuid: non_blank(folder_uuid),
            async_task: true,
        }
    }

    pub fn is_workgroup(&self) -> bool {
        self.workgroup_uuid.is_some()
    }

    pub fn label(&self) -> &'static str {
        if self.is_workgroup() {
            "Workgroup"
        } else {
            "Personal space"
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocument {
    pub file_name: String,
    pub size: u64,
    /// Upload id returned with the last chunk.
    pub upload_uuid: String,
    pub destination: Destination,
    pub chunks_sent: u64,
    /// Chunks the server already had.
    pub chunks_skipped: u64,
}
