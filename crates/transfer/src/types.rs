use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{MAX_REPORTED_GAPS, TransferError, calculate_file_checksum};

/// One chunk-append request, borrowed from the tool-call arguments.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSubmission<'a> {
    /// Upload session key.
    pub session_id: &'a str,
    /// Name of the assembled file in the staging directory.
    pub file_name: &'a str,
    /// Zero-based position of this chunk.
    pub chunk_index: u64,
    /// Base64-encoded chunk bytes.
    pub data_b64: &'a str,
    /// Marks the last chunk of the sequence.
    pub is_final: bool,
    /// Total chunk count, when the client declares it.
    pub total_chunks: Option<u64>,
}

/// Acknowledgement returned for every accepted chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkAck {
    pub session_id: String,
    pub chunk_index: u64,
    /// Distinct chunks held by the session (all chunks once complete).
    pub received_count: usize,
    /// `true` when this chunk was an exact re-send of an accepted one.
    pub duplicate: bool,
    /// `true` once the file has been assembled.
    pub complete: bool,
    /// The assembled file, present when this call completed the session.
    pub assembled: Option<AssembledFile>,
}

/// A file assembled from all chunks of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledFile {
    pub session_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub chunk_count: usize,
    /// Hex SHA-256 of the assembled bytes.
    pub sha256: String,
}

impl AssembledFile {
    /// Checks that the staged file still holds the bytes assembled for this
    /// session. Blocking; run it off the async executor.
    pub fn verify(&self) -> Result<(), TransferError> {
        let size = std::fs::metadata(&self.path)?.len();
        if size != self.size || calculate_file_checksum(&self.path)? != self.sha256 {
            return Err(TransferError::StagedFileChanged(self.path.clone()));
        }
        Ok(())
    }
}

/// Point-in-time view of a session, for listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub file_name: String,
    pub received_count: usize,
    pub expected_total: Option<u64>,
    pub buffered_bytes: u64,
    pub complete: bool,
    pub staged_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub idle: Duration,
}

/// Lifecycle of a session.
#[derive(Debug)]
pub(crate) enum SessionState {
    /// Accepting chunks.
    Open,
    /// Assembled; buffers released, only the result is kept.
    Complete(AssembledFile),
    /// Removed by the sweep; holders of a stale handle must look it up again.
    Reclaimed,
}

/// Outcome of storing one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stored {
    New,
    Duplicate,
}

/// In-memory state of one upload.
#[derive(Debug)]
pub(crate) struct UploadSession {
    pub(crate) id: String,
    pub(crate) target_filename: String,
    pub(crate) chunks: BTreeMap<u64, Vec<u8>>,
    pub(crate) expected_total: Option<u64>,
    pub(crate) final_index: Option<u64>,
    pub(crate) buffered_bytes: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_activity: Instant,
    pub(crate) state: SessionState,
}

impl UploadSession {
    pub(crate) fn new(id: &str, target_filename: &str) -> Self {
        Self {
            id: id.to_string(),
            target_filename: target_filename.to_string(),
            chunks: BTreeMap::new(),
            expected_total: None,
            final_index: None,
            buffered_bytes: 0,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            state: SessionState::Open,
        }
    }

    pub(crate) fn is_reclaimed(&self) -> bool {
        matches!(self.state, SessionState::Reclaimed)
    }

    /// Index of the last chunk, once known from a final marker or a total.
    pub(crate) fn last_index(&self) -> Option<u64> {
        self.final_index
            .or_else(|| self.expected_total.map(|t| t.saturating_sub(1)))
    }

    /// Validates and stores a decoded chunk.
    ///
    /// All checks run before any field is modified, so a rejected chunk
    /// leaves the session exactly as it was.
    pub(crate) fn store(
        &mut self,
        index: u64,
        data: Vec<u8>,
        is_final: bool,
        total: Option<u64>,
    ) -> Result<Stored, TransferError> {
        let expected_total = match (self.expected_total, total) {
            (Some(expected), Some(declared)) if expected != declared => {
                return Err(TransferError::TotalMismatch { expected, declared });
            }
            (Some(expected), _) => Some(expected),
            (None, declared) => declared,
        };

        let final_index = match (self.final_index, is_final.then_some(index)) {
            (Some(known), Some(marked)) if known != marked => {
                return Err(TransferError::TotalMismatch {
                    expected: known + 1,
                    declared: marked + 1,
                });
            }
            (Some(known), _) => Some(known),
            (None, marked) => marked,
        };

        if let (Some(expected), Some(last)) = (expected_total, final_index) {
            if last + 1 != expected {
                return Err(TransferError::TotalMismatch {
                    expected,
                    declared: last + 1,
                });
            }
        }

        let last = final_index.or_else(|| expected_total.map(|t| t.saturating_sub(1)));
        if let Some(last) = last {
            if index > last {
                return Err(TransferError::ChunkOutOfRange {
                    index,
                    total: last + 1,
                });
            }
            if let Some((&highest, _)) = self.chunks.last_key_value() {
                if highest > last {
                    return Err(TransferError::ChunkOutOfRange {
                        index: highest,
                        total: last + 1,
                    });
                }
            }
        }

        if let Some(existing) = self.chunks.get(&index) {
            if *existing != data {
                return Err(TransferError::DuplicateChunkConflict {
                    session_id: self.id.clone(),
                    index,
                });
            }
        }

        self.expected_total = expected_total;
        self.final_index = final_index;
        self.last_activity = Instant::now();

        if self.chunks.contains_key(&index) {
            return Ok(Stored::Duplicate);
        }

        self.buffered_bytes += data.len() as u64;
        self.chunks.insert(index, data);
        Ok(Stored::New)
    }

    /// Missing indices in `0..=last`: the first few, and how many in total.
    pub(crate) fn missing_up_to(&self, last: u64) -> (Vec<u64>, u64) {
        let mut missing = Vec::new();
        let mut count = 0u64;
        let mut expected = 0u64;

        let mut note_gap = |from: u64, to_exclusive: u64, missing: &mut Vec<u64>| {
            count += to_exclusive - from;
            let room = MAX_REPORTED_GAPS.saturating_sub(missing.len()) as u64;
            missing.extend(from..to_exclusive.min(from.saturating_add(room)));
        };

        for &index in self.chunks.range(..=last).map(|(k, _)| k) {
            if index > expected {
                note_gap(expected, index, &mut missing);
            }
            expected = index + 1;
        }
        if expected <= last {
            note_gap(expected, last + 1, &mut missing);
        }

        (missing, count)
    }

    /// Drops all buffered chunk data.
    pub(crate) fn release_buffers(&mut self) {
        self.chunks = BTreeMap::new();
        self.buffered_bytes = 0;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let (complete, staged_path, received_count) = match &self.state {
            SessionState::Complete(file) => (true, Some(file.path.clone()), file.chunk_count),
            _ => (false, None, self.chunks.len()),
        };
        SessionSnapshot {
            session_id: self.id.clone(),
            file_name: self.target_filename.clone(),
            received_count,
            expected_total: self.expected_total,
            buffered_bytes: self.buffered_bytes,
            complete,
            staged_path,
            created_at: self.created_at,
            idle: self.last_activity.elapsed(),
        }
    }
}
