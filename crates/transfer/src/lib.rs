//! Chunked upload reassembly with per-session locking and expiry sweeps.
//!
//! Inbound: the [`SessionManager`] collects base64 fragments of a file sent
//! over the tool-call channel and assembles them into the staging directory.
//! Outbound: the [`ChunkReader`] splits a staged file into fixed-size chunks
//! for the LinShare Flow.js endpoint.

mod chunked;
mod reassembly;
mod sweeper;
mod types;
mod validation;

use std::path::PathBuf;
use std::time::Duration;

pub use chunked::{Chunk, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use reassembly::SessionManager;
pub use sweeper::Sweeper;
pub use types::{AssembledFile, ChunkAck, ChunkSubmission, SessionSnapshot};
pub use validation::{
    resolve_existing_in_dir, resolve_in_dir, validate_file_name, validate_session_id,
};

/// Default outbound chunk size: 2 MiB, as expected by LinShare's Flow.js endpoint.
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Upper bound on the number of chunks in one upload session.
pub const MAX_CHUNKS_PER_SESSION: u64 = 1 << 20;

/// Idle time after which an unfinished session is reclaimed.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

/// Number of missing indices listed in a [`TransferError::SequenceGap`].
pub const MAX_REPORTED_GAPS: usize = 16;

/// Errors produced by the transfer crate.
///
/// Every variant is scoped to a single upload session; none of them leaves
/// other sessions in a different state.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error(
        "session {session_id} is missing {missing_count} chunk(s), first missing: {missing:?}"
    )]
    SequenceGap {
        session_id: String,
        missing: Vec<u64>,
        missing_count: u64,
    },

    #[error("session already complete: {0}")]
    SessionAlreadyComplete(String),

    #[error("failed to write {}: {source}", path.display())]
    IoWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("chunk {index} of session {session_id} was already received with different content")]
    DuplicateChunkConflict { session_id: String, index: u64 },

    #[error("session not found: {0}")]
    UnknownSession(String),

    #[error("chunk index {index} is out of range for {total} chunk(s)")]
    ChunkOutOfRange { index: u64, total: u64 },

    #[error("chunk count mismatch: session expects {expected}, chunk declares {declared}")]
    TotalMismatch { expected: u64, declared: u64 },

    #[error("file name {file_name} is in use by upload session {session_id}")]
    FileNameInUse {
        file_name: String,
        session_id: String,
    },

    #[error("staged file {} no longer matches the assembled upload", .0.display())]
    StagedFileChanged(PathBuf),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
}
