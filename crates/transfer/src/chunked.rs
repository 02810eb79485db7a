use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// A slice of a staged file, numbered the way Flow.js numbers chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 1-based chunk number.
    pub number: u64,
    /// Byte offset of the first byte in the file.
    pub offset: u64,
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`.
    pub checksum: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads a file in fixed-size chunks.
///
/// An empty file still yields one empty chunk: the upload endpoint needs at
/// least one request to create the document.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
    next_number: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (2 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            next_number: 1,
        })
    }

    /// Number of chunks the file splits into (at least 1).
    pub fn total_chunks(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64).max(1)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reads the next chunk. Returns `None` once every chunk was produced.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.next_number > self.total_chunks() {
            return Ok(None);
        }

        let read_size = self.remaining().min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            number: self.next_number,
            offset: self.offset,
            checksum: checksum_bytes(&buf),
            data: buf,
        };
        self.offset += read_size as u64;
        self.next_number += 1;
        Ok(Some(chunk))
    }

    /// Total file size in bytes, as of opening.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}
