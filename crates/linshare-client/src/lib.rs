//! LinShare user API client.
//!
//! Uploads staged files to a LinShare personal space or workgroup through
//! the Flow.js chunked endpoint, after checking the account quota.

pub mod client;
pub mod types;
mod uploader;

pub use client::{ClientError, LinShareClient};
pub use types::{AuthorizedUser, Destination, FlowChunkResponse, FlowStatus, Quota, UploadedDocument};
pub use uploader::{DocumentUploader, UploadFuture};

/// Formats a byte count for humans: `"1.5 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_file_size_units() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1023), "1023.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5.0 GB");
        assert_eq!(format_file_size(1 << 40), "1.0 TB");
        assert_eq!(format_file_size(3 << 50), "3.0 PB");
    }
}
