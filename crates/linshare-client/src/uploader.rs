//! Upload seam between the tool layer and LinShare.
//!
//! The tool handlers only see [`DocumentUploader`], so they can be tested
//! with an in-memory double instead of an HTTP server.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::client::{ClientError, LinShareClient};
use crate::types::{Destination, UploadedDocument};

/// A boxed future returned by [`DocumentUploader::upload`].
pub type UploadFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UploadedDocument, ClientError>> + Send + 'a>>;

/// Sends a complete local file to the remote document store.
pub trait DocumentUploader: Send + Sync {
    /// Uploads `path` under `file_name` into `destination`.
    fn upload<'a>(
        &'a self,
        path: &'a Path,
        file_name: &'a str,
        destination: &'a Destination,
    ) -> UploadFuture<'a>;
}

impl DocumentUploader for LinShareClient {
    fn upload<'a>(
        &'a self,
        path: &'a Path,
        file_name: &'a str,
        destination: &'a Destination,
    ) -> UploadFuture<'a> {
        Box::pin(self.upload_file(path, file_name, destination))
    }
}
