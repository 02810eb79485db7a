use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use linshare_client::DocumentUploader;
use linshare_transfer::{DEFAULT_SESSION_MAX_AGE, SessionManager, Sweeper};

/// State shared by all tool calls.
pub struct ServerState {
    /// Chunked upload sessions; assembled files are staged in `upload_dir`.
    pub sessions: Arc<SessionManager>,
    /// Reclaims idle sessions; started by the app, idle in tests.
    pub sweeper: Sweeper,
    /// LinShare handoff; `None` when no user URL or token is configured.
    pub uploader: Option<Arc<dyn DocumentUploader>>,
    pub upload_dir: PathBuf,
    pub download_dir: PathBuf,
}

impl ServerState {
    pub fn new(
        upload_dir: PathBuf,
        download_dir: PathBuf,
        uploader: Option<Arc<dyn DocumentUploader>>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(upload_dir.clone()));
        Self {
            sweeper: Sweeper::new(Arc::clone(&sessions), None, DEFAULT_SESSION_MAX_AGE),
            sessions,
            uploader,
            upload_dir,
            download_dir,
        }
    }

    /// Replaces the sweep schedule. Call before the sweeper is started.
    pub fn with_sweep(mut self, interval: Option<Duration>, max_age: Duration) -> Self {
        self.sweeper = Sweeper::new(Arc::clone(&self.sessions), interval, max_age);
        self
    }
}
