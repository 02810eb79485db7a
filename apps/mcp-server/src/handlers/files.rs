use std::path::Path;

use linshare_client::format_file_size;
use linshare_protocol::CallToolResult;

use crate::handler::McpHandler;
use crate::helpers::guess_mime_type;

/// A regular file in a directory listing.
struct FileEntry {
    name: String,
    size: u64,
}

/// Lists regular files in `dir`, sorted by name.
///
/// Dot-files are skipped; they include partially written staging files.
async fn list_files(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            files.push(FileEntry {
                name,
                size: meta.len(),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Writes the status block of one directory.
async fn describe_dir(out: &mut String, label: &str, dir: &Path, count_label: &str) {
    out.push_str(&format!("{label}: {}\n", dir.display()));
    match list_files(dir).await {
        Ok(files) => {
            out.push_str("  Status: exists\n");
            out.push_str(&format!("  {count_label}: {}\n", files.len()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            out.push_str("  Status: not found\n");
        }
        Err(e) => {
            out.push_str(&format!("  Status: unreadable ({e})\n"));
        }
    }
}

impl McpHandler {
    pub(crate) async fn handle_list_upload_files(&self) -> CallToolResult {
        let dir = &self.state.upload_dir;
        let files = match list_files(dir).await {
            Ok(files) => files,
            Err(e) => {
                return CallToolResult::error(format!(
                    "Error: cannot read upload directory {}: {e}",
                    dir.display()
                ));
            }
        };

        if files.is_empty() {
            return CallToolResult::text(format!(
                "No files found in upload directory: {}\n\nPlace files there to upload them.",
                dir.display()
            ));
        }

        let mut out = format!(
            "Files in upload directory ({} files):\nLocation: {}\n\n",
            files.len(),
            dir.display()
        );
        for (i, file) in files.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}\n   Size: {}\n   Type: {}\n\n",
                i + 1,
                file.name,
                format_file_size(file.size),
                guess_mime_type(&file.name)
            ));
        }
        CallToolResult::text(out)
    }

    pub(crate) async fn handle_get_directory_info(&self) -> CallToolResult {
        let mut out = String::from("LinShare directory configuration:\n\n");
        describe_dir(
            &mut out,
            "Upload directory",
            &self.state.upload_dir,
            "Files ready",
        )
        .await;
        out.push('\n');
        describe_dir(
            &mut out,
            "Download directory",
            &self.state.download_dir,
            "Downloaded files",
        )
        .await;

        let open = self.state.sessions.session_count();
        out.push_str(&format!("\nUpload sessions in memory: {open}\n"));
        let sweeper = &self.state.sweeper;
        if sweeper.is_running() {
            out.push_str(&format!(
                "Session sweeper: running every {}s, idle limit {}s\n",
                sweeper.interval().as_secs(),
                sweeper.max_age().as_secs()
            ));
        } else {
            out.push_str("Session sweeper: stopped\n");
        }
        CallToolResult::text(out)
    }
}
