use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Maximum accepted length of a session id, in bytes.
const MAX_SESSION_ID_LEN: usize = 256;

/// Validates that a target filename is a single plain path component.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Any separator, so nothing is created outside the staging directory
/// - `.` and `..`
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    let path = Path::new(name);

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {name}"
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "directory separators not allowed: {name}"
        )));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {name}"
        ))),
        (Some(Component::Prefix(_)), _) => Err(TransferError::InvalidPath(format!(
            "path prefix not allowed: {name}"
        ))),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name}"
        ))),
    }
}

/// Resolves `name` inside `dir`, rejecting anything that would escape it.
///
/// Purely lexical; use [`resolve_existing_in_dir`] before reading a file
/// that may be a symlink.
pub fn resolve_in_dir(dir: &Path, name: &str) -> Result<PathBuf, TransferError> {
    validate_file_name(name)?;
    Ok(dir.join(name))
}

/// Resolves an existing entry of `dir` to its canonical path.
///
/// Symlinks are followed, and the result must still lie under the
/// canonical `dir`. A missing entry is reported as [`TransferError::Io`]
/// with kind `NotFound`.
pub async fn resolve_existing_in_dir(dir: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let joined = resolve_in_dir(dir, name)?;
    let root = tokio::fs::canonicalize(dir).await?;
    let target = tokio::fs::canonicalize(&joined).await?;
    if !target.starts_with(&root) {
        return Err(TransferError::InvalidPath(format!(
            "{name} resolves outside {}",
            root.display()
        )));
    }
    Ok(target)
}

/// Validates a client-supplied upload session id.
pub fn validate_session_id(id: &str) -> Result<(), TransferError> {
    if id.trim().is_empty() {
        return Err(TransferError::InvalidSessionId("empty session id".into()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(TransferError::InvalidSessionId(format!(
            "session id longer than {MAX_SESSION_ID_LEN} bytes"
        )));
    }
    Ok(())
}
