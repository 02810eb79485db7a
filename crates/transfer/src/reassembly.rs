use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::types::{SessionState, Stored, UploadSession};
use crate::{
    AssembledFile, ChunkAck, ChunkSubmission, MAX_CHUNKS_PER_SESSION, SessionSnapshot,
    TransferError, validate_file_name, validate_session_id,
};

type SessionHandle = Arc<AsyncMutex<UploadSession>>;

/// Live sessions, and which session owns each staged file name.
#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionHandle>,
    /// File name -> session id. A name stays claimed until its session is
    /// swept, so one session never overwrites another's staged file.
    claims: HashMap<String, String>,
}

/// Collects chunked uploads and assembles them into the staging directory.
///
/// The session map is behind a short-held lock that is never kept across an
/// `.await`. Each session carries its own async mutex, held for the whole
/// append or finalize including the staging write, so two calls for the
/// same session run one after the other while different sessions proceed
/// in parallel.
pub struct SessionManager {
    staging_dir: PathBuf,
    registry: Mutex<Registry>,
}

impl SessionManager {
    /// Creates a manager writing assembled files into `staging_dir`.
    ///
    /// The directory is created on first assembly if it does not exist.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Number of sessions currently held, open or complete.
    pub fn session_count(&self) -> usize {
        self.lock_sessions().sessions.len()
    }

    /// Appends one chunk, creating the session on its first chunk.
    ///
    /// When the last index is known (from `is_final` or `total_chunks`) and
    /// every index up to it is present, the file is assembled and the ack
    /// carries the [`AssembledFile`].
    ///
    /// A new session is refused while its file name belongs to another
    /// live session.
    pub async fn begin_or_continue_chunk(
        &self,
        submission: ChunkSubmission<'_>,
    ) -> Result<ChunkAck, TransferError> {
        let ChunkSubmission {
            session_id,
            file_name,
            chunk_index,
            data_b64,
            is_final,
            total_chunks,
        } = submission;

        validate_session_id(session_id)?;
        validate_file_name(file_name)?;
        check_bounds(chunk_index, total_chunks)?;
        let data = decode_chunk(data_b64)?;

        let mut session = self.acquire(session_id, file_name).await?;

        if matches!(session.state, SessionState::Complete(_)) {
            return Err(TransferError::SessionAlreadyComplete(session_id.to_string()));
        }
        if session.target_filename != file_name {
            debug!(
                session_id,
                kept = %session.target_filename,
                ignored = file_name,
                "filename differs from first chunk"
            );
        }

        let stored = match session.store(chunk_index, data, is_final, total_chunks) {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_if_empty(&mut session);
                return Err(e);
            }
        };

        let mut ack = ChunkAck {
            session_id: session_id.to_string(),
            chunk_index,
            received_count: session.chunks.len(),
            duplicate: stored == Stored::Duplicate,
            complete: false,
            assembled: None,
        };
        debug!(
            session_id,
            chunk_index,
            received = ack.received_count,
            duplicate = ack.duplicate,
            "chunk accepted"
        );

        let Some(last) = session.last_index() else {
            return Ok(ack);
        };
        let (missing, missing_count) = session.missing_up_to(last);
        if missing_count > 0 {
            if is_final {
                return Err(TransferError::SequenceGap {
                    session_id: session_id.to_string(),
                    missing,
                    missing_count,
                });
            }
            return Ok(ack);
        }

        let file = self.complete(&mut session, last).await?;
        ack.received_count = file.chunk_count;
        ack.complete = true;
        ack.assembled = Some(file);
        Ok(ack)
    }

    /// Assembles an open session explicitly.
    ///
    /// The last index is the declared one, or the highest index received.
    /// Finalizing a completed session returns the file assembled earlier.
    pub async fn finalize(&self, session_id: &str) -> Result<AssembledFile, TransferError> {
        validate_session_id(session_id)?;

        let Some(mut session) = self.existing(session_id).await else {
            return Err(TransferError::UnknownSession(session_id.to_string()));
        };
        if let SessionState::Complete(file) = &session.state {
            return Ok(file.clone());
        }

        let last = session
            .last_index()
            .or_else(|| session.chunks.last_key_value().map(|(&k, _)| k));
        let Some(last) = last else {
            return Err(TransferError::SequenceGap {
                session_id: session_id.to_string(),
                missing: vec![0],
                missing_count: 1,
            });
        };

        let (missing, missing_count) = session.missing_up_to(last);
        if missing_count > 0 {
            return Err(TransferError::SequenceGap {
                session_id: session_id.to_string(),
                missing,
                missing_count,
            });
        }

        self.complete(&mut session, last).await
    }

    /// Reclaims sessions idle for longer than `max_age`.
    ///
    /// Open sessions and completed ones are both dropped. A session locked by
    /// an in-flight call is busy by definition and is left alone.
    pub fn sweep_expired_sessions(&self, max_age: Duration) -> usize {
        let mut registry = self.lock_sessions();
        let Registry { sessions, claims } = &mut *registry;
        let before = sessions.len();

        sessions.retain(|id, handle| {
            let Ok(mut session) = handle.try_lock() else {
                return true;
            };
            if session.last_activity.elapsed() <= max_age {
                return true;
            }
            debug!(
                session_id = %id,
                buffered_bytes = session.buffered_bytes,
                complete = matches!(session.state, SessionState::Complete(_)),
                "reclaiming idle session"
            );
            session.release_buffers();
            session.state = SessionState::Reclaimed;
            false
        });
        claims.retain(|_, holder| sessions.contains_key(holder));

        let reclaimed = before - sessions.len();
        if reclaimed > 0 {
            info!(reclaimed, remaining = sessions.len(), "swept idle upload sessions");
        }
        reclaimed
    }

    /// Snapshots every session, oldest first.
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> =
            self.lock_sessions().sessions.values().cloned().collect();

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = handle.lock().await;
            if !session.is_reclaimed() {
                out.push(session.snapshot());
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_sessions(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the session, creating it if absent and its file name is free.
    async fn acquire(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> Result<OwnedMutexGuard<UploadSession>, TransferError> {
        loop {
            let handle = self.handle_or_create(session_id, file_name)?;
            let session = handle.lock_owned().await;
            if !session.is_reclaimed() {
                return Ok(session);
            }
        }
    }

    fn handle_or_create(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> Result<SessionHandle, TransferError> {
        let mut registry = self.lock_sessions();
        let Registry { sessions, claims } = &mut *registry;
        if let Some(handle) = sessions.get(session_id) {
            return Ok(Arc::clone(handle));
        }

        if let Some(holder) = claims.get(file_name) {
            if holder != session_id && sessions.contains_key(holder) {
                debug!(session_id, file_name, held_by = %holder, "file name in use");
                return Err(TransferError::FileNameInUse {
                    file_name: file_name.to_string(),
                    session_id: holder.clone(),
                });
            }
        }

        debug!(session_id, file_name, "new upload session");
        let handle = Arc::new(AsyncMutex::new(UploadSession::new(session_id, file_name)));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        claims.insert(file_name.to_string(), session_id.to_string());
        Ok(handle)
    }

    /// Locks an existing session.
    async fn existing(&self, session_id: &str) -> Option<OwnedMutexGuard<UploadSession>> {
        loop {
            let handle = self.lock_sessions().sessions.get(session_id).cloned()?;
            let session = handle.lock_owned().await;
            if !session.is_reclaimed() {
                return Some(session);
            }
        }
    }

    /// Drops a session that a rejected first chunk would otherwise leave empty.
    fn discard_if_empty(&self, session: &mut OwnedMutexGuard<UploadSession>) {
        if !session.chunks.is_empty() || !matches!(session.state, SessionState::Open) {
            return;
        }
        session.state = SessionState::Reclaimed;
        let handle = OwnedMutexGuard::mutex(session);
        let mut registry = self.lock_sessions();
        if registry
            .sessions
            .get(&session.id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            registry.sessions.remove(&session.id);
            if registry.claims.get(&session.target_filename) == Some(&session.id) {
                registry.claims.remove(&session.target_filename);
            }
        }
    }

    /// Writes the session's chunks `0..=last` to the staging directory and
    /// turns it into a completed tombstone.
    ///
    /// On failure the buffers stay in place so the caller can retry.
    async fn complete(
        &self,
        session: &mut UploadSession,
        last: u64,
    ) -> Result<AssembledFile, TransferError> {
        let target = self.staging_dir.join(&session.target_filename);

        let (size, sha256) = match write_staged(&self.staging_dir, &target, session).await {
            Ok(written) => written,
            Err(source) => {
                warn!(
                    session_id = %session.id,
                    path = %target.display(),
                    error = %source,
                    "staging write failed, session kept open"
                );
                return Err(TransferError::IoWrite {
                    path: target,
                    source,
                });
            }
        };

        let file = AssembledFile {
            session_id: session.id.clone(),
            file_name: session.target_filename.clone(),
            path: target,
            size,
            chunk_count: (last + 1) as usize,
            sha256,
        };
        session.release_buffers();
        session.state = SessionState::Complete(file.clone());
        session.last_activity = Instant::now();

        info!(
            session_id = %file.session_id,
            path = %file.path.display(),
            size = file.size,
            chunks = file.chunk_count,
            "upload assembled"
        );
        Ok(file)
    }
}

/// Rejects indices and totals outside what one session may hold.
fn check_bounds(chunk_index: u64, total_chunks: Option<u64>) -> Result<(), TransferError> {
    let total = total_chunks.unwrap_or(MAX_CHUNKS_PER_SESSION);
    if total == 0 || total > MAX_CHUNKS_PER_SESSION || chunk_index >= total {
        return Err(TransferError::ChunkOutOfRange {
            index: chunk_index,
            total,
        });
    }
    Ok(())
}

/// Decodes a standard base64 payload, tolerating embedded line breaks.
fn decode_chunk(data_b64: &str) -> Result<Vec<u8>, TransferError> {
    let data_b64 = data_b64.trim();
    if data_b64.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data_b64
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(data_b64)?)
}

/// Writes the chunks in index order to a temporary file, then renames it
/// over `target`. Returns the size and hex SHA-256 of the written bytes.
async fn write_staged(
    staging_dir: &Path,
    target: &Path,
    session: &UploadSession,
) -> std::io::Result<(u64, String)> {
    tokio::fs::create_dir_all(staging_dir).await?;

    let part = staging_dir.join(format!(
        ".{}.{}.part",
        session.target_filename,
        uuid::Uuid::new_v4()
    ));

    let result = async {
        let mut file = tokio::fs::File::create(&part).await?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        for data in session.chunks.values() {
            hasher.update(data);
            file.write_all(data).await?;
            size += data.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part, target).await?;
        Ok::<_, std::io::Error>((size, hex::encode(hasher.finalize())))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, SessionManager) {
        let dir = TempDir::new().unwrap();
        let m = SessionManager::new(dir.path().join("staging"));
        (dir, m)
    }

    async fn send(
        m: &SessionManager,
        session_id: &str,
        index: u64,
        raw: &[u8],
        is_final: bool,
    ) -> Result<ChunkAck, TransferError> {
        send_named(m, session_id, "out.txt", index, raw, is_final).await
    }

    async fn send_named(
        m: &SessionManager,
        session_id: &str,
        file_name: &str,
        index: u64,
        raw: &[u8],
        is_final: bool,
    ) -> Result<ChunkAck, TransferError> {
        let b64 = STANDARD.encode(raw);
        m.begin_or_continue_chunk(ChunkSubmission {
            session_id,
            file_name,
            chunk_index: index,
            data_b64: &b64,
            is_final,
            total_chunks: None,
        })
        .await
    }

    #[tokio::test]
    async fn out_of_order_chunks_assemble_in_index_order() {
        let (_dir, m) = manager();

        let a1 = send(&m, "s", 1, b"DEF", false).await.unwrap();
        assert_eq!(a1.received_count, 1);
        assert!(!a1.complete);

        send(&m, "s", 0, b"ABC", false).await.unwrap();
        let last = send(&m, "s", 2, b"GHI", true).await.unwrap();

        assert!(last.complete);
        assert_eq!(last.received_count, 3);
        let file = last.assembled.unwrap();
        assert_eq!(std::fs::read(&file.path).unwrap(), b"ABCDEFGHI");
        assert_eq!(file.size, 9);
        assert_eq!(file.chunk_count, 3);
        assert_eq!(file.sha256, crate::checksum_bytes(b"ABCDEFGHI"));
        assert_eq!(file.path, m.staging_dir().join("out.txt"));
    }

    #[tokio::test]
    async fn any_arrival_order_matches_index_order() {
        let (_dir, m) = manager();
        let parts: [&[u8]; 5] = [b"0-", b"1-", b"2-", b"3-", b"4"];
        for (n, &i) in [3u64, 0, 4, 2, 1].iter().enumerate() {
            let ack = m
                .begin_or_continue_chunk(ChunkSubmission {
                    session_id: "order",
                    file_name: "out.txt",
                    chunk_index: i,
                    data_b64: &STANDARD.encode(parts[i as usize]),
                    is_final: false,
                    total_chunks: Some(5),
                })
                .await
                .unwrap();
            assert_eq!(ack.complete, n == 4);
        }
        let content = std::fs::read(m.staging_dir().join("out.txt")).unwrap();
        assert_eq!(content, b"0-1-2-3-4");
    }

    #[tokio::test]
    async fn gap_at_finalize_reports_missing_and_writes_nothing() {
        let (_dir, m) = manager();
        send(&m, "gap", 0, b"A", false).await.unwrap();
        send(&m, "gap", 2, b"C", false).await.unwrap();

        let err = m.finalize("gap").await.unwrap_err();
        match err {
            TransferError::SequenceGap {
                missing,
                missing_count,
                ..
            } => {
                assert_eq!(missing, vec![1]);
                assert_eq!(missing_count, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!m.staging_dir().join("out.txt").exists());

        // The session stays open for the missing chunk.
        send(&m, "gap", 1, b"B", false).await.unwrap();
        let file = m.finalize("gap").await.unwrap();
        assert_eq!(std::fs::read(file.path).unwrap(), b"ABC");
    }

    #[tokio::test]
    async fn final_marker_with_gap_keeps_chunk_until_gap_filled() {
        let (_dir, m) = manager();
        send(&m, "late", 0, b"A", false).await.unwrap();

        let err = send(&m, "late", 2, b"C", true).await.unwrap_err();
        assert!(matches!(err, TransferError::SequenceGap { .. }));

        let ack = send(&m, "late", 1, b"B", false).await.unwrap();
        assert!(ack.complete);
        assert_eq!(
            std::fs::read(ack.assembled.unwrap().path).unwrap(),
            b"ABC"
        );
    }

    #[tokio::test]
    async fn exact_duplicate_is_acknowledged_once() {
        let (_dir, m) = manager();
        send(&m, "dup", 0, b"ABC", false).await.unwrap();
        send(&m, "dup", 1, b"DEF", false).await.unwrap();

        let again = send(&m, "dup", 1, b"DEF", false).await.unwrap();
        assert!(again.duplicate);
        assert_eq!(again.received_count, 2);

        let done = send(&m, "dup", 2, b"GHI", true).await.unwrap();
        assert_eq!(
            std::fs::read(done.assembled.unwrap().path).unwrap(),
            b"ABCDEFGHI"
        );
    }

    #[tokio::test]
    async fn conflicting_duplicate_is_rejected() {
        let (_dir, m) = manager();
        send(&m, "c", 1, b"DEF", false).await.unwrap();
        let err = send(&m, "c", 1, b"XYZ", false).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::DuplicateChunkConflict { index: 1, .. }
        ));

        send(&m, "c", 0, b"ABC", false).await.unwrap();
        let file = m.finalize("c").await.unwrap();
        assert_eq!(std::fs::read(file.path).unwrap(), b"ABCDEF");
    }

    #[tokio::test]
    async fn chunk_after_completion_is_rejected_and_file_unchanged() {
        let (_dir, m) = manager();
        send(&m, "done", 0, b"ABC", true).await.unwrap();

        let err = send(&m, "done", 1, b"DEF", false).await.unwrap_err();
        assert!(matches!(err, TransferError::SessionAlreadyComplete(_)));
        let err = send(&m, "done", 0, b"ABC", true).await.unwrap_err();
        assert!(matches!(err, TransferError::SessionAlreadyComplete(_)));

        let content = std::fs::read(m.staging_dir().join("out.txt")).unwrap();
        assert_eq!(content, b"ABC");
    }

    #[tokio::test]
    async fn finalize_is_idempotent_on_completed_session() {
        let (_dir, m) = manager();
        let ack = send(&m, "idem", 0, b"x", true).await.unwrap();
        let first = ack.assembled.unwrap();
        assert_eq!(m.finalize("idem").await.unwrap(), first);
    }

    #[tokio::test]
    async fn finalize_unknown_session() {
        let (_dir, m) = manager();
        let err = m.finalize("missing").await.unwrap_err();
        assert!(matches!(err, TransferError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn invalid_base64_leaves_session_untouched() {
        let (_dir, m) = manager();
        send(&m, "b", 0, b"ABC", false).await.unwrap();

        let err = m
            .begin_or_continue_chunk(ChunkSubmission {
                session_id: "b",
                file_name: "out.txt",
                chunk_index: 1,
                data_b64: "not base64!!",
                is_final: true,
                total_chunks: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidEncoding(_)));

        let snap = m.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].received_count, 1);
        assert!(!snap[0].complete);
    }

    #[tokio::test]
    async fn wrapped_base64_is_accepted() {
        let (_dir, m) = manager();
        let ack = m
            .begin_or_continue_chunk(ChunkSubmission {
                session_id: "w",
                file_name: "out.txt",
                chunk_index: 0,
                data_b64: "QUJD\nREVG\n",
                is_final: true,
                total_chunks: None,
            })
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(ack.assembled.unwrap().path).unwrap(),
            b"ABCDEF"
        );
    }

    #[tokio::test]
    async fn rejected_first_chunk_does_not_leave_a_session() {
        let (_dir, m) = manager();
        let err = m
            .begin_or_continue_chunk(ChunkSubmission {
                session_id: "r",
                file_name: "out.txt",
                chunk_index: 3,
                data_b64: "QQ==",
                is_final: false,
                total_chunks: Some(2),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChunkOutOfRange { .. }));
        assert_eq!(m.session_count(), 0);
    }

    #[tokio::test]
    async fn unsafe_file_name_is_rejected() {
        let (_dir, m) = manager();
        let err = m
            .begin_or_continue_chunk(ChunkSubmission {
                session_id: "p",
                file_name: "../escape.txt",
                chunk_index: 0,
                data_b64: "QQ==",
                is_final: true,
                total_chunks: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidPath(_)));
        assert_eq!(m.session_count(), 0);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (_dir, m) = manager();
        let b64 = STANDARD.encode(b"one");
        m.begin_or_continue_chunk(ChunkSubmission {
            session_id: "a",
            file_name: "a.txt",
            chunk_index: 0,
            data_b64: &b64,
            is_final: false,
            total_chunks: None,
        })
        .await
        .unwrap();
        assert!(send(&m, "b", 0, b"", false).await.is_ok());
        assert!(send(&m, "b", 0, b"other", false).await.is_err());

        let snap = m.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|s| s.received_count == 1));
    }

    #[tokio::test]
    async fn write_failure_keeps_session_retryable() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        // A plain file where the staging directory should be.
        std::fs::write(&staging, b"blocker").unwrap();
        let m = SessionManager::new(&staging);

        send(&m, "io", 0, b"ABC", false).await.unwrap();
        let err = send(&m, "io", 1, b"DEF", true).await.unwrap_err();
        assert!(matches!(err, TransferError::IoWrite { .. }));

        let snap = m.snapshot().await;
        assert_eq!(snap[0].received_count, 2);
        assert!(!snap[0].complete);

        std::fs::remove_file(&staging).unwrap();
        let file = m.finalize("io").await.unwrap();
        assert_eq!(std::fs::read(file.path).unwrap(), b"ABCDEF");
    }

    #[tokio::test]
    async fn completed_file_replaces_existing_without_leftovers() {
        let (_dir, m) = manager();
        std::fs::create_dir_all(m.staging_dir()).unwrap();
        std::fs::write(m.staging_dir().join("out.txt"), b"old").unwrap();

        send(&m, "r", 0, b"new", true).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(m.staging_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.txt")]);
        assert_eq!(
            std::fs::read(m.staging_dir().join("out.txt")).unwrap(),
            b"new"
        );
    }

    #[tokio::test]
    async fn sweep_reclaims_idle_sessions() {
        let (_dir, m) = manager();
        send(&m, "idle", 0, b"A", false).await.unwrap();
        send_named(&m, "done", "done.txt", 0, b"B", true).await.unwrap();

        assert_eq!(m.sweep_expired_sessions(Duration::from_secs(3600)), 0);
        assert_eq!(m.session_count(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(m.sweep_expired_sessions(Duration::from_millis(5)), 2);
        assert_eq!(m.session_count(), 0);
        assert!(m.snapshot().await.is_empty());

        // A reclaimed id starts over.
        assert!(matches!(
            m.finalize("idle").await,
            Err(TransferError::UnknownSession(_))
        ));
        let ack = send(&m, "done", 0, b"C", true).await.unwrap();
        assert!(ack.complete);
    }

    // -----------------------------------------------------------------------
    // Staged file ownership
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn completed_session_keeps_its_staged_name() {
        let (_dir, m) = manager();
        let first = send(&m, "user-a", 0, b"AAAA", true)
            .await
            .unwrap()
            .assembled
            .unwrap();

        let err = send(&m, "user-b", 0, b"BBBBBBBB", true).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::FileNameInUse { ref file_name, ref session_id }
                if file_name == "out.txt" && session_id == "user-a"
        ));
        assert_eq!(m.session_count(), 1);

        let again = m.finalize("user-a").await.unwrap();
        assert_eq!(again, first);
        assert_eq!(again.size, 4);
        assert_eq!(std::fs::read(&again.path).unwrap(), b"AAAA");
        again.verify().unwrap();
    }

    #[tokio::test]
    async fn open_session_holds_its_name() {
        let (_dir, m) = manager();
        send(&m, "user-a", 0, b"AA", false).await.unwrap();

        let err = send(&m, "user-b", 0, b"BBBB", true).await.unwrap_err();
        assert!(matches!(err, TransferError::FileNameInUse { .. }));

        let file = send(&m, "user-a", 1, b"AA", true)
            .await
            .unwrap()
            .assembled
            .unwrap();
        assert_eq!(std::fs::read(&file.path).unwrap(), b"AAAA");

        // Another name is still free for the second session.
        let other = send_named(&m, "user-b", "other.txt", 0, b"BBBB", true)
            .await
            .unwrap()
            .assembled
            .unwrap();
        assert_eq!(std::fs::read(&other.path).unwrap(), b"BBBB");
        assert_eq!(std::fs::read(&file.path).unwrap(), b"AAAA");
    }

    #[tokio::test]
    async fn swept_session_releases_its_name() {
        let (_dir, m) = manager();
        send(&m, "user-a", 0, b"AAAA", true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(m.sweep_expired_sessions(Duration::from_millis(5)), 1);

        let file = send(&m, "user-b", 0, b"BBBBBBBB", true)
            .await
            .unwrap()
            .assembled
            .unwrap();
        assert_eq!(std::fs::read(&file.path).unwrap(), b"BBBBBBBB");
    }

    #[tokio::test]
    async fn rejected_first_chunk_releases_its_name() {
        let (_dir, m) = manager();
        let b64 = STANDARD.encode(b"x");
        let err = m
            .begin_or_continue_chunk(ChunkSubmission {
                session_id: "user-c",
                file_name: "c.txt",
                chunk_index: 3,
                data_b64: &b64,
                is_final: false,
                total_chunks: Some(2),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChunkOutOfRange { .. }));

        assert!(send_named(&m, "user-d", "c.txt", 0, b"D", true).await.is_ok());
    }

    #[tokio::test]
    async fn verify_detects_a_replaced_staged_file() {
        let (_dir, m) = manager();
        let file = send(&m, "s", 0, b"ABC", true)
            .await
            .unwrap()
            .assembled
            .unwrap();
        file.verify().unwrap();

        std::fs::write(&file.path, b"XYZ").unwrap();
        assert!(matches!(
            file.verify(),
            Err(TransferError::StagedFileChanged(ref p)) if *p == file.path
        ));

        std::fs::write(&file.path, b"ABCD").unwrap();
        assert!(matches!(
            file.verify(),
            Err(TransferError::StagedFileChanged(_))
        ));

        std::fs::remove_file(&file.path).unwrap();
        assert!(matches!(file.verify(), Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn sweep_skips_locked_session() {
        let (_dir, m) = manager();
        send(&m, "busy", 0, b"A", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handle = m.lock_sessions().sessions.get("busy").cloned().unwrap();
        let guard = handle.lock().await;
        assert_eq!(m.sweep_expired_sessions(Duration::from_millis(5)), 0);
        drop(guard);
        assert_eq!(m.sweep_expired_sessions(Duration::from_millis(5)), 1);
    }

    #[tokio::test]
    async fn waiter_on_reclaimed_session_starts_fresh() {
        let (_dir, m) = manager();
        send(&m, "x", 0, b"old", false).await.unwrap();

        let handle = m.lock_sessions().sessions.get("x").cloned().unwrap();
        {
            let mut s = handle.lock().await;
            s.state = SessionState::Reclaimed;
        }
        m.lock_sessions().sessions.remove("x");

        let ack = send(&m, "x", 0, b"new", true).await.unwrap();
        assert!(ack.complete);
        assert_eq!(std::fs::read(ack.assembled.unwrap().path).unwrap(), b"new");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_chunks_for_one_session() {
        let dir = TempDir::new().unwrap();
        let m = Arc::new(SessionManager::new(dir.path()));
        const N: u64 = 64;

        let mut tasks = Vec::new();
        for i in (0..N).rev() {
            let m = Arc::clone(&m);
            tasks.push(tokio::spawn(async move {
                let b64 = STANDARD.encode(format!("{i:03},"));
                m.begin_or_continue_chunk(ChunkSubmission {
                    session_id: "race",
                    file_name: "race.txt",
                    chunk_index: i,
                    data_b64: &b64,
                    is_final: false,
                    total_chunks: Some(N),
                })
                .await
            }));
        }

        let mut completed = 0;
        for t in tasks {
            if t.await.unwrap().unwrap().complete {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);

        let expected: String = (0..N).map(|i| format!("{i:03},")).collect();
        let content = std::fs::read_to_string(dir.path().join("race.txt")).unwrap();
        assert_eq!(content, expected);
    }

    #[test]
    fn bounds_checks() {
        assert!(check_bounds(0, None).is_ok());
        assert!(check_bounds(MAX_CHUNKS_PER_SESSION, None).is_err());
        assert!(check_bounds(0, Some(0)).is_err());
        assert!(check_bounds(2, Some(2)).is_err());
        assert!(check_bounds(1, Some(2)).is_ok());
    }
}
