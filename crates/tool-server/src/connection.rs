//! Outgoing side of the stdio connection: response queue and write pump.

use linshare_protocol::Response;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;

/// Handle for queueing responses to the client.
///
/// Cloneable and cheap; wraps an `mpsc::Sender` of serialized lines.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<String>,
}

impl Sender {
    /// Serializes and queues a response, waiting for room in the queue.
    ///
    /// Returns `Err` only if the write pump has stopped.
    pub async fn send(&self, response: &Response) -> Result<(), SendError> {
        let line = serde_json::to_string(response).map_err(|e| {
            tracing::error!("failed to serialize response: {e}");
            SendError
        })?;
        self.tx.send(line).await.map_err(|_| SendError)
    }
}

/// Error returned when the write pump is gone.
#[derive(Debug, thiserror::Error)]
#[error("send failed: connection closed")]
pub struct SendError;

/// Creates the response queue.
pub(crate) fn channel() -> (Sender, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(SEND_BUFFER_SIZE);
    (Sender { tx }, rx)
}

/// Write pump: writes each queued line followed by `\n` and flushes.
///
/// Runs until every [`Sender`] is dropped (after draining the queue), the
/// writer fails, or `cancel` fires.
pub(crate) async fn write_pump<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.flush().await
}
