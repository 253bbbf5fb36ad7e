//! A line-framed connection with background read and write tasks.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::{ConnectionId, Stream, TransportError};

/// How long a closing connection keeps writing lines already queued.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Tunables for a single connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Capacity of the outbound queue, in lines. When the queue is full,
    /// [`Outbound::send_line`] fails instead of waiting.
    ///
    /// Default: 64.
    pub queue_depth: usize,

    /// Longest accepted incoming line, in bytes, not counting the newline.
    ///
    /// Default: 1 MiB.
    pub max_line_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            max_line_len: 1024 * 1024,
        }
    }
}

/// Sending half of a connection's outbound queue.
///
/// Cheap to clone. Every clone feeds the same write task.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    depth: usize,
}

impl Outbound {
    pub(crate) fn new(tx: mpsc::Sender<String>, depth: usize) -> Self {
        Self { tx, depth }
    }

    /// Queues one line for transmission. The newline terminator is added
    /// by the write task.
    ///
    /// Never waits: a full queue is reported as
    /// [`TransportError::QueueFull`] and the line is dropped.
    ///
    /// # Errors
    /// - [`TransportError::EmbeddedNewline`] if `line` contains `\n`
    /// - [`TransportError::QueueFull`] if the queue is at capacity
    /// - [`TransportError::ConnectionClosed`] if the write task has stopped
    pub fn send_line(
        &self,
        line: impl Into<String>,
    ) -> Result<(), TransportError> {
        let line = line.into();
        if line.contains('\n') {
            return Err(TransportError::EmbeddedNewline);
        }
        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(TransportError::QueueFull { depth: self.depth })
            }
            Err(TrySendError::Closed(_)) => Err(
                TransportError::ConnectionClosed("writer stopped".into()),
            ),
        }
    }

    /// Queues one line, waiting for room if the queue is full.
    ///
    /// For bursts the owner produces itself, such as a login sequence,
    /// where dropping a line is worse than waiting for the writer.
    ///
    /// # Errors
    /// - [`TransportError::EmbeddedNewline`] if `line` contains `\n`
    /// - [`TransportError::ConnectionClosed`] if the write task has stopped
    ///   or stops while waiting
    pub async fn send_line_wait(
        &self,
        line: impl Into<String>,
    ) -> Result<(), TransportError> {
        let line = line.into();
        if line.contains('\n') {
            return Err(TransportError::EmbeddedNewline);
        }
        self.tx.send(line).await.map_err(|_| {
            TransportError::ConnectionClosed("writer stopped".into())
        })
    }

    /// Returns `true` once the write task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One open stream, framed into lines.
///
/// Dropping the connection (or calling [`close`](Self::close)) cancels
/// both background tasks and shuts the stream down.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    outbound: Outbound,
    incoming: mpsc::Receiver<Result<String, TransportError>>,
    cancel: CancellationToken,
}

impl Connection {
    /// Wraps `stream` and spawns its read and write tasks.
    ///
    /// The connection's lifetime token is a child of `parent`, so
    /// cancelling the parent closes the stream too.
    pub fn open<S: Stream>(
        stream: S,
        peer: Option<SocketAddr>,
        config: &ConnectionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let id = ConnectionId::next();
        let cancel = parent.child_token();
        let depth = config.queue_depth.max(1);

        let (read_half, write_half) = tokio::io::split(stream);
        let (out_tx, out_rx) = mpsc::channel(depth);
        let (in_tx, in_rx) = mpsc::channel(depth);

        tokio::spawn(read_lines(
            id,
            BufReader::new(read_half),
            in_tx,
            config.max_line_len,
            cancel.clone(),
        ));
        tokio::spawn(write_lines(
            id,
            BufWriter::new(write_half),
            out_rx,
            cancel.clone(),
        ));

        tracing::debug!(%id, ?peer, "connection opened");

        Self {
            id,
            peer,
            outbound: Outbound::new(out_tx, depth),
            incoming: in_rx,
            cancel,
        }
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address, if the stream has one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns a handle to the outbound queue.
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Shorthand for `self.outbound().send_line(line)`.
    pub fn send_line(
        &self,
        line: impl Into<String>,
    ) -> Result<(), TransportError> {
        self.outbound.send_line(line)
    }

    /// Shorthand for `self.outbound().send_line_wait(line)`.
    pub async fn send_line_wait(
        &self,
        line: impl Into<String>,
    ) -> Result<(), TransportError> {
        self.outbound.send_line_wait(line).await
    }

    /// Receives the next line from the peer.
    ///
    /// Returns `None` once the stream is closed (by either side).
    /// Cancel-safe: usable as a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await
    }

    /// Closes the stream. Pending reads return `None` afterwards.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Read task: splits the stream into lines until EOF, error or cancel.
async fn read_lines<R>(
    id: ConnectionId,
    mut reader: R,
    tx: mpsc::Sender<Result<String, TransportError>>,
    max_line_len: usize,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    // Room for the line plus a CRLF terminator.
    let limit = max_line_len as u64 + 2;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(limit);
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            r = limited.read_until(b'\n', &mut buf) => r,
        };

        let item = match read {
            Ok(0) => {
                tracing::debug!(%id, "peer closed stream");
                break;
            }
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                if buf.len() > max_line_len {
                    Err(TransportError::LineTooLong {
                        limit: max_line_len,
                    })
                } else if buf.is_empty() {
                    continue;
                } else {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    tracing::trace!(%id, %line, "<-");
                    Ok(line)
                }
            }
            Err(e) => Err(TransportError::ReceiveFailed(e)),
        };

        let fatal = item.is_err();
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        if fatal {
            break;
        }
    }
}

/// Write task: drains the outbound queue into the stream.
///
/// Lines already waiting in the queue are written as one batch before the
/// buffer is flushed.
async fn write_lines<W>(
    id: ConnectionId,
    mut writer: BufWriter<W>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) where
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

        let mut result = write_line(&mut writer, &line).await;
        while result.is_ok() {
            match rx.try_recv() {
                Ok(line) => result = write_line(&mut writer, &line).await,
                Err(_) => break,
            }
        }
        if result.is_ok() {
            result = writer.flush().await;
        }

        if let Err(e) = result {
            tracing::warn!(%id, error = %e, "write failed, closing connection");
            cancel.cancel();
            break;
        }
    }

    // Lines queued before the close still go out, if the peer takes them
    // quickly.
    rx.close();
    let drain = async {
        while let Ok(line) = rx.try_recv() {
            write_line(&mut writer, &line).await?;
        }
        writer.flush().await?;
        writer.shutdown().await
    };
    if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
        tracing::debug!(%id, "peer too slow, dropped queued lines");
    }
    tracing::debug!(%id, "writer stopped");
}

async fn write_line<W>(
    writer: &mut BufWriter<W>,
    line: &str,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::trace!(%line, "->");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
