//! Transport layer for Mapwire.
//!
//! Turns any duplex byte stream into a stream of text lines. Each
//! [`Connection`] runs two background tasks: one reads newline-terminated
//! lines and hands them to whoever owns the connection, the other drains a
//! bounded outbound queue into the stream. The owner never blocks on the
//! network: [`Outbound::send_line`] either queues the line immediately or
//! fails.
//!
//! ```text
//!   stream ──read task──→ Connection::recv()      (lines, receipt order)
//!   stream ←─write task── Outbound::send_line()   (lines, enqueue order)
//! ```
//!
//! [`TcpTransport`] and [`dial`] provide the TCP endpoints used by the
//! server and client sessions.

#![allow(async_fn_in_trait)]

mod connection;
mod error;
mod tcp;

pub use connection::{Connection, ConnectionConfig, Outbound};
pub use error::TransportError;
pub use tcp::{dial, TcpTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Any byte stream a [`Connection`] can run over.
///
/// Blanket-implemented, so `TcpStream`, `tokio::io::DuplexStream` and
/// friends all qualify.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Accepts new incoming streams.
pub trait Transport: Send + Sync + 'static {
    /// The stream type produced by this transport.
    type Stream: Stream;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming stream.
    async fn accept(
        &mut self,
    ) -> Result<(Self::Stream, SocketAddr), Self::Error>;

    /// Stops listening. Later calls to [`accept`](Self::accept) fail.
    async fn shutdown(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
