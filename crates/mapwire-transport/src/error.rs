/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Dialing the remote endpoint failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The connect deadline passed before a connection was established.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Reading from the stream failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer sent a line longer than the configured limit.
    #[error("incoming line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// An outgoing line contained a newline, which would split it in two
    /// on the wire.
    #[error("outgoing line contains an embedded newline")]
    EmbeddedNewline,

    /// The outbound queue is full. The line was not queued.
    #[error("outbound queue full ({depth} lines)")]
    QueueFull { depth: usize },

    /// The listener was shut down.
    #[error("transport shut down")]
    Shutdown,
}
