//! Error types for the client session.

use mapwire_protocol::ProtocolError;
use mapwire_session::SessionError;
use mapwire_transport::TransportError;

/// Errors that can end a client session or fail a send.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The stream broke. With `stay_connected` the session reconnects
    /// instead of returning this.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server broke the protocol: bad version banner, a message out
    /// of turn, or an unsendable payload on our side.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Login failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Every allowed connection attempt failed.
    #[error("could not connect to {endpoint} after {attempts} attempt(s)")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The overall connect deadline passed.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// There is no logged-in connection to send on.
    #[error("not connected")]
    NotConnected,
}

impl ClientError {
    /// `true` for failures that a reconnect could fix: the stream dropped
    /// after it was established. Local send refusals such as a full queue
    /// say nothing about the stream and do not count.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(
                TransportError::ConnectionClosed(_)
                    | TransportError::ReceiveFailed(_)
                    | TransportError::LineTooLong { .. }
            )
        )
    }
}
