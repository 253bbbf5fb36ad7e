//! Error types for the server side.

use mapwire_protocol::ProtocolError;
use mapwire_session::SessionError;
use mapwire_transport::TransportError;

/// Errors that end a server session or stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The stream broke, or the listener failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Login failed: denied, timed out, or the challenge couldn't be made.
    #[error(transparent)]
    Session(#[from] SessionError),
}
