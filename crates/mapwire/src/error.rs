//! Unified error type for the Mapwire crates.

use mapwire_client::ClientError;
use mapwire_protocol::ProtocolError;
use mapwire_server::ServerError;
use mapwire_session::SessionError;
use mapwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert any sub-crate error.
#[derive(Debug, thiserror::Error)]
pub enum MapwireError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

#[cfg(test)]
mod tests {
    use mapwire_protocol::MessageKind;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let mapwire_err: MapwireError = err.into();
        assert!(matches!(mapwire_err, MapwireError::Transport(_)));
        assert!(mapwire_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::NotSendable(MessageKind::Unknown);
        let mapwire_err: MapwireError = err.into();
        assert!(matches!(mapwire_err, MapwireError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AccessDenied("login incorrect".into());
        let mapwire_err: MapwireError = err.into();
        assert!(matches!(mapwire_err, MapwireError::Session(_)));
        assert!(mapwire_err.to_string().contains("login incorrect"));
    }

    #[test]
    fn test_from_client_and_server_errors() {
        let client: MapwireError = ClientError::NotConnected.into();
        assert!(matches!(client, MapwireError::Client(_)));

        let server: MapwireError = ServerError::from(SessionError::LoginTimeout).into();
        assert!(matches!(server, MapwireError::Server(_)));
    }
}
