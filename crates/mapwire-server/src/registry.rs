//! The hook between server sessions and the application.
//!
//! Mapwire runs the login handshake and keeps each connection alive, but
//! the game itself (who is connected, what the map looks like, where chat
//! goes) belongs to the application. It plugs in by implementing
//! [`Registry`]. One registry is shared by every connection, so it is
//! responsible for its own locking.

use std::future::Future;

use mapwire_protocol::Envelope;

use crate::Peer;

/// Raw lines sent to every client during login, and whether to push the
/// full game state afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preamble {
    /// Call [`Registry::send_game_state`] once the client is ready.
    pub sync_data: bool,
    /// Sent after the `PROTOCOL` banner, before the challenge.
    pub pre_auth: Vec<String>,
    /// Sent after `GRANTED`, before `READY`.
    pub post_auth: Vec<String>,
    /// Sent right after `READY`.
    pub post_ready: Vec<String>,
}

/// Application state shared across all server sessions.
///
/// # Example
///
/// ```rust
/// use mapwire_protocol::Envelope;
/// use mapwire_server::{Peer, Registry};
///
/// /// Logs every message and keeps no state.
/// struct LogRegistry;
///
/// impl Registry for LogRegistry {
///     async fn handle_message(&self, envelope: Envelope, peer: &Peer) {
///         println!("{}: {}", peer.username(), envelope.raw);
///     }
/// }
/// ```
pub trait Registry: Send + Sync + 'static {
    /// A per-user password that replaces the shared player secret for
    /// this login. Returning one also disables GM login for the user.
    fn personal_credentials(
        &self,
        _user: &str,
    ) -> impl Future<Output = Option<Vec<u8>>> + Send {
        async { None }
    }

    /// Lines to send during login.
    fn client_preamble(&self) -> impl Future<Output = Preamble> + Send {
        async { Preamble::default() }
    }

    /// Called for every message the session doesn't handle itself,
    /// including lines that failed to decode.
    fn handle_message(
        &self,
        envelope: Envelope,
        peer: &Peer,
    ) -> impl Future<Output = ()> + Send;

    /// A client finished logging in.
    fn add_client(&self, _peer: Peer) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// A client's connection ended. Called exactly once per
    /// [`add_client`](Self::add_client), however the session ended.
    fn remove_client(&self, _peer: &Peer) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Push the whole game state to a newly ready client.
    fn send_game_state(&self, _peer: &Peer) -> impl Future<Output = ()> + Send {
        async {}
    }
}
