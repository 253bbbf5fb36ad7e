//! # Mapwire
//!
//! Authenticated line protocol for shared tabletop maps.
//!
//! A server and its clients exchange one message per line: a command word
//! and an optional JSON body. Logins use a challenge/response over a
//! shared secret, so the password never crosses the wire. This crate
//! re-exports the pieces:
//!
//! - [`transport`]: line-framed connections over TCP or any byte stream
//! - [`protocol`]: the command table and the line codec
//! - [`session`]: the authenticator and session state
//! - [`client`]: [`ClientSession`], with reconnects and subscriptions
//! - [`server`]: [`MapwireServer`] and the [`Registry`] hook
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapwire::prelude::*;
//!
//! struct Quiet;
//!
//! impl Registry for Quiet {
//!     async fn handle_message(&self, envelope: Envelope, peer: &Peer) {
//!         tracing::info!(user = peer.username(), line = %envelope.raw, "got");
//!     }
//! }
//!
//! # async fn demo() -> Result<(), MapwireError> {
//! mapwire::init_tracing(&DebugFlags::default());
//! let config = ServerConfig {
//!     player_secret: Some("table secret".into()),
//!     ..ServerConfig::default()
//! };
//! let server = MapwireServerBuilder::new()
//!     .bind("0.0.0.0:2323")
//!     .config(config)
//!     .build(Quiet)
//!     .await?;
//! server.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod logging;

pub use error::MapwireError;
pub use logging::{env_filter, init_tracing};

pub use mapwire_client as client;
pub use mapwire_protocol as protocol;
pub use mapwire_server as server;
pub use mapwire_session as session;
pub use mapwire_transport as transport;

pub use mapwire_client::{ClientConfig, ClientSession, SessionHandle};
pub use mapwire_server::{MapwireServer, MapwireServerBuilder, Peer, Registry, ServerConfig};

/// The common imports for applications.
pub mod prelude {
    pub use crate::MapwireError;
    pub use mapwire_client::{ClientConfig, ClientError, ClientSession, SessionHandle};
    pub use mapwire_protocol::{Envelope, MessageKind, Payload};
    pub use mapwire_server::{
        MapwireServer, MapwireServerBuilder, Peer, Preamble, Registry, ServerConfig, ServerError,
    };
    pub use mapwire_session::{Authenticator, DebugFlags, SessionError, SessionState};
    pub use tokio_util::sync::CancellationToken;
}
