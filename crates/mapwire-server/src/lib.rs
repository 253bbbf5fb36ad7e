//! Server side of the Mapwire protocol.
//!
//! [`MapwireServer`] accepts TCP connections and runs one
//! [`ServerSession`] per client. The session sends the banner and login
//! challenge, checks the client's answer, and then handles the
//! housekeeping commands itself (`ACCEPT`, `ALLOW`, `MARCO`/`POLO`,
//! `ECHO`). Everything else is passed to the application's [`Registry`].

mod config;
mod error;
mod peer;
mod registry;
mod server;
mod session;

pub use config::ServerConfig;
pub use error::ServerError;
pub use peer::Peer;
pub use registry::{Preamble, Registry};
pub use server::{MapwireServer, MapwireServerBuilder};
pub use session::{ServerSession, GM_USERNAME};
