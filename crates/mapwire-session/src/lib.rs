//! Session building blocks shared by the Mapwire client and server.
//!
//! This crate holds the pieces of a session that don't depend on which
//! side of the connection you are on:
//!
//! 1. **Authentication** ([`Authenticator`]): challenge generation,
//!    response calculation, and validation with player and GM secrets.
//! 2. **Lifecycle** ([`SessionState`]): where a session is between
//!    dialing and shutdown.
//! 3. **Diagnostics** ([`DebugFlags`]): which categories of trace output
//!    to emit.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client / Server (above)  ← drive the handshake and dispatch loop
//!     ↕
//! Session Layer (this crate)  ← login state and credentials
//!     ↕
//! Protocol Layer (below)  ← command words and payload types
//! ```

mod auth;
mod error;
mod state;

pub use auth::{Authenticator, CHALLENGE_LEN};
pub use error::SessionError;
pub use state::{DebugFlags, SessionState, UnknownDebugFlag};
