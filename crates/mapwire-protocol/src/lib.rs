//! Wire protocol for Mapwire.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Command table** ([`MessageKind`], [`Payload`], [`Origin`]): every
//!   command word, the typed body it carries, and which side may send it.
//! - **Payload types** (in [`types`]): the JSON bodies, PascalCase on the
//!   wire.
//! - **Codec** ([`encode_line`], [`decode_line`], [`Envelope`]): one
//!   message per line, `COMMAND-WORD [JSON]`.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (lines of text) and session
//! (login state). It doesn't know about connections or authentication;
//! it only knows how to turn lines into messages and back.
//!
//! ```text
//! Transport (lines) → Protocol (Envelope) → Session (handshake, dispatch)
//! ```

mod codec;
mod error;
mod message;
pub mod types;

pub use codec::{decode_line, encode_line, Envelope};
pub use error::ProtocolError;
pub use message::{MessageKind, Origin, Payload};
pub use types::*;

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 411;

/// Oldest server protocol a client will talk to.
pub const MIN_SUPPORTED_PROTOCOL: u32 = 400;

/// Newest server protocol a client will talk to.
pub const MAX_SUPPORTED_PROTOCOL: u32 = 411;

/// Returns `true` if `version` falls in the supported window.
pub fn is_supported_version(version: u32) -> bool {
    (MIN_SUPPORTED_PROTOCOL..=MAX_SUPPORTED_PROTOCOL).contains(&version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_version_window() {
        assert!(is_supported_version(PROTOCOL_VERSION));
        assert!(is_supported_version(400));
        assert!(!is_supported_version(399));
        assert!(!is_supported_version(412));
    }
}
