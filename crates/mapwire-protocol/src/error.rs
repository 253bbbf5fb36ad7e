//! Error types for the protocol layer.
//!
//! Decoding a single line never produces one of these: a line that fails
//! to decode becomes a [`Payload::Error`](crate::Payload::Error) value and
//! travels the normal message path. `ProtocolError` is for encoding
//! failures and for handshake or sender-rule violations detected by the
//! session layers.

use crate::MessageKind;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a payload body to JSON failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is a receive-side diagnostic (`Error` or `Unknown`) and
    /// has no wire form.
    #[error("{0} payloads cannot be sent")]
    NotSendable(MessageKind),

    /// A message arrived at a point in the handshake where it isn't
    /// allowed.
    #[error("expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: MessageKind,
    },

    /// The peer speaks a protocol version outside the supported window.
    #[error("protocol version {version} not supported (need {min}..={max})")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },

    /// The peer sent a command word reserved for the other role.
    #[error("{0} may not be sent by this peer")]
    WrongSender(MessageKind),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
