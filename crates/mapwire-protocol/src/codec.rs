//! The line codec: one message per line, `COMMAND-WORD [JSON]`.
//!
//! Encoding and decoding are pure functions. Decoding never fails: a line
//! the codec can't parse becomes a [`Payload::Error`] or
//! [`Payload::Unknown`] value, so the session layers see every line the
//! peer sent, in order, and can decide what to do about the bad ones.
//!
//! ```rust
//! use mapwire_protocol::{decode_line, encode_line, Granted, MessageKind, Payload};
//!
//! let line = encode_line(&Payload::Granted(Granted { user: "alice".into() })).unwrap();
//! assert_eq!(line, r#"GRANTED {"User":"alice"}"#);
//!
//! let envelope = decode_line(&line);
//! assert_eq!(envelope.kind(), MessageKind::Granted);
//! assert_eq!(envelope.raw, line);
//! ```

use crate::types::{DecodeFailure, UnknownCommand};
use crate::{MessageKind, Payload, ProtocolError};

const COMMENT_PREFIX: &str = "//";
const EMPTY_OBJECT: &str = "{}";

/// A decoded message together with the exact line it came from.
///
/// Keeping the raw text lets a subscriber log or forward a message without
/// re-encoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The line as received, without its terminator.
    pub raw: String,
    /// The decoded body.
    pub payload: Payload,
}

impl Envelope {
    /// Wraps a payload for local delivery, encoding its wire form into
    /// `raw`. Diagnostic payloads get a descriptive `raw` instead.
    pub fn new(payload: Payload) -> Self {
        let raw = match &payload {
            Payload::Error(failure) => {
                format!("{} <{}>", failure.command, failure.cause)
            }
            Payload::Unknown(unknown) => unknown.command.clone(),
            other => encode_line(other).unwrap_or_default(),
        };
        Self { raw, payload }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// Encodes a payload as a single line (without the trailing newline).
///
/// Payloads whose JSON body is the empty object are written as the bare
/// command word.
///
/// # Errors
/// [`ProtocolError::NotSendable`] for the receive-side `Error` and
/// `Unknown` payloads, and [`ProtocolError::Encode`] if serialization
/// fails.
pub fn encode_line(payload: &Payload) -> Result<String, ProtocolError> {
    let kind = payload.kind();
    match payload {
        Payload::Comment(text) => Ok(format!("{COMMENT_PREFIX} {text}")),
        Payload::Protocol(version) => Ok(format!("PROTOCOL {version}")),
        Payload::Error(_) | Payload::Unknown(_) => {
            Err(ProtocolError::NotSendable(kind))
        }
        _ => {
            let word = kind.command().ok_or(ProtocolError::NotSendable(kind))?;
            let body = payload
                .json_body()
                .ok_or(ProtocolError::NotSendable(kind))??;
            if body == EMPTY_OBJECT {
                Ok(word.to_string())
            } else {
                Ok(format!("{word} {body}"))
            }
        }
    }
}

/// Decodes one line (without its terminator).
pub fn decode_line(line: &str) -> Envelope {
    Envelope {
        raw: line.to_string(),
        payload: decode_payload(line),
    }
}

fn decode_payload(line: &str) -> Payload {
    if let Some(rest) = line.strip_prefix(COMMENT_PREFIX) {
        let text = rest.strip_prefix(' ').unwrap_or(rest);
        return Payload::Comment(text.to_string());
    }

    let (word, body) = match line.split_once(' ') {
        Some((word, body)) => (word, body.trim()),
        None => (line.trim_end(), ""),
    };

    let Some(kind) = MessageKind::from_command(word) else {
        return Payload::Unknown(UnknownCommand {
            command: word.to_string(),
        });
    };

    if kind == MessageKind::Protocol {
        return match body.parse::<u32>() {
            Ok(version) => Payload::Protocol(version),
            Err(e) => Payload::Error(DecodeFailure {
                command: word.to_string(),
                cause: format!("bad protocol version {body:?}: {e}"),
            }),
        };
    }

    let body = if body.is_empty() { EMPTY_OBJECT } else { body };
    match Payload::from_json(kind, body) {
        Some(Ok(payload)) => payload,
        Some(Err(e)) => Payload::Error(DecodeFailure {
            command: word.to_string(),
            cause: e.to_string(),
        }),
        // Comment and Protocol are handled above; nothing else lacks a
        // JSON form.
        None => Payload::Unknown(UnknownCommand {
            command: word.to_string(),
        }),
    }
}
