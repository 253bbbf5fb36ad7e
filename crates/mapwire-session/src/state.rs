//! Session state and diagnostic switches shared by client and server.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
///   Connecting ──→ Authenticating ──→ Ready
///       ↑                               │
///       └──────── Reconnecting ←────────┘ (transport lost, stay_connected)
///
///   any state ──→ Closed
/// ```
///
/// Application traffic only flows in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Dialing the server, or waiting to retry.
    Connecting,
    /// Connected; the login handshake is in progress.
    Authenticating,
    /// Logged in. Messages flow both ways.
    Ready,
    /// The connection dropped and a new one is about to be dialed.
    Reconnecting,
    /// The session has ended and won't restart.
    Closed,
}

impl SessionState {
    pub fn is_ready(self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// DebugFlags
// ---------------------------------------------------------------------------

/// Which categories of trace output a session emits.
///
/// Every flag is off by default. Enabled categories log at `debug` level
/// under the target named by the flag (`mapwire::io`, `mapwire::messages`,
/// and so on), so they can also be filtered with `RUST_LOG`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugFlags {
    /// Every line read or written.
    pub io: bool,
    /// Decoded messages and dispatch decisions.
    pub messages: bool,
    /// Handshake and authentication steps.
    pub auth: bool,
    /// State transitions, subscriptions, and reconnects.
    pub events: bool,
}

impl DebugFlags {
    /// All categories on.
    pub fn all() -> Self {
        Self {
            io: true,
            messages: true,
            auth: true,
            events: true,
        }
    }
}

/// Error from parsing a [`DebugFlags`] list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown debug flag {0:?}")]
pub struct UnknownDebugFlag(pub String);

impl FromStr for DebugFlags {
    type Err = UnknownDebugFlag;

    /// Parses a comma-separated list such as `"io,auth"`. `"all"` and
    /// `"none"` are also accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = DebugFlags::default();
        for word in s.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            match word.to_ascii_lowercase().as_str() {
                "io" => flags.io = true,
                "messages" => flags.messages = true,
                "auth" => flags.auth = true,
                "events" => flags.events = true,
                "all" => flags = DebugFlags::all(),
                "none" => flags = DebugFlags::default(),
                _ => return Err(UnknownDebugFlag(word.to_string())),
            }
        }
        Ok(flags)
    }
}
