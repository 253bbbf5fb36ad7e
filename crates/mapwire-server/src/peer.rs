//! A logged-in client as the registry sees it.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use mapwire_protocol::{encode_line, MessageKind, Payload};
use mapwire_transport::{ConnectionId, Outbound, TransportError};

use crate::ServerError;

/// One logged-in client connection.
///
/// Cheap to clone; every clone refers to the same connection. The
/// registry keeps these to fan messages out to clients.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    id: ConnectionId,
    addr: Option<SocketAddr>,
    outbound: Outbound,
    username: String,
    client_name: String,
    gm: bool,
    /// `None` means the client takes everything.
    filter: RwLock<Option<HashSet<MessageKind>>>,
    features: RwLock<HashSet<String>>,
    last_seen: RwLock<Instant>,
}

impl Peer {
    pub(crate) fn new(
        id: ConnectionId,
        addr: Option<SocketAddr>,
        outbound: Outbound,
        username: String,
        client_name: String,
        gm: bool,
    ) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                id,
                addr,
                outbound,
                username,
                client_name,
                gm,
                filter: RwLock::new(None),
                features: RwLock::new(HashSet::new()),
                last_seen: RwLock::new(Instant::now()),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.inner.addr
    }

    /// The granted username (`"GM"` for a GM login).
    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    pub fn is_gm(&self) -> bool {
        self.inner.gm
    }

    /// Optional features announced with `ALLOW`.
    pub fn features(&self) -> HashSet<String> {
        self.inner
            .features
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.inner
            .features
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(feature)
    }

    /// When the client last answered a `MARCO`.
    pub fn last_seen(&self) -> Instant {
        *self
            .inner
            .last_seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the client's `ACCEPT` filter lets `kind` through.
    /// Housekeeping kinds always pass.
    pub fn accepts(&self, kind: MessageKind) -> bool {
        if kind.bypasses_filter() {
            return true;
        }
        match &*self.inner.filter.read().unwrap_or_else(PoisonError::into_inner) {
            Some(allowed) => allowed.contains(&kind),
            None => true,
        }
    }

    /// Queues `payload` for this client, unless its filter excludes the
    /// kind, in which case nothing is sent and `Ok` is returned.
    ///
    /// # Errors
    /// Encoding failures, a full outbound queue, or a closed connection.
    pub fn send(&self, payload: &Payload) -> Result<(), ServerError> {
        if !self.accepts(payload.kind()) {
            return Ok(());
        }
        let line = encode_line(payload)?;
        self.inner.outbound.send_line(line)?;
        Ok(())
    }

    /// Like [`send`](Self::send), but waits for queue room instead of
    /// failing. Use it for bulk pushes such as a full game-state sync.
    ///
    /// # Errors
    /// Encoding failures or a closed connection.
    pub async fn send_wait(&self, payload: &Payload) -> Result<(), ServerError> {
        if !self.accepts(payload.kind()) {
            return Ok(());
        }
        let line = encode_line(payload)?;
        self.inner.outbound.send_line_wait(line).await?;
        Ok(())
    }

    /// Queues a pre-encoded line, bypassing the filter.
    pub fn send_line(&self, line: impl Into<String>) -> Result<(), TransportError> {
        self.inner.outbound.send_line(line)
    }

    /// `true` once the connection's writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.outbound.is_closed()
    }

    /// Replaces the filter from an `ACCEPT` list. An empty list accepts
    /// everything. Returns the words that aren't command words.
    pub(crate) fn set_filter(&self, words: &[String]) -> Vec<String> {
        let mut unknown = Vec::new();
        let filter = if words.is_empty() {
            None
        } else {
            let mut kinds = HashSet::with_capacity(words.len());
            for word in words {
                match MessageKind::from_command(word) {
                    Some(kind) => {
                        kinds.insert(kind);
                    }
                    None => unknown.push(word.clone()),
                }
            }
            Some(kinds)
        };
        *self.inner.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
        unknown
    }

    pub(crate) fn set_features(&self, features: Vec<String>) {
        *self.inner.features.write().unwrap_or_else(PoisonError::into_inner) =
            features.into_iter().collect();
    }

    pub(crate) fn touch(&self) {
        *self.inner.last_seen.write().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .field("username", &self.inner.username)
            .field("gm", &self.inner.gm)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Peer {}
