//! State shared between a running [`ClientSession`](crate::ClientSession)
//! and its [`SessionHandle`](crate::SessionHandle)s.
//!
//! The session task is the only writer of the caches and the current
//! outbound queue. Handles read snapshots and edit the subscription table.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mapwire_protocol::{
    Creature, Envelope, MessageKind, Payload, StatusMarker, UpdateVersions,
};
use mapwire_session::SessionState;
use mapwire_transport::Outbound;
use tokio::sync::{mpsc, watch};

/// Data the server sends during login, kept for the application.
#[derive(Debug, Clone, Default)]
pub(crate) struct Caches {
    /// `AC` entries by creature name.
    pub characters: HashMap<String, Creature>,
    /// `DSM` entries by condition name.
    pub status_markers: HashMap<String, StatusMarker>,
    /// Text of `//` lines seen before `READY`.
    pub preamble: Vec<String>,
    pub calendar: Option<String>,
    pub versions: Option<UpdateVersions>,
    pub server_protocol: Option<u32>,
    /// Name the server granted us.
    pub username: Option<String>,
}

impl Caches {
    /// Records anything worth keeping from `payload`. Returns `true` if it
    /// was one of the cached kinds.
    pub fn absorb(&mut self, payload: &Payload, before_ready: bool) -> bool {
        match payload {
            Payload::AddCharacter(c) => {
                self.characters.insert(c.name.clone(), c.clone());
            }
            Payload::UpdateStatusMarker(m) => {
                self.status_markers.insert(m.condition.clone(), m.clone());
            }
            Payload::World(w) => self.calendar = Some(w.calendar.clone()),
            Payload::UpdateVersions(v) => self.versions = Some(v.clone()),
            Payload::Comment(text) if before_ready => {
                self.preamble.push(text.clone());
            }
            _ => return false,
        }
        true
    }
}

pub(crate) struct Shared {
    state: watch::Sender<SessionState>,
    outbound: RwLock<Option<Outbound>>,
    subscriptions: RwLock<HashMap<MessageKind, mpsc::Sender<Envelope>>>,
    caches: RwLock<Caches>,
}

impl Shared {
    pub fn new(username: Option<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            state,
            outbound: RwLock::new(None),
            subscriptions: RwLock::new(HashMap::new()),
            caches: RwLock::new(Caches {
                username,
                ..Caches::default()
            }),
        }
    }

    // --- lifecycle ---

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Moves to `next`. Returns the previous state.
    pub fn set_state(&self, next: SessionState) -> SessionState {
        self.state.send_replace(next)
    }

    pub fn outbound(&self) -> Option<Outbound> {
        read(&self.outbound).clone()
    }

    pub fn set_outbound(&self, outbound: Option<Outbound>) {
        *write(&self.outbound) = outbound;
    }

    // --- subscriptions ---

    pub fn subscriber(&self, kind: MessageKind) -> Option<mpsc::Sender<Envelope>> {
        read(&self.subscriptions).get(&kind).cloned()
    }

    pub fn subscribe(&self, kinds: &[MessageKind], tx: &mpsc::Sender<Envelope>) {
        let mut subs = write(&self.subscriptions);
        for &kind in kinds {
            subs.insert(kind, tx.clone());
        }
    }

    pub fn unsubscribe(&self, kinds: &[MessageKind]) {
        let mut subs = write(&self.subscriptions);
        for kind in kinds {
            subs.remove(kind);
        }
    }

    /// Drops `kind`'s subscription if it still points at a closed channel.
    pub fn prune(&self, kind: MessageKind) {
        let mut subs = write(&self.subscriptions);
        if subs.get(&kind).is_some_and(mpsc::Sender::is_closed) {
            subs.remove(&kind);
        }
    }

    /// Command words of every subscribed kind that has one, sorted.
    pub fn subscribed_words(&self) -> Vec<String> {
        let subs = read(&self.subscriptions);
        let mut kinds: Vec<MessageKind> = subs.keys().copied().collect();
        kinds.sort();
        kinds
            .into_iter()
            .filter_map(MessageKind::command)
            .map(str::to_string)
            .collect()
    }

    pub fn has_subscriptions(&self) -> bool {
        !read(&self.subscriptions).is_empty()
    }

    // --- caches ---

    pub fn caches(&self) -> RwLockReadGuard<'_, Caches> {
        read(&self.caches)
    }

    pub fn caches_mut(&self) -> RwLockWriteGuard<'_, Caches> {
        write(&self.caches)
    }
}

// A panic while holding one of these locks can't leave the maps in a
// half-updated state, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
