//! The application's side of a client session.

use std::collections::HashMap;
use std::sync::Arc;

use mapwire_protocol::{
    encode_line, Accept, Creature, Envelope, MessageKind, Payload, ProtocolError,
    StatusMarker, UpdateVersions,
};
use mapwire_session::SessionState;
use tokio::sync::{mpsc, watch};

use crate::shared::Shared;
use crate::ClientError;

/// A cheap, cloneable handle onto a [`ClientSession`](crate::ClientSession).
///
/// Handles stay valid across reconnects. Sends fail with
/// [`ClientError::NotConnected`] whenever the session isn't `Ready`.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queues a message for the server. Never waits for the network.
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] unless logged in
    /// - [`ProtocolError::WrongSender`] for server-only kinds
    /// - [`ClientError::Transport`] if the outbound queue is full or gone
    pub fn send(&self, payload: &Payload) -> Result<(), ClientError> {
        let kind = payload.kind();
        if !kind.origin().client_may_send() {
            return Err(ProtocolError::WrongSender(kind).into());
        }
        let line = encode_line(payload)?;
        let outbound = self.ready_outbound()?;
        outbound.send_line(line)?;
        Ok(())
    }

    /// Routes every message of `kinds` to `tx`, replacing any earlier
    /// subscriber for those kinds. A subscribed kind no longer gets its
    /// built-in handling (for `MARCO`, the automatic `POLO`).
    ///
    /// While logged in, the new subscription list is sent to the server
    /// as `ACCEPT`.
    pub fn subscribe(&self, kinds: &[MessageKind], tx: mpsc::Sender<Envelope>) {
        self.shared.subscribe(kinds, &tx);
        self.announce_subscriptions();
    }

    /// Removes the subscriptions for `kinds`, restoring their built-in
    /// handling.
    pub fn unsubscribe(&self, kinds: &[MessageKind]) {
        self.shared.unsubscribe(kinds);
        self.announce_subscriptions();
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// A receiver that sees every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.watch_state()
    }

    /// Waits until the session is `Ready`.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] if the session closes first.
    pub async fn wait_until_ready(&self) -> Result<(), ClientError> {
        let mut rx = self.shared.watch_state();
        let state = rx
            .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Closed))
            .await
            .map_err(|_| ClientError::NotConnected)?;
        match *state {
            SessionState::Ready => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// The name the server granted, or the requested one before that.
    pub fn username(&self) -> Option<String> {
        self.shared.caches().username.clone()
    }

    /// Character roster received from `AC`, by name.
    pub fn characters(&self) -> HashMap<String, Creature> {
        self.shared.caches().characters.clone()
    }

    /// Status marker definitions received from `DSM`, by condition.
    pub fn status_markers(&self) -> HashMap<String, StatusMarker> {
        self.shared.caches().status_markers.clone()
    }

    /// Comment lines the server sent during login.
    pub fn preamble(&self) -> Vec<String> {
        self.shared.caches().preamble.clone()
    }

    pub fn calendar(&self) -> Option<String> {
        self.shared.caches().calendar.clone()
    }

    pub fn versions(&self) -> Option<UpdateVersions> {
        self.shared.caches().versions.clone()
    }

    /// Protocol version from the server's banner.
    pub fn server_protocol(&self) -> Option<u32> {
        self.shared.caches().server_protocol
    }

    fn ready_outbound(&self) -> Result<mapwire_transport::Outbound, ClientError> {
        if !self.shared.state().is_ready() {
            return Err(ClientError::NotConnected);
        }
        self.shared.outbound().ok_or(ClientError::NotConnected)
    }

    fn announce_subscriptions(&self) {
        let Ok(outbound) = self.ready_outbound() else {
            return;
        };
        let accept = Payload::Accept(Accept {
            messages: self.shared.subscribed_words(),
        });
        let sent = encode_line(&accept)
            .map_err(ClientError::from)
            .and_then(|line| outbound.send_line(line).map_err(ClientError::from));
        if let Err(e) = sent {
            tracing::warn!(error = %e, "could not send ACCEPT");
        }
    }
}

#[cfg(test)]
mod tests {
    use mapwire_protocol::{ChatMessage, Granted};

    use super::*;

    fn handle() -> SessionHandle {
        SessionHandle::new(Arc::new(Shared::new(Some("alice".into()))))
    }

    #[test]
    fn test_send_before_ready_is_not_connected() {
        let h = handle();
        let err = h.send(&Payload::ChatMessage(ChatMessage::default())).unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[test]
    fn test_send_server_only_kind_is_refused() {
        let h = handle();
        let err = h
            .send(&Payload::Granted(Granted { user: "x".into() }))
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::WrongSender(MessageKind::Granted))
        ));
    }

    #[test]
    fn test_username_defaults_to_requested_name() {
        assert_eq!(handle().username().as_deref(), Some("alice"));
    }

    #[test]
    fn test_subscribe_while_offline_only_records() {
        let h = handle();
        let (tx, _rx) = mpsc::channel(4);
        h.subscribe(&[MessageKind::ChatMessage], tx);
        assert_eq!(h.state(), SessionState::Connecting);
        assert!(h.shared.subscriber(MessageKind::ChatMessage).is_some());
    }
}
