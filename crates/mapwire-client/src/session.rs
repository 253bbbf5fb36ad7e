//! The client session state machine.
//!
//! ```text
//!   Connecting ──dial ok──→ Authenticating ──READY──→ Ready
//!       ↑                                               │
//!       └── Reconnecting ←── stream lost (stay_connected)
//! ```
//!
//! One task (the caller of [`ClientSession::run`]) owns the connection,
//! drives the handshake, and dispatches every incoming message in
//! receipt order. The transport's own read and write tasks keep the
//! socket moving underneath it.

use std::sync::Arc;

use mapwire_protocol::{
    decode_line, encode_line, is_supported_version, Auth, Challenge, DecodeFailure,
    Envelope, MessageKind, Payload, Polo, ProtocolError, Accept,
    MAX_SUPPORTED_PROTOCOL, MIN_SUPPORTED_PROTOCOL,
};
use mapwire_session::{SessionError, SessionState};
use mapwire_transport::{dial, Connection, TransportError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::shared::{Caches, Shared};
use crate::{ClientConfig, ClientError, SessionHandle};

/// A client connection to a Mapwire server, including the login and the
/// reconnect policy.
///
/// Create one, take [`handle`](Self::handle)s for the application, then
/// drive it with [`run`](Self::run).
pub struct ClientSession {
    config: ClientConfig,
    shared: Arc<Shared>,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        let username = config
            .authenticator
            .as_ref()
            .map(|a| a.username().to_string())
            .filter(|u| !u.is_empty());
        Self {
            shared: Arc::new(Shared::new(username)),
            config,
        }
    }

    /// Returns a handle for sending, subscribing, and reading caches.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.shared))
    }

    /// Connects, logs in, and dispatches messages until `cancel` fires or
    /// the session fails.
    ///
    /// Returns `Ok(())` when cancelled. With `stay_connected`, a dropped
    /// stream leads to a fresh connection and a full new login instead of
    /// an error. Login failures and protocol violations are never retried.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ClientError> {
        let result = self.run_until_done(&cancel).await;

        self.shared.set_outbound(None);
        self.set_state(SessionState::Closed);
        match &result {
            Ok(()) => tracing::info!(endpoint = %self.config.endpoint, "client session closed"),
            Err(e) => {
                tracing::warn!(endpoint = %self.config.endpoint, error = %e, "client session ended");
                self.report_error(e);
            }
        }
        result
    }

    async fn run_until_done(&mut self, cancel: &CancellationToken) -> Result<(), ClientError> {
        loop {
            self.set_state(SessionState::Connecting);
            let Some(mut conn) = self.connect(cancel).await? else {
                return Ok(());
            };

            let result = self.serve(&mut conn, cancel).await;
            self.shared.set_outbound(None);
            conn.close();

            match result {
                Ok(()) => return Ok(()),
                Err(e)
                    if e.is_connection_loss()
                        && self.config.stay_connected
                        && !cancel.is_cancelled() =>
                {
                    tracing::warn!(
                        endpoint = %self.config.endpoint,
                        error = %e,
                        "connection lost, reconnecting"
                    );
                    self.set_state(SessionState::Reconnecting);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connecting
    // -----------------------------------------------------------------------

    /// Dials until a connect succeeds or the retries or deadline run out.
    /// `Ok(None)` means cancelled.
    async fn connect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Connection>, ClientError> {
        let endpoint = self.config.endpoint.as_str();
        let deadline = self.config.connect_timeout().map(|t| Instant::now() + t);
        let mut attempts: u32 = 0;

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(ClientError::ConnectTimeout(endpoint.to_string()));
                    }
                    Some(left)
                }
                None => None,
            };

            attempts += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                r = dial(endpoint, remaining) => r,
            };

            let err = match result {
                Ok((stream, peer)) => {
                    tracing::info!(%endpoint, %peer, attempts, "connected");
                    let conn = Connection::open(
                        stream,
                        Some(peer),
                        &self.config.connection,
                        cancel,
                    );
                    return Ok(Some(conn));
                }
                Err(e) => e,
            };

            if self.config.retries != 0 && attempts >= self.config.retries {
                return Err(ClientError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    attempts,
                    source: err,
                });
            }
            tracing::debug!(%endpoint, attempts, error = %err, "connect attempt failed");

            let mut delay = self.config.retry_delay();
            if let Some(left) = remaining {
                delay = delay.min(left);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // One connection
    // -----------------------------------------------------------------------

    /// Logs in, then dispatches until the stream ends or `cancel` fires.
    async fn serve(
        &mut self,
        conn: &mut Connection,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        self.set_state(SessionState::Authenticating);
        if !self.login(conn, cancel).await? {
            return Ok(());
        }

        self.shared.set_outbound(Some(conn.outbound()));
        self.set_state(SessionState::Ready);
        tracing::info!(
            endpoint = %self.config.endpoint,
            user = self.shared.caches().username.as_deref().unwrap_or(""),
            "session ready"
        );

        if self.shared.has_subscriptions() {
            let accept = Payload::Accept(Accept {
                messages: self.shared.subscribed_words(),
            });
            self.send(conn, &accept)?;
        }

        while let Some(envelope) = self.next_message(conn, cancel).await? {
            if !self.dispatch(envelope, conn, cancel).await? {
                break;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Authenticating
    // -----------------------------------------------------------------------

    /// Runs the handshake up to `READY`. Returns `false` if cancelled.
    async fn login(
        &mut self,
        conn: &mut Connection,
        cancel: &CancellationToken,
    ) -> Result<bool, ClientError> {
        {
            let mut caches = self.shared.caches_mut();
            let requested = self
                .config
                .authenticator
                .as_ref()
                .map(|a| a.username().to_string())
                .filter(|u| !u.is_empty());
            *caches = Caches {
                username: requested,
                ..Caches::default()
            };
        }

        let Some(banner) = self.next_message(conn, cancel).await? else {
            return Ok(false);
        };
        let version = match banner.payload {
            Payload::Protocol(version) => version,
            _ => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: "PROTOCOL",
                    got: banner.kind(),
                }
                .into());
            }
        };
        if !is_supported_version(version) {
            return Err(ProtocolError::UnsupportedVersion {
                version,
                min: MIN_SUPPORTED_PROTOCOL,
                max: MAX_SUPPORTED_PROTOCOL,
            }
            .into());
        }
        self.shared.caches_mut().server_protocol = Some(version);
        if self.config.debug.auth {
            tracing::debug!(target: "mapwire::auth", version, "server protocol accepted");
        }

        // GRANTED must answer our AUTH, and READY may not skip it.
        let mut challenged = false;
        let mut auth_sent = false;
        let mut granted = false;
        loop {
            let Some(envelope) = self.next_message(conn, cancel).await? else {
                return Ok(false);
            };
            match envelope.payload {
                Payload::Challenge(challenge) => {
                    challenged = true;
                    auth_sent |= self.answer_challenge(challenge, conn)?;
                }
                Payload::Granted(grant) => {
                    if !auth_sent {
                        return Err(ProtocolError::UnexpectedMessage {
                            expected: if challenged { "READY" } else { "CHALLENGE" },
                            got: MessageKind::Granted,
                        }
                        .into());
                    }
                    tracing::info!(user = %grant.user, "access granted");
                    self.shared.caches_mut().username = Some(grant.user);
                    granted = true;
                }
                Payload::Denied(denied) => {
                    return Err(SessionError::AccessDenied(denied.reason).into());
                }
                Payload::Ready(_) => {
                    if auth_sent && !granted {
                        return Err(ProtocolError::UnexpectedMessage {
                            expected: "GRANTED",
                            got: MessageKind::Ready,
                        }
                        .into());
                    }
                    return Ok(true);
                }
                Payload::Protocol(_) => {
                    return Err(ProtocolError::UnexpectedMessage {
                        expected: "READY",
                        got: MessageKind::Protocol,
                    }
                    .into());
                }
                Payload::Error(failure) => {
                    tracing::warn!(
                        command = %failure.command,
                        cause = %failure.cause,
                        "undecodable message during login"
                    );
                }
                Payload::Unknown(unknown) => {
                    tracing::warn!(command = %unknown.command, "unknown command during login");
                }
                other => {
                    let kept = self.shared.caches_mut().absorb(&other, true);
                    if !kept && self.config.debug.messages {
                        tracing::debug!(
                            target: "mapwire::messages",
                            command = %other.kind(),
                            "ignored during login"
                        );
                    }
                }
            }
        }
    }

    /// Sends `AUTH` if the challenge carries a nonce. Returns whether it
    /// did.
    fn answer_challenge(
        &mut self,
        challenge: Challenge,
        conn: &Connection,
    ) -> Result<bool, ClientError> {
        let Some(nonce) = challenge.challenge.filter(|n| !n.is_empty()) else {
            if self.config.debug.auth {
                tracing::debug!(target: "mapwire::auth", "server requires no authentication");
            }
            return Ok(false);
        };
        let authenticator = self
            .config
            .authenticator
            .as_mut()
            .ok_or(SessionError::AuthenticationRequired)?;

        let response = authenticator.accept_challenge(&nonce)?;
        let auth = Payload::Auth(Auth {
            response,
            user: authenticator.username().to_string(),
            client: self.config.client_name.clone(),
        });
        if self.config.debug.auth {
            tracing::debug!(
                target: "mapwire::auth",
                user = authenticator.username(),
                "answering challenge"
            );
        }
        self.send(conn, &auth)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Ready
    // -----------------------------------------------------------------------

    /// Handles one message. Returns `false` if cancelled mid-delivery.
    async fn dispatch(
        &self,
        envelope: Envelope,
        conn: &Connection,
        cancel: &CancellationToken,
    ) -> Result<bool, ClientError> {
        let kind = envelope.kind();
        if !kind.origin().server_may_send() {
            tracing::warn!(command = %kind, "server sent a client-only command, dropped");
            return Ok(true);
        }

        self.shared.caches_mut().absorb(&envelope.payload, false);

        if let Some(tx) = self.shared.subscriber(kind) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                sent = tx.send(envelope) => {
                    if sent.is_err() {
                        tracing::debug!(command = %kind, "subscriber went away");
                        self.shared.prune(kind);
                    }
                }
            }
            return Ok(true);
        }

        match &envelope.payload {
            Payload::Marco(_) => match self.send(conn, &Payload::Polo(Polo {})) {
                Ok(()) => {}
                Err(ClientError::Transport(TransportError::QueueFull { depth })) => {
                    tracing::warn!(depth, "outbound queue full, POLO dropped");
                }
                Err(e) => return Err(e),
            },
            Payload::Error(failure) => {
                tracing::warn!(
                    command = %failure.command,
                    cause = %failure.cause,
                    "undecodable message from server"
                );
            }
            Payload::Unknown(unknown) => {
                tracing::warn!(command = %unknown.command, "unknown command from server");
            }
            _ => {
                if self.config.debug.messages {
                    tracing::debug!(target: "mapwire::messages", command = %kind, "no subscriber, dropped");
                }
            }
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Next decoded message. `Ok(None)` means cancelled.
    async fn next_message(
        &self,
        conn: &mut Connection,
        cancel: &CancellationToken,
    ) -> Result<Option<Envelope>, ClientError> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            next = conn.recv() => next,
        };
        match next {
            Some(Ok(line)) => {
                if self.config.debug.io {
                    tracing::debug!(target: "mapwire::io", conn_id = %conn.id(), %line, "recv");
                }
                let envelope = decode_line(&line);
                if self.config.debug.messages {
                    tracing::debug!(target: "mapwire::messages", command = %envelope.kind(), "decoded");
                }
                Ok(Some(envelope))
            }
            Some(Err(e)) => Err(e.into()),
            None if cancel.is_cancelled() => Ok(None),
            None => Err(TransportError::ConnectionClosed(
                "server closed the connection".into(),
            )
            .into()),
        }
    }

    fn send(&self, conn: &Connection, payload: &Payload) -> Result<(), ClientError> {
        let line = encode_line(payload)?;
        if self.config.debug.io {
            tracing::debug!(target: "mapwire::io", conn_id = %conn.id(), %line, "send");
        }
        conn.send_line(line)?;
        Ok(())
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.shared.set_state(next);
        if previous != next && self.config.debug.events {
            tracing::debug!(target: "mapwire::events", from = %previous, to = %next, "state change");
        }
    }

    /// Hands a fatal protocol error to the `Error` subscriber, if any.
    fn report_error(&self, err: &ClientError) {
        let ClientError::Protocol(e) = err else {
            return;
        };
        let Some(tx) = self.shared.subscriber(MessageKind::Error) else {
            return;
        };
        let command = match e {
            ProtocolError::UnexpectedMessage { got, .. } => got.to_string(),
            ProtocolError::UnsupportedVersion { .. } => "PROTOCOL".to_string(),
            ProtocolError::WrongSender(kind) | ProtocolError::NotSendable(kind) => {
                kind.to_string()
            }
            ProtocolError::Encode(_) | ProtocolError::InvalidMessage(_) => String::new(),
        };
        let envelope = Envelope::new(Payload::Error(DecodeFailure {
            command,
            cause: e.to_string(),
        }));
        if tx.try_send(envelope).is_err() {
            tracing::debug!("error subscriber unavailable");
        }
    }
}
