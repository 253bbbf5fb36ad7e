//! Per-connection handler: banner, login, registration, and dispatch.
//!
//! Each accepted connection gets its own task running
//! [`ServerSession::run`]. The flow is:
//!   1. `PROTOCOL`, pre-auth preamble, `OK` challenge
//!   2. await `AUTH` under the login timeout, validate, `GRANTED`/`DENIED`
//!   3. post-auth preamble, `READY`, post-ready preamble, optional sync
//!   4. register with the [`Registry`] and loop: housekeeping kinds are
//!      handled here, everything else goes to the registry

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use mapwire_protocol::{
    decode_line, encode_line, Auth, Challenge, Denied, Echo, Envelope, Granted, Marco,
    MessageKind, Payload, Polo, Priv, Ready, PROTOCOL_VERSION,
};
use mapwire_session::{Authenticator, SessionError};
use mapwire_transport::{Connection, TransportError};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{Peer, Registry, ServerConfig, ServerError};

/// Username granted to a GM login.
pub const GM_USERNAME: &str = "GM";

/// Reason sent with `DENIED`.
const LOGIN_INCORRECT: &str = "login incorrect";

/// Removes a peer from the registry when the session exits.
///
/// Covers every exit path, including panics. `Drop` is synchronous, so
/// the async call runs on a spawned task.
struct Registration<R: Registry> {
    registry: Arc<R>,
    peer: Peer,
}

impl<R: Registry> Drop for Registration<R> {
    fn drop(&mut self) {
        let registry = Arc::clone(&self.registry);
        let peer = self.peer.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    registry.remove_client(&peer).await;
                });
            }
            Err(_) => {
                tracing::warn!(conn_id = %peer.id(), "runtime gone, peer not deregistered");
            }
        }
    }
}

/// Who logged in.
struct Login {
    username: String,
    client_name: String,
    gm: bool,
}

/// The server side of one client connection.
pub struct ServerSession<R: Registry> {
    conn: Connection,
    registry: Arc<R>,
    authenticator: Option<Authenticator>,
    config: Arc<ServerConfig>,
}

impl<R: Registry> ServerSession<R> {
    /// Wraps an open connection. With `authenticator` set the client must
    /// answer a challenge; without it the login is open.
    pub fn new(
        conn: Connection,
        registry: Arc<R>,
        authenticator: Option<Authenticator>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            conn,
            registry,
            authenticator,
            config,
        }
    }

    /// Runs the connection from banner to close.
    ///
    /// Returns `Ok(())` when the client disconnects or `cancel` fires.
    /// The connection is closed on return.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ServerError> {
        let conn_id = self.conn.id();
        tracing::debug!(%conn_id, peer = ?self.conn.peer_addr(), "handling new connection");

        let result = self.serve(&cancel).await;
        self.conn.close();
        if let Err(e) = &result {
            tracing::info!(%conn_id, error = %e, "connection ended with error");
        }
        result
    }

    async fn serve(&mut self, cancel: &CancellationToken) -> Result<(), ServerError> {
        let conn_id = self.conn.id();
        let preamble = self.registry.client_preamble().await;

        // --- Step 1: banner and challenge ---
        self.send(&Payload::Protocol(PROTOCOL_VERSION)).await?;
        for line in &preamble.pre_auth {
            self.send_raw(line).await?;
        }
        let nonce = match self.authenticator.as_mut() {
            Some(auth) => {
                auth.reset();
                Some(auth.generate_challenge()?)
            }
            None => None,
        };
        self.send(&Payload::Challenge(Challenge {
            protocol: PROTOCOL_VERSION,
            challenge: nonce,
            server_version: self.config.server_version.clone(),
        }))
        .await?;

        // --- Step 2: login ---
        let login = if self.authenticator.is_some() {
            let reply = match tokio::time::timeout(
                self.config.login_timeout(),
                self.await_auth(cancel),
            )
            .await
            {
                Ok(Ok(Some(reply))) => reply,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::info!(%conn_id, "login timed out");
                    return Err(SessionError::LoginTimeout.into());
                }
            };
            match self.check_auth(reply).await? {
                Some(login) => login,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.config.denied_flush_delay()) => {}
                    }
                    return Err(SessionError::AccessDenied(LOGIN_INCORRECT.into()).into());
                }
            }
        } else {
            Login {
                username: String::new(),
                client_name: String::new(),
                gm: false,
            }
        };

        // --- Step 3: the rest of the login sequence ---
        for line in &preamble.post_auth {
            self.send_raw(line).await?;
        }
        self.send(&Payload::Ready(Ready {})).await?;
        for line in &preamble.post_ready {
            self.send_raw(line).await?;
        }

        let peer = Peer::new(
            conn_id,
            self.conn.peer_addr(),
            self.conn.outbound(),
            login.username,
            login.client_name,
            login.gm,
        );
        tracing::info!(%conn_id, user = peer.username(), gm = peer.is_gm(), "client ready");

        if preamble.sync_data {
            self.registry.send_game_state(&peer).await;
        }

        // --- Step 4: register and serve ---
        self.registry.add_client(peer.clone()).await;
        let _registration = Registration {
            registry: Arc::clone(&self.registry),
            peer: peer.clone(),
        };

        self.dispatch_loop(&peer, cancel).await
    }

    /// Reads until `AUTH` arrives. `Ok(None)` means cancelled.
    async fn await_auth(&mut self, cancel: &CancellationToken) -> Result<Option<Auth>, ServerError> {
        loop {
            let Some(envelope) = self.next_message(cancel).await? else {
                return Ok(None);
            };
            match envelope.payload {
                Payload::Auth(auth) => return Ok(Some(auth)),
                other => {
                    tracing::debug!(
                        conn_id = %self.conn.id(),
                        command = %other.kind(),
                        "ignored before login"
                    );
                }
            }
        }
    }

    /// Validates an `AUTH` reply and sends `GRANTED` or `DENIED`.
    /// Returns `None` if denied.
    async fn check_auth(&mut self, reply: Auth) -> Result<Option<Login>, ServerError> {
        let conn_id = self.conn.id();
        let personal = self.registry.personal_credentials(&reply.user).await;
        let debug_auth = self.config.debug.auth;

        let Some(auth) = self.authenticator.as_mut() else {
            return Ok(None);
        };
        if let Some(secret) = personal {
            if debug_auth {
                tracing::debug!(target: "mapwire::auth", %conn_id, user = %reply.user, "using personal credentials");
            }
            auth.set_secret(secret);
        }
        auth.set_username(reply.user.as_str());
        auth.set_client_name(reply.client.as_str());

        let granted = auth.validate_response(&reply.response).unwrap_or_else(|e| {
            tracing::warn!(%conn_id, user = %reply.user, error = %e, "could not validate response");
            false
        });
        let gm = granted && auth.gm_mode();

        if !granted {
            tracing::info!(%conn_id, user = %reply.user, "access denied");
            self.send(&Payload::Denied(Denied {
                reason: LOGIN_INCORRECT.into(),
            }))
            .await?;
            return Ok(None);
        }

        let username = if gm { GM_USERNAME.to_string() } else { reply.user };
        tracing::info!(%conn_id, user = %username, client = %reply.client, gm, "access granted");
        self.send(&Payload::Granted(Granted {
            user: username.clone(),
        }))
        .await?;
        Ok(Some(Login {
            username,
            client_name: reply.client,
            gm,
        }))
    }

    // -----------------------------------------------------------------------
    // Steady state
    // -----------------------------------------------------------------------

    async fn dispatch_loop(&mut self, peer: &Peer, cancel: &CancellationToken) -> Result<(), ServerError> {
        let mut ping = self.config.ping_interval().map(|every| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = next_tick(&mut ping) => {
                    self.send_housekeeping(peer, &Payload::Marco(Marco {}))?;
                    continue;
                }
                next = self.next_message(cancel) => match next? {
                    Some(envelope) => envelope,
                    None => return Ok(()),
                },
            };
            self.handle(envelope, peer).await?;
        }
    }

    async fn handle(&self, envelope: Envelope, peer: &Peer) -> Result<(), ServerError> {
        let received = unix_millis();
        let kind = envelope.kind();
        let Envelope { raw, payload } = envelope;

        match payload {
            Payload::Accept(accept) => {
                let unknown = peer.set_filter(&accept.messages);
                if !unknown.is_empty() {
                    tracing::debug!(conn_id = %peer.id(), ?unknown, "ACCEPT named unknown commands");
                }
            }
            Payload::Allow(allow) => peer.set_features(allow.features),
            Payload::Polo(_) => peer.touch(),
            Payload::Marco(_) => self.send_housekeeping(peer, &Payload::Polo(Polo {}))?,
            Payload::Echo(echo) => {
                let reply = Echo {
                    received_time: Some(received),
                    sent_time: Some(unix_millis()),
                    ..echo
                };
                self.send_housekeeping(peer, &Payload::Echo(reply))?;
            }
            Payload::Auth(_) => self.refuse(peer, kind, "already logged in")?,
            _ if !kind.origin().client_may_send() => {
                self.refuse(peer, kind, "clients may not send this command")?;
            }
            payload => {
                if self.config.debug.messages {
                    tracing::debug!(target: "mapwire::messages", conn_id = %peer.id(), command = %kind, "to registry");
                }
                self.registry
                    .handle_message(Envelope { raw, payload }, peer)
                    .await;
            }
        }
        Ok(())
    }

    /// Answers an illegal command with `PRIV`.
    fn refuse(&self, peer: &Peer, kind: MessageKind, reason: &str) -> Result<(), ServerError> {
        tracing::warn!(conn_id = %peer.id(), user = peer.username(), command = %kind, reason, "refused command");
        self.send_housekeeping(
            peer,
            &Payload::Priv(Priv {
                command: kind.to_string(),
                reason: reason.to_string(),
            }),
        )
    }

    /// Sends a housekeeping message. A full queue is logged, not fatal.
    fn send_housekeeping(&self, peer: &Peer, payload: &Payload) -> Result<(), ServerError> {
        match peer.send(payload) {
            Err(ServerError::Transport(TransportError::QueueFull { depth })) => {
                tracing::warn!(conn_id = %peer.id(), depth, command = %payload.kind(), "outbound queue full, dropped");
                Ok(())
            }
            other => other,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Next decoded message. `Ok(None)` means cancelled or the client hung up.
    async fn next_message(&mut self, cancel: &CancellationToken) -> Result<Option<Envelope>, ServerError> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            next = self.conn.recv() => next,
        };
        match next {
            Some(Ok(line)) => {
                if self.config.debug.io {
                    tracing::debug!(target: "mapwire::io", conn_id = %self.conn.id(), %line, "recv");
                }
                Ok(Some(decode_line(&line)))
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                tracing::info!(conn_id = %self.conn.id(), "connection closed");
                Ok(None)
            }
        }
    }

    /// Login output waits for queue room instead of failing on a full
    /// queue, so long preambles go out intact.
    async fn send(&self, payload: &Payload) -> Result<(), ServerError> {
        let line = encode_line(payload)?;
        self.send_raw(&line).await
    }

    async fn send_raw(&self, line: &str) -> Result<(), ServerError> {
        if self.config.debug.io {
            tracing::debug!(target: "mapwire::io", conn_id = %self.conn.id(), %line, "send");
        }
        self.conn.send_line_wait(line).await?;
        Ok(())
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
