//! `MapwireServer` builder and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use mapwire_transport::{Connection, TcpTransport, Transport};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{Registry, ServerConfig, ServerError, ServerSession};

/// Builder for configuring and starting a Mapwire server.
///
/// # Example
///
/// ```rust,ignore
/// let server = MapwireServerBuilder::new()
///     .bind("0.0.0.0:2323")
///     .config(config)
///     .build(registry)
///     .await?;
/// server.run(CancellationToken::new()).await
/// ```
pub struct MapwireServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl MapwireServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:2323".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener. Connections are not accepted until
    /// [`MapwireServer::run`].
    pub async fn build<R: Registry>(self, registry: R) -> Result<MapwireServer<R>, ServerError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        if self.config.player_secret.is_none() {
            tracing::warn!("no player secret configured, authentication is off");
        }
        Ok(MapwireServer {
            transport,
            registry: Arc::new(registry),
            config: Arc::new(self.config),
        })
    }
}

impl Default for MapwireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Mapwire server. Built with [`MapwireServerBuilder`].
pub struct MapwireServer<R: Registry> {
    transport: TcpTransport,
    registry: Arc<R>,
    config: Arc<ServerConfig>,
}

impl<R: Registry> MapwireServer<R> {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry every session reports to.
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Accepts connections until `cancel` fires, spawning a
    /// [`ServerSession`] for each one.
    ///
    /// On cancel, stops listening and waits for running sessions to wind
    /// down. Accept errors are logged and the loop keeps going.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ServerError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "mapwire server running");
        let sessions = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let token = cancel.child_token();
                    let conn = Connection::open(stream, Some(addr), &self.config.connection, &token);
                    let session = ServerSession::new(
                        conn,
                        Arc::clone(&self.registry),
                        self.config.authenticator(),
                        Arc::clone(&self.config),
                    );
                    sessions.spawn(async move {
                        // Errors are logged inside the session.
                        let _ = session.run(token).await;
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.transport.shutdown().await?;
        sessions.close();
        sessions.wait().await;
        tracing::info!("mapwire server stopped");
        Ok(())
    }
}
