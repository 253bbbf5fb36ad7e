//! Client configuration.

use std::time::Duration;

use mapwire_session::{Authenticator, DebugFlags};
use mapwire_transport::ConnectionConfig;
use serde::Deserialize;

/// Everything a [`ClientSession`](crate::ClientSession) needs to know
/// before it dials.
///
/// Loadable from JSON; the authenticator is not, since it holds a secret.
/// Set it with [`with_credentials`](Self::with_credentials).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the server.
    ///
    /// Default: `"localhost:2323"`.
    pub endpoint: String,

    /// Credentials for the login challenge. Without them the client can
    /// only talk to servers that don't require authentication.
    #[serde(skip)]
    pub authenticator: Option<Authenticator>,

    /// Program name and version sent in `AUTH`.
    pub client_name: String,

    /// Give up connecting after this many seconds, counted across all
    /// attempts. `None` waits forever.
    ///
    /// Default: `None`.
    pub connect_timeout_secs: Option<u64>,

    /// How many times to try dialing before giving up. 0 means no limit.
    ///
    /// Default: 0.
    pub retries: u32,

    /// Pause between connection attempts, and before reconnecting.
    ///
    /// Default: 1000 ms.
    pub retry_delay_ms: u64,

    /// Reconnect and log in again when an established connection drops.
    ///
    /// Default: `false`.
    pub stay_connected: bool,

    pub connection: ConnectionConfig,

    pub debug: DebugFlags,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:2323".to_string(),
            authenticator: None,
            client_name: concat!("mapwire-client/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            connect_timeout_secs: None,
            retries: 0,
            retry_delay_ms: 1000,
            stay_connected: false,
            connection: ConnectionConfig::default(),
            debug: DebugFlags::default(),
        }
    }
}

impl ClientConfig {
    /// A default config pointed at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the login credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl AsRef<[u8]>,
    ) -> Self {
        self.authenticator = Some(Authenticator::client(username, password));
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
