//! Server configuration.

use std::fmt;
use std::time::Duration;

use mapwire_session::{Authenticator, DebugFlags};
use mapwire_transport::ConnectionConfig;
use serde::Deserialize;

/// Settings shared by every connection a server accepts.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Password every player logs in with. `None` turns authentication
    /// off: the challenge goes out without a nonce and no `AUTH` is
    /// expected.
    pub player_secret: Option<String>,

    /// Password that logs the user in as GM.
    pub gm_secret: Option<String>,

    /// Reported to clients in `OK`.
    pub server_version: String,

    /// How long a client has to answer the challenge.
    ///
    /// Default: 60 seconds.
    pub login_timeout_secs: u64,

    /// Pause after sending `DENIED` so it reaches the client before the
    /// connection drops.
    ///
    /// Default: 500 ms.
    pub denied_flush_delay_ms: u64,

    /// Send `MARCO` this often once a client is logged in. `None` disables
    /// server pings.
    ///
    /// Default: `None`.
    pub ping_interval_secs: Option<u64>,

    pub connection: ConnectionConfig,

    pub debug: DebugFlags,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            player_secret: None,
            gm_secret: None,
            server_version: concat!("mapwire-server/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            login_timeout_secs: 60,
            denied_flush_delay_ms: 500,
            ping_interval_secs: None,
            connection: ConnectionConfig::default(),
            debug: DebugFlags::default(),
        }
    }
}

impl ServerConfig {
    /// A fresh authenticator for one login, or `None` if authentication
    /// is off.
    pub fn authenticator(&self) -> Option<Authenticator> {
        let player = self.player_secret.as_deref()?;
        Some(Authenticator::server(
            player,
            self.gm_secret.as_deref().map(str::as_bytes),
        ))
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn denied_flush_delay(&self) -> Duration {
        Duration::from_millis(self.denied_flush_delay_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("player_secret", &self.player_secret.as_ref().map(|_| "<redacted>"))
            .field("gm_secret", &self.gm_secret.as_ref().map(|_| "<redacted>"))
            .field("server_version", &self.server_version)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .field("denied_flush_delay_ms", &self.denied_flush_delay_ms)
            .field("ping_interval_secs", &self.ping_interval_secs)
            .field("connection", &self.connection)
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_player_secret_means_no_authenticator() {
        let config = ServerConfig {
            gm_secret: Some("gm".into()),
            ..ServerConfig::default()
        };
        assert!(config.authenticator().is_none());
    }

    #[test]
    fn test_authenticator_carries_secrets() {
        let config = ServerConfig {
            player_secret: Some("p".into()),
            ..ServerConfig::default()
        };
        assert!(config.authenticator().unwrap().has_secret());
    }

    #[test]
    fn test_config_from_json() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"player_secret":"p","ping_interval_secs":30,"connection":{"queue_depth":8}}"#,
        )
        .unwrap();
        assert_eq!(config.ping_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.connection.queue_depth, 8);
        assert_eq!(config.login_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ServerConfig {
            player_secret: Some("hunter2".into()),
            ..ServerConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
