//! Server configuration for the broadcast layer.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

pub(super) const DEFAULT_HOST: &str = "localhost";
pub(super) const DEFAULT_PORT: u16 = 8765;
pub(super) const DEFAULT_PING_INTERVAL_SECS: u32 = 30;
pub(super) const DEFAULT_OUTBOX_CAPACITY: u32 = 256;

/// Server binding and connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on; `0` picks an ephemeral port.
    pub port: u16,
    /// Seconds between keep-alive pings.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Frames buffered per client before it is considered lagging.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// When set, only clients presenting this token stay connected.
    #[serde(default)]
    pub expected_token: Option<SecretString>,
}

fn default_ping_interval_secs() -> u64 {
    u64::from(DEFAULT_PING_INTERVAL_SECS)
}

fn default_outbox_capacity() -> usize {
    crate::ws::OUTBOX_CAPACITY
}

impl ServerSettings {
    /// Settings for `host:port` with every other field defaulted.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the `host:port` string used for binding and logging.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the keep-alive period, never shorter than one second.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ping_interval_secs: default_ping_interval_secs(),
            outbox_capacity: default_outbox_capacity(),
            expected_token: None,
        }
    }
}
