//! Configuration management for the relay.
//!
//! Built-in defaults are layered under environment variables prefixed with
//! `CODEX` and separated by `__`, e.g. `CODEX__SERVER__PORT=9000`.
//!
//! # Example
//!
//! ```
//! use codex_relay::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! assert!(settings.client.uri.starts_with("ws://"));
//! ```

pub mod client;
pub mod server;
pub mod telemetry;

pub use client::ClientSettings;
pub use server::ServerSettings;
pub use telemetry::TelemetrySettings;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Top-level configuration for both apps.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Broadcast server settings (DM side).
    pub server: ServerSettings,
    /// Broadcast client settings (Player side).
    pub client: ClientSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Creates a new settings instance from environment variables and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix("CODEX").separator("__"))
    }

    /// Builds settings from defaults overlaid with `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .set_default("server.host", server::DEFAULT_HOST)?
            .set_default("server.port", i64::from(server::DEFAULT_PORT))?
            .set_default(
                "server.ping_interval_secs",
                i64::from(server::DEFAULT_PING_INTERVAL_SECS),
            )?
            .set_default(
                "server.outbox_capacity",
                i64::from(server::DEFAULT_OUTBOX_CAPACITY),
            )?
            .set_default("client.uri", client::DEFAULT_URI)?
            .set_default("client.token", client::DEFAULT_TOKEN)?
            .set_default("telemetry.service_name", telemetry::DEFAULT_SERVICE_NAME)?
            .set_default("telemetry.log_level", telemetry::DEFAULT_LOG_LEVEL)?
            .set_default("telemetry.json", false)?
            .add_source(source)
            .build()?;

        s.try_deserialize()
    }
}
