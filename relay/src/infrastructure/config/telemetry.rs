//! Telemetry configuration.

use serde::Deserialize;

pub(super) const DEFAULT_SERVICE_NAME: &str = "codex-relay";
pub(super) const DEFAULT_LOG_LEVEL: &str = "info";

/// Telemetry configuration settings.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Service name attached to log output.
    pub service_name: String,
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
