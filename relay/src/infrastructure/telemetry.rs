use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::infrastructure::config::TelemetrySettings;

/// Builder for setting up telemetry (logging and metrics).
pub struct TelemetryBuilder {
    service_name: String,
    service_version: String,
    enable_metrics: bool,
    json: bool,
    log_level: String,
}

/// Handles produced by [`TelemetryBuilder::init`].
pub struct Telemetry {
    /// Prometheus render handle, when metrics were enabled.
    pub metrics: Option<PrometheusHandle>,
}

impl TelemetryBuilder {
    /// Starts a builder for the named service.
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            enable_metrics: false,
            json: false,
            log_level: "info".to_string(),
        }
    }

    /// Starts a builder from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &TelemetrySettings, service_version: &str) -> Self {
        Self::new(settings.service_name.clone(), service_version)
            .with_log_level(settings.log_level.clone())
            .with_json(settings.json)
    }

    /// Installs a Prometheus recorder during [`init`](Self::init).
    #[must_use]
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Sets the filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Selects JSON output instead of human-readable lines.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Initializes the global subscriber and, if requested, the metrics recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A global tracing subscriber is already installed
    /// - The Prometheus recorder cannot be installed
    pub fn init(self) -> Result<Telemetry> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        let fmt_layer = if self.json {
            fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer().with_target(true).boxed()
        };

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to init subscriber")?;

        let metrics = if self.enable_metrics {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;
            Some(handle)
        } else {
            None
        };

        tracing::info!(
            service = %self.service_name,
            version = %self.service_version,
            metrics = self.enable_metrics,
            "Telemetry initialized"
        );
        Ok(Telemetry { metrics })
    }
}
