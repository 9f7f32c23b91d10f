//! Telemetry configuration
//!
//! Recognized options for the bootstrap: service identity, sampling, batch and
//! collection intervals, shutdown budget and log output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::TelemetryError;

/// Aggregation temporality requested from the metric exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricTemporality {
    /// Measurements accumulate from process start
    #[default]
    Cumulative,
    /// Measurements reset after each collection
    Delta,
}

impl From<MetricTemporality> for opentelemetry_sdk::metrics::Temporality {
    fn from(value: MetricTemporality) -> Self {
        match value {
            MetricTemporality::Cumulative => Self::Cumulative,
            MetricTemporality::Delta => Self::Delta,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Configuration for tracing, metrics and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to every signal
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Service version attached to every signal
    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// Deployment environment (e.g., "production")
    #[serde(default)]
    pub environment: Option<String>,

    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: Vec<(String, String)>,

    /// Sampling ratio (0.0 - 1.0) for new root traces
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,

    /// Delay between span batch exports in milliseconds
    #[serde(default = "default_trace_batch_interval")]
    pub trace_batch_interval_ms: u64,

    /// Maximum number of spans per export batch
    #[serde(default = "default_max_batch_size")]
    pub max_export_batch_size: usize,

    /// Interval between metric collections in seconds
    #[serde(default = "default_metric_interval")]
    pub metric_interval_secs: u64,

    /// Aggregation temporality for exported metrics
    #[serde(default)]
    pub metric_temporality: MetricTemporality,

    /// Total time budget for flushing and closing all providers
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Also register providers and propagator as OpenTelemetry globals
    ///
    /// Request instrumentation never reads the globals; this only matters for
    /// third-party libraries that emit through `opentelemetry::global`.
    #[serde(default = "default_install_global")]
    pub install_global: bool,

    /// Log level filter (e.g., "info", "dice_server=debug,tower_http=info")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_service_name() -> String {
    "dice-service".to_string()
}

fn default_service_version() -> String {
    "0.1.0".to_string()
}

const fn default_sampling_ratio() -> f64 {
    1.0
}

const fn default_trace_batch_interval() -> u64 {
    1_000
}

const fn default_max_batch_size() -> usize {
    512
}

const fn default_metric_interval() -> u64 {
    3
}

const fn default_shutdown_timeout() -> u64 {
    5
}

const fn default_install_global() -> bool {
    true
}

fn default_log_filter() -> String {
    "dice_server=info,presentation_http=info,infrastructure=info,tower_http=info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            environment: None,
            resource_attributes: Vec::new(),
            sampling_ratio: default_sampling_ratio(),
            trace_batch_interval_ms: default_trace_batch_interval(),
            max_export_batch_size: default_max_batch_size(),
            metric_interval_secs: default_metric_interval(),
            metric_temporality: MetricTemporality::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            install_global: default_install_global(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Create a configuration for the given service with all other defaults
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Set the service version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Set the deployment environment
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Add a resource attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.push((key.into(), value.into()));
        self
    }

    /// Enable or disable registration of the OpenTelemetry globals
    #[must_use]
    pub const fn with_global_install(mut self, install: bool) -> Self {
        self.install_global = install;
        self
    }

    /// Delay between span batch exports
    pub const fn trace_batch_interval(&self) -> Duration {
        Duration::from_millis(self.trace_batch_interval_ms)
    }

    /// Interval between metric collections
    pub const fn metric_interval(&self) -> Duration {
        Duration::from_secs(self.metric_interval_secs)
    }

    /// Total shutdown budget shared by all providers
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Check that the configuration can build a working pipeline
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Config(
                "service_name must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sampling_ratio) {
            return Err(TelemetryError::Config(format!(
                "sampling_ratio must be within 0.0..=1.0, got {}",
                self.sampling_ratio
            )));
        }
        if self.trace_batch_interval_ms == 0 {
            return Err(TelemetryError::Config(
                "trace_batch_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_export_batch_size == 0 {
            return Err(TelemetryError::Config(
                "max_export_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.metric_interval_secs == 0 {
            return Err(TelemetryError::Config(
                "metric_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(TelemetryError::Config(
                "shutdown_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
