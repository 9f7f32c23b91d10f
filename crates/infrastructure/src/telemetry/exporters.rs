//! Exporter construction seam
//!
//! The bootstrap asks a [`TelemetryExporters`] implementation for one span
//! exporter and one metric exporter. Stdout exporters are the default; any
//! wire-protocol exporter can be plugged in by implementing the trait.

use opentelemetry_sdk::{metrics::exporter::PushMetricExporter, trace::SpanExporter};

use super::{config::TelemetryConfig, error::TelemetryError};

/// Factory for the exporters behind the tracer and meter providers
pub trait TelemetryExporters {
    /// Span exporter wrapped by the batch span processor
    type Span: SpanExporter + 'static;

    /// Metric exporter driven by the periodic reader
    type Metric: PushMetricExporter;

    fn span_exporter(&self, config: &TelemetryConfig) -> Result<Self::Span, TelemetryError>;

    fn metric_exporter(&self, config: &TelemetryConfig) -> Result<Self::Metric, TelemetryError>;
}

/// Writes spans and metric snapshots to standard output
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutExporters;

impl TelemetryExporters for StdoutExporters {
    type Span = opentelemetry_stdout::SpanExporter;
    type Metric = opentelemetry_stdout::MetricExporter;

    fn span_exporter(&self, _config: &TelemetryConfig) -> Result<Self::Span, TelemetryError> {
        Ok(opentelemetry_stdout::SpanExporter::default())
    }

    fn metric_exporter(&self, config: &TelemetryConfig) -> Result<Self::Metric, TelemetryError> {
        Ok(opentelemetry_stdout::MetricExporter::builder()
            .with_temporality(config.metric_temporality.into())
            .build())
    }
}
