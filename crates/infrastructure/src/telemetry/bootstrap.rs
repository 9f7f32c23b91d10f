//! OpenTelemetry pipeline bootstrap
//!
//! Builds the resource, propagator, tracer provider and meter provider, and
//! returns an explicit [`Telemetry`] context for request instrumentation
//! together with the [`ShutdownHandle`] that tears the pipeline down.

use std::{fmt, sync::Arc};

use http::HeaderMap;
use opentelemetry::{
    Context, global,
    metrics::MeterProvider as _,
    propagation::TextMapCompositePropagator,
    trace::TracerProvider as _,
};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider, exporter::PushMetricExporter},
    trace::{
        BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider,
        SpanExporter,
    },
};
use tracing::info;

use super::{
    config::TelemetryConfig,
    error::{BootstrapError, TelemetryError},
    exporters::TelemetryExporters,
    metrics::{HttpMetrics, RequestMetrics},
    propagation::{composite_propagator, extract_context},
    resource::ResourceIdentity,
    shutdown::{ShutdownHandle, ShutdownRegistry},
};

/// Instrumentation scope for the tracer and meter created by the bootstrap
pub const INSTRUMENTATION_SCOPE: &str = "dice-service";

/// Telemetry context shared by every request
///
/// Cheap to clone. Carries the tracer, request instruments and propagator
/// explicitly so instrumentation never depends on process globals.
#[derive(Clone)]
pub struct Telemetry {
    tracer: SdkTracer,
    metrics: Arc<dyn RequestMetrics>,
    propagator: Arc<TextMapCompositePropagator>,
    identity: Arc<ResourceIdentity>,
}

impl Telemetry {
    /// Assemble a context from an existing tracer and metrics sink
    pub fn new(tracer: SdkTracer, metrics: Arc<dyn RequestMetrics>) -> Self {
        Self {
            tracer,
            metrics,
            propagator: Arc::new(composite_propagator()),
            identity: Arc::new(ResourceIdentity::from_config(&TelemetryConfig::default())),
        }
    }

    /// Replace the service identity reported by this context
    #[must_use]
    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    pub fn metrics(&self) -> &dyn RequestMetrics {
        self.metrics.as_ref()
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Decode trace context and baggage from inbound headers
    pub fn extract_context(&self, headers: &HeaderMap) -> Context {
        extract_context(self.propagator.as_ref(), headers)
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service", &self.identity.service_name())
            .field("version", &self.identity.service_version())
            .finish_non_exhaustive()
    }
}

/// Initialize tracing and metrics export
///
/// On success returns the request telemetry context and the handle that must
/// be shut down before exit. On failure the returned [`BootstrapError`]
/// carries a handle for whatever providers were built before the failure.
///
/// # Example
///
/// ```ignore
/// use infrastructure::telemetry::{StdoutExporters, TelemetryConfig, init_telemetry};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (telemetry, shutdown) = match init_telemetry(&TelemetryConfig::default(), &StdoutExporters) {
///         Ok(pipeline) => pipeline,
///         Err(e) => {
///             let (source, shutdown) = e.into_parts();
///             let _ = shutdown.shutdown().await;
///             return Err(source.into());
///         },
///     };
///
///     // Serve requests with `telemetry`...
///
///     shutdown.shutdown().await?;
///     Ok(())
/// }
/// ```
pub fn init_telemetry<E: TelemetryExporters>(
    config: &TelemetryConfig,
    exporters: &E,
) -> Result<(Telemetry, ShutdownHandle), BootstrapError> {
    let mut registry = ShutdownRegistry::new(config.shutdown_timeout());

    if let Err(e) = config.validate() {
        return Err(BootstrapError::new(e, registry.into_handle()));
    }

    let identity = ResourceIdentity::from_config(config);
    let resource = identity.to_resource();

    // ----- Tracing -----
    let span_exporter = match exporters.span_exporter(config) {
        Ok(exporter) => exporter,
        Err(e) => return Err(BootstrapError::new(e, registry.into_handle())),
    };
    let tracer_provider = build_tracer_provider(config, resource.clone(), span_exporter);
    registry.register(tracer_provider.clone());

    // ----- Metrics -----
    let metric_exporter = match exporters.metric_exporter(config) {
        Ok(exporter) => exporter,
        Err(e) => return Err(BootstrapError::new(e, registry.into_handle())),
    };
    let meter_provider = build_meter_provider(config, resource, metric_exporter);
    registry.register(meter_provider.clone());

    if config.install_global {
        global::set_text_map_propagator(composite_propagator());
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
    }

    let tracer = tracer_provider.tracer(INSTRUMENTATION_SCOPE);
    let metrics = HttpMetrics::new(&meter_provider.meter(INSTRUMENTATION_SCOPE));

    info!(
        service = %identity.service_name(),
        version = %identity.service_version(),
        sampling = %config.sampling_ratio,
        batch_interval = ?config.trace_batch_interval(),
        metric_interval = ?config.metric_interval(),
        global = config.install_global,
        "Telemetry initialized"
    );

    let telemetry = Telemetry {
        tracer,
        metrics: Arc::new(metrics),
        propagator: Arc::new(composite_propagator()),
        identity: Arc::new(identity),
    };

    Ok((telemetry, registry.into_handle()))
}

/// Sampler for new root traces; remote parents keep their own decision
fn sampler(ratio: f64) -> Sampler {
    let root = if (ratio - 1.0).abs() < f64::EPSILON {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    };
    Sampler::ParentBased(Box::new(root))
}

fn build_tracer_provider<S>(
    config: &TelemetryConfig,
    resource: Resource,
    exporter: S,
) -> SdkTracerProvider
where
    S: SpanExporter + 'static,
{
    let batch_config = BatchConfigBuilder::default()
        .with_scheduled_delay(config.trace_batch_interval())
        .with_max_export_batch_size(config.max_export_batch_size)
        .build();

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler(config.sampling_ratio))
        .with_span_processor(processor)
        .build()
}

fn build_meter_provider<M>(
    config: &TelemetryConfig,
    resource: Resource,
    exporter: M,
) -> SdkMeterProvider
where
    M: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metric_interval())
        .build();

    SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build()
}
