//! Telemetry pipeline
//!
//! Builds the OpenTelemetry tracer and meter providers for the service,
//! exposes the request-scoped [`Telemetry`] context, and owns the
//! [`ShutdownHandle`] that flushes everything on exit.

mod bootstrap;
mod config;
mod error;
mod exporters;
mod logging;
mod metrics;
mod propagation;
mod resource;
mod shutdown;

pub use bootstrap::{INSTRUMENTATION_SCOPE, Telemetry, init_telemetry};
pub use config::{LogFormat, MetricTemporality, TelemetryConfig};
pub use error::{BootstrapError, ShutdownError, TelemetryError};
pub use exporters::{StdoutExporters, TelemetryExporters};
pub use logging::init_logging;
pub use metrics::{HttpMetrics, RequestMetrics};
pub use propagation::{
    BAGGAGE_HEADER, HeaderExtractor, HeaderInjector, TRACEPARENT_HEADER, composite_propagator,
    extract_context, inject_context,
};
pub use resource::{DEPLOYMENT_ENVIRONMENT_NAME, ResourceIdentity};
pub use shutdown::{ProviderShutdown, ShutdownHandle, ShutdownRegistry};
