//! Infrastructure layer - configuration and the OpenTelemetry pipeline
//!
//! Loads application settings and builds the tracer and meter providers the
//! HTTP layer instruments requests with.

pub mod config;
pub mod telemetry;

pub use config::{AppConfig, ServerConfig};
pub use telemetry::{
    BootstrapError, ShutdownError, ShutdownHandle, StdoutExporters, Telemetry, TelemetryConfig,
    TelemetryError, init_logging, init_telemetry,
};
