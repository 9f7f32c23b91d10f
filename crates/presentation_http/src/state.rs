//! Application state shared across handlers

use infrastructure::Telemetry;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Tracer, request instruments and propagator for this service
    pub telemetry: Telemetry,
}

impl AppState {
    pub const fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}
