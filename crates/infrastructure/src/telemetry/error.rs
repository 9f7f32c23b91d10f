//! Error types for telemetry setup and teardown

use std::{fmt, time::Duration};

use opentelemetry_sdk::error::OTelSdkError;

use super::shutdown::ShutdownHandle;

/// Error type for telemetry operations
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Configuration rejected before any provider was built
    #[error("Invalid telemetry configuration: {0}")]
    Config(String),

    /// Failed to create a span or metric exporter
    #[error("Failed to create {signal} exporter: {message}")]
    Exporter {
        /// Signal the exporter was meant for ("trace" or "metric")
        signal: &'static str,
        /// Underlying failure
        message: String,
    },

    /// Failed to install the tracing subscriber
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// A provider reported a failure while flushing or closing
    #[error("Failed to shut down {provider}: {message}")]
    Shutdown {
        /// Provider name as registered
        provider: &'static str,
        /// Underlying failure
        message: String,
    },

    /// A provider did not finish closing inside the shutdown budget
    #[error("Shutdown of {provider} did not complete within {timeout:?}")]
    ShutdownTimeout {
        /// Provider name as registered
        provider: &'static str,
        /// Budget that elapsed
        timeout: Duration,
    },

    /// A provider was already closed through another path
    #[error("{0} was already shut down")]
    AlreadyShutdown(&'static str),
}

impl TelemetryError {
    /// Map an SDK shutdown result error onto the provider that produced it
    pub(crate) fn from_sdk(provider: &'static str, error: OTelSdkError) -> Self {
        match error {
            OTelSdkError::AlreadyShutdown => Self::AlreadyShutdown(provider),
            OTelSdkError::Timeout(timeout) => Self::ShutdownTimeout { provider, timeout },
            other => Self::Shutdown {
                provider,
                message: other.to_string(),
            },
        }
    }
}

/// Bootstrap failure carrying the shutdown handle for whatever was built
///
/// Providers constructed before the failure are still registered in the
/// handle, so callers must run [`ShutdownHandle::shutdown`] before exiting.
pub struct BootstrapError {
    source: TelemetryError,
    shutdown: ShutdownHandle,
}

impl BootstrapError {
    pub(crate) const fn new(source: TelemetryError, shutdown: ShutdownHandle) -> Self {
        Self { source, shutdown }
    }

    /// The failure that stopped the bootstrap
    pub const fn error(&self) -> &TelemetryError {
        &self.source
    }

    /// Shutdown handle for the partially built pipeline
    pub const fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    /// Split into the failure and the partial shutdown handle
    pub fn into_parts(self) -> (TelemetryError, ShutdownHandle) {
        (self.source, self.shutdown)
    }
}

impl fmt::Debug for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapError")
            .field("source", &self.source)
            .field("registered", &self.shutdown.providers())
            .finish()
    }
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Telemetry bootstrap failed: {}", self.source)
    }
}

impl std::error::Error for BootstrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Aggregate of every provider failure seen during shutdown
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<TelemetryError>,
}

impl ShutdownError {
    pub(crate) const fn new(failures: Vec<TelemetryError>) -> Self {
        Self { failures }
    }

    /// Individual failures in registration order
    pub fn failures(&self) -> &[TelemetryError] {
        &self.failures
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} telemetry provider(s) failed to shut down", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}
