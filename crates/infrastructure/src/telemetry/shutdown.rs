//! Ordered teardown of telemetry providers
//!
//! The bootstrap registers one entry per provider it builds. The resulting
//! [`ShutdownHandle`] flushes and closes every entry exactly once, in
//! registration order, inside one shared time budget.

use std::{fmt, time::Duration};

use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::SdkTracerProvider};
use tokio::{
    sync::oneshot,
    time::{Instant, timeout},
};
use tracing::{debug, error, info, warn};

use super::error::{ShutdownError, TelemetryError};

/// A provider that can be flushed and closed
pub trait ProviderShutdown: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Flush pending data and release the provider within `timeout`.
    /// May block on export I/O.
    fn close(&self, timeout: Duration) -> Result<(), TelemetryError>;
}

impl ProviderShutdown for SdkTracerProvider {
    fn name(&self) -> &'static str {
        "tracer_provider"
    }

    fn close(&self, timeout: Duration) -> Result<(), TelemetryError> {
        self.shutdown_with_timeout(timeout)
            .map_err(|e| TelemetryError::from_sdk(ProviderShutdown::name(self), e))
    }
}

impl ProviderShutdown for SdkMeterProvider {
    fn name(&self) -> &'static str {
        "meter_provider"
    }

    fn close(&self, timeout: Duration) -> Result<(), TelemetryError> {
        self.shutdown_with_timeout(timeout)
            .map_err(|e| TelemetryError::from_sdk(ProviderShutdown::name(self), e))
    }
}

/// Shutdown entries collected while the pipeline is being built
pub struct ShutdownRegistry {
    entries: Vec<Box<dyn ProviderShutdown>>,
    timeout: Duration,
}

impl ShutdownRegistry {
    /// Create an empty registry whose handle will use the given total budget
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            timeout,
        }
    }

    /// Append a provider; it will be closed after everything registered before it
    pub fn register(&mut self, provider: impl ProviderShutdown + 'static) {
        debug!(provider = provider.name(), "Registered telemetry provider for shutdown");
        self.entries.push(Box::new(provider));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the registry into the handle returned to the caller
    pub fn into_handle(self) -> ShutdownHandle {
        ShutdownHandle {
            entries: self.entries,
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("providers", &self.entries.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Owned release handle for the telemetry pipeline
///
/// Must be consumed with [`ShutdownHandle::shutdown`] before the process
/// exits. Dropping it instead closes the providers synchronously and logs a
/// warning.
#[must_use = "telemetry is only flushed when `shutdown` is awaited"]
pub struct ShutdownHandle {
    entries: Vec<Box<dyn ProviderShutdown>>,
    timeout: Duration,
}

impl ShutdownHandle {
    /// Names of the providers that will be closed, in order
    pub fn providers(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name()).collect()
    }

    /// Total time budget shared by all providers
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Flush and close every registered provider
    ///
    /// Each provider is closed on its own detached thread and handed the
    /// remaining budget. A provider that fails or runs past that budget is
    /// recorded and the next one is still closed; an overrunning close is
    /// abandoned so it cannot hold up runtime teardown. All failures are
    /// returned together.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        let entries = std::mem::take(&mut self.entries);
        let budget = self.timeout;
        let deadline = Instant::now() + budget;
        let count = entries.len();
        let mut failures = Vec::new();

        for entry in entries {
            let provider = entry.name();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (tx, rx) = oneshot::channel();
            let spawned = std::thread::Builder::new()
                .name(format!("telemetry-shutdown-{provider}"))
                .spawn(move || {
                    let _ = tx.send(entry.close(remaining));
                });
            if let Err(e) = spawned {
                failures.push(TelemetryError::Shutdown {
                    provider,
                    message: e.to_string(),
                });
                continue;
            }

            match timeout(remaining, rx).await {
                Ok(Ok(Ok(()))) => debug!(provider, "Telemetry provider shut down"),
                Ok(Ok(Err(e))) => failures.push(e),
                Ok(Err(_)) => failures.push(TelemetryError::Shutdown {
                    provider,
                    message: "shutdown thread exited without a result".to_string(),
                }),
                Err(_) => {
                    warn!(provider, timeout = ?budget, "Abandoning telemetry provider shutdown");
                    failures.push(TelemetryError::ShutdownTimeout {
                        provider,
                        timeout: budget,
                    });
                },
            }
        }

        if failures.is_empty() {
            info!(providers = count, "Telemetry shut down");
            Ok(())
        } else {
            let err = ShutdownError::new(failures);
            error!(error = %err, "Telemetry shutdown encountered errors");
            Err(err)
        }
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("providers", &self.providers())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        warn!(
            providers = ?self.providers(),
            "Telemetry shutdown handle dropped without calling shutdown, closing providers now"
        );
        for entry in self.entries.drain(..) {
            if let Err(e) = entry.close(self.timeout) {
                error!(provider = entry.name(), error = %e, "Failed to close telemetry provider");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Clone)]
    struct CountingProvider {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Duration,
    }

    impl CountingProvider {
        fn ok(name: &'static str, calls: &Arc<AtomicUsize>) -> Self {
            Self {
                name,
                calls: Arc::clone(calls),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing(name: &'static str, calls: &Arc<AtomicUsize>) -> Self {
            Self {
                fail: true,
                ..Self::ok(name, calls)
            }
        }

        fn slow(name: &'static str, calls: &Arc<AtomicUsize>, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok(name, calls)
            }
        }
    }

    impl ProviderShutdown for CountingProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn close(&self, _timeout: Duration) -> Result<(), TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                Err(TelemetryError::Shutdown {
                    provider: self.name,
                    message: "exporter unreachable".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_empty_handle_is_noop() {
        let handle = ShutdownRegistry::new(Duration::from_secs(1)).into_handle();
        assert!(handle.providers().is_empty());
        assert!(handle.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_every_provider_closed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ShutdownRegistry::new(Duration::from_secs(5));
        registry.register(CountingProvider::ok("first", &calls));
        registry.register(CountingProvider::ok("second", &calls));
        assert_eq!(registry.len(), 2);

        let handle = registry.into_handle();
        assert_eq!(handle.providers(), vec!["first", "second"]);
        assert!(handle.shutdown().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_later_providers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ShutdownRegistry::new(Duration::from_secs(5));
        registry.register(CountingProvider::ok("tracer", &calls));
        registry.register(CountingProvider::failing("meter", &calls));
        registry.register(CountingProvider::ok("logger", &calls));

        let err = registry.into_handle().shutdown().await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.failures().len(), 1);
        assert!(matches!(
            err.failures()[0],
            TelemetryError::Shutdown {
                provider: "meter",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ShutdownRegistry::new(Duration::from_secs(5));
        registry.register(CountingProvider::failing("a", &calls));
        registry.register(CountingProvider::failing("b", &calls));

        let err = registry.into_handle().shutdown().await.unwrap_err();
        assert_eq!(err.failures().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_provider_reports_timeout_instead_of_hanging() {
        let calls = Arc::new(AtomicUsize::new(0));
        let budget = Duration::from_millis(50);
        let mut registry = ShutdownRegistry::new(budget);
        registry.register(CountingProvider::slow("stuck", &calls, Duration::from_millis(500)));
        registry.register(CountingProvider::ok("after", &calls));

        let started = std::time::Instant::now();
        let err = registry.into_handle().shutdown().await.unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(
            err.failures()[0],
            TelemetryError::ShutdownTimeout {
                provider: "stuck",
                ..
            }
        ));
    }

    #[test]
    fn test_abandoned_close_does_not_hold_runtime_teardown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ShutdownRegistry::new(Duration::from_millis(50));
        registry.register(CountingProvider::slow("stuck", &calls, Duration::from_secs(3)));
        let handle = registry.into_handle();

        let started = std::time::Instant::now();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(handle.shutdown());
        drop(runtime);

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_shutdown_closes_providers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ShutdownRegistry::new(Duration::from_secs(1));
        registry.register(CountingProvider::ok("tracer", &calls));

        drop(registry.into_handle());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sdk_provider_second_close_reports_already_shutdown() {
        let provider = SdkTracerProvider::builder().build();
        let mut registry = ShutdownRegistry::new(Duration::from_secs(5));
        registry.register(provider.clone());

        assert!(provider.close(Duration::from_secs(1)).is_ok());

        let err = registry.into_handle().shutdown().await.unwrap_err();
        assert!(matches!(
            err.failures()[0],
            TelemetryError::AlreadyShutdown("tracer_provider")
        ));
    }
}
