//! HTTP server instruments

use std::{fmt, time::Duration};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
};

/// Sink for per-request measurements
///
/// The server middleware calls `request_started` once when a request enters
/// and `request_finished` once when it leaves, so every request contributes
/// exactly one count and one duration measurement.
pub trait RequestMetrics: Send + Sync + fmt::Debug {
    /// A request entered the server
    fn request_started(&self);

    /// A request completed, tagged with its route label and outcome
    fn request_finished(&self, attributes: &[KeyValue], elapsed: Duration);
}

/// Request count, duration and in-flight instruments
pub struct HttpMetrics {
    request_count: Counter<u64>,
    request_duration: Histogram<f64>,
    active_requests: UpDownCounter<i64>,
}

impl HttpMetrics {
    /// Create the instruments on the given meter
    pub fn new(meter: &Meter) -> Self {
        let request_count = meter
            .u64_counter("http.server.request.count")
            .with_description("Total number of HTTP requests")
            .build();

        let request_duration = meter
            .f64_histogram("http.server.request.duration")
            .with_description("Duration of HTTP server requests")
            .with_unit("s")
            .build();

        let active_requests = meter
            .i64_up_down_counter("http.server.active_requests")
            .with_description("Number of in-flight HTTP requests")
            .build();

        Self {
            request_count,
            request_duration,
            active_requests,
        }
    }
}

impl fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMetrics").finish_non_exhaustive()
    }
}

impl RequestMetrics for HttpMetrics {
    fn request_started(&self) {
        self.active_requests.add(1, &[]);
    }

    fn request_finished(&self, attributes: &[KeyValue], elapsed: Duration) {
        self.request_count.add(1, attributes);
        self.request_duration.record(elapsed.as_secs_f64(), attributes);
        self.active_requests.add(-1, &[]);
    }
}
