//! Server span and request metrics for every request
//!
//! Wraps the whole router, fallback included. Continues the caller's trace
//! from inbound headers, opens one server span, and records exactly one
//! request measurement labeled with the route the request was dispatched to.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    response::Response,
};
use infrastructure::Telemetry;
use opentelemetry::{
    Context as OtelContext, KeyValue,
    trace::{SpanKind, Status, TraceContextExt, Tracer},
};
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH, URL_SCHEME,
};
use tower::{Layer, Service};

use super::request_telemetry::{Labeler, RequestTelemetry, UNMATCHED_ROUTE};

/// Span status message for requests dropped before a response was produced
const CANCELLED: &str = "request cancelled";

/// Layer that instruments every request passing through the router
#[derive(Debug, Clone)]
pub struct ServerTelemetryLayer {
    telemetry: Telemetry,
}

impl ServerTelemetryLayer {
    #[must_use]
    pub const fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}

impl<S> Layer<S> for ServerTelemetryLayer {
    type Service = ServerTelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServerTelemetryService {
            inner,
            telemetry: self.telemetry.clone(),
        }
    }
}

/// Service that opens the server span and records request metrics
#[derive(Debug, Clone)]
pub struct ServerTelemetryService<S> {
    inner: S,
    telemetry: Telemetry,
}

impl<S> Service<Request<Body>> for ServerTelemetryService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let telemetry = self.telemetry.clone();
        let parent_cx = telemetry.extract_context(request.headers());

        let method = request.method().clone();
        let scheme = request.uri().scheme_str().unwrap_or("http").to_string();
        let span = telemetry
            .tracer()
            .span_builder(method.to_string())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD, method.to_string()),
                KeyValue::new(URL_PATH, request.uri().path().to_string()),
                KeyValue::new(URL_SCHEME, scheme),
            ])
            .start_with_context(telemetry.tracer(), &parent_cx);
        let cx = parent_cx.with_span(span);

        let labeler = Arc::new(Labeler::default());
        request.extensions_mut().insert(RequestTelemetry::new(
            cx.clone(),
            telemetry.tracer().clone(),
            Arc::clone(&labeler),
        ));

        telemetry.metrics().request_started();
        let in_flight = InFlight {
            telemetry,
            cx,
            labeler,
            method,
            started: Instant::now(),
            outcome: None,
        };

        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut in_flight = in_flight;
            let result = inner.call(request).await;
            in_flight.outcome = Some(match &result {
                Ok(response) => Outcome::Response(response.status()),
                Err(e) => Outcome::Failed(e.to_string()),
            });
            drop(in_flight);
            result
        })
    }
}

/// How a request ended, if it ended before the future was dropped
enum Outcome {
    Response(StatusCode),
    Failed(String),
}

/// Closes the server span and records the measurement when dropped
///
/// A request future dropped before completion (client disconnect, timeout,
/// drain deadline) still ends its span and still records its measurement.
struct InFlight {
    telemetry: Telemetry,
    cx: OtelContext,
    labeler: Arc<Labeler>,
    method: Method,
    started: Instant,
    outcome: Option<Outcome>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let span = self.cx.span();

        let mut attributes = Vec::with_capacity(3);
        match self.outcome.take() {
            Some(Outcome::Response(status)) => {
                let status_code =
                    KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));
                span.set_attribute(status_code.clone());
                attributes.push(status_code);
                if status.is_server_error() {
                    span.set_status(Status::error(status.to_string()));
                } else {
                    span.set_status(Status::Ok);
                }
            },
            Some(Outcome::Failed(message)) => span.set_status(Status::error(message)),
            None => span.set_status(Status::error(CANCELLED)),
        }

        let route = self.labeler.route().unwrap_or_else(|| {
            span.set_attribute(KeyValue::new(HTTP_ROUTE, UNMATCHED_ROUTE));
            UNMATCHED_ROUTE.to_string()
        });
        attributes.push(KeyValue::new(HTTP_ROUTE, route));
        attributes.push(KeyValue::new(HTTP_REQUEST_METHOD, self.method.to_string()));

        self.telemetry.metrics().request_finished(&attributes, elapsed);
        span.end();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use infrastructure::telemetry::RequestMetrics;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use parking_lot::Mutex;
    use tower::{ServiceExt, service_fn};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingMetrics {
        started: AtomicUsize,
        finished: Mutex<Vec<Vec<KeyValue>>>,
    }

    impl RequestMetrics for CountingMetrics {
        fn request_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn request_finished(&self, attributes: &[KeyValue], _elapsed: Duration) {
            self.finished.lock().push(attributes.to_vec());
        }
    }

    /// Spans stay readable only while the provider is alive
    struct Fixture {
        telemetry: Telemetry,
        spans: InMemorySpanExporter,
        metrics: Arc<CountingMetrics>,
        _provider: SdkTracerProvider,
    }

    impl Fixture {
        fn new() -> Self {
            let spans = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(spans.clone())
                .build();
            let metrics = Arc::new(CountingMetrics::default());
            let telemetry = Telemetry::new(provider.tracer("test"), metrics.clone());
            Self {
                telemetry,
                spans,
                metrics,
                _provider: provider,
            }
        }

        fn layer(&self) -> ServerTelemetryLayer {
            ServerTelemetryLayer::new(self.telemetry.clone())
        }
    }

    #[tokio::test]
    async fn server_error_marks_span_as_error() {
        let fixture = Fixture::new();
        let service = fixture.layer().layer(service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .body(Body::empty())
                    .unwrap(),
            )
        }));

        let response = service
            .oneshot(Request::builder().uri("/rolldice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let spans = fixture.spans.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert!(matches!(spans[0].status, Status::Error { .. }));
        assert_eq!(spans[0].span_kind, SpanKind::Server);
        assert!(spans[0].attributes.contains(&KeyValue::new(
            HTTP_RESPONSE_STATUS_CODE,
            i64::from(StatusCode::SERVICE_UNAVAILABLE.as_u16())
        )));
    }

    #[tokio::test]
    async fn inner_service_sees_request_telemetry() {
        let fixture = Fixture::new();
        let service = fixture.layer().layer(service_fn(|req: Request<Body>| async move {
            let present = req.extensions().get::<RequestTelemetry>().is_some();
            let status = if present {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Ok::<_, Infallible>(Response::builder().status(status).body(Body::empty()).unwrap())
        }));

        let response = service
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let spans = fixture.spans.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::Ok);
        assert_eq!(spans[0].name, "GET");
        assert!(
            spans[0]
                .attributes
                .contains(&KeyValue::new(HTTP_ROUTE, UNMATCHED_ROUTE))
        );
    }

    #[tokio::test]
    async fn dropped_request_still_ends_span_and_records_measurement() {
        let fixture = Fixture::new();
        let service = fixture.layer().layer(service_fn(|_req: Request<Body>| {
            std::future::pending::<Result<Response<Body>, Infallible>>()
        }));

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            service.oneshot(Request::builder().uri("/rolldice").body(Body::empty()).unwrap()),
        )
        .await;
        assert!(outcome.is_err(), "inner service never answers");

        assert_eq!(fixture.metrics.started.load(Ordering::SeqCst), 1);
        let finished = fixture.metrics.finished.lock().clone();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].contains(&KeyValue::new(HTTP_ROUTE, UNMATCHED_ROUTE)));
        assert!(
            !finished[0]
                .iter()
                .any(|kv| kv.key.as_str() == HTTP_RESPONSE_STATUS_CODE)
        );

        let spans = fixture.spans.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error(CANCELLED));
        assert!(
            spans[0]
                .attributes
                .contains(&KeyValue::new(HTTP_ROUTE, UNMATCHED_ROUTE))
        );
    }
}
