//! Per-request telemetry carried in request extensions
//!
//! The server layer inserts a [`RequestTelemetry`] before dispatch. Route
//! layers use it to tag the server span, and handlers use it to start child
//! spans under the request context.

use std::{borrow::Cow, sync::Arc};

use axum::{extract::FromRequestParts, http::Method, http::request::Parts};
use opentelemetry::{Context, KeyValue, trace::TraceContextExt};
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_semantic_conventions::attribute::HTTP_ROUTE;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Route label used when no registered pattern handled the request
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Route label collected during dispatch for the request's metric measurement
#[derive(Debug, Default)]
pub struct Labeler {
    route: Mutex<Option<String>>,
}

impl Labeler {
    pub fn set_route(&self, pattern: &str) {
        *self.route.lock() = Some(pattern.to_string());
    }

    /// Route pattern tagged by a route layer, if any
    pub fn route(&self) -> Option<String> {
        self.route.lock().clone()
    }
}

/// Request-scoped view of the telemetry pipeline
#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    cx: Context,
    tracer: SdkTracer,
    labeler: Arc<Labeler>,
}

impl RequestTelemetry {
    pub fn new(cx: Context, tracer: SdkTracer, labeler: Arc<Labeler>) -> Self {
        Self {
            cx,
            tracer,
            labeler,
        }
    }

    /// Context holding the server span; parent for handler spans
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    pub fn labeler(&self) -> &Labeler {
        &self.labeler
    }

    /// Mark the request as handled by `pattern`
    ///
    /// Sets `http.route` on the server span, renames it to `"{METHOD} {pattern}"`
    /// and labels the request's measurement with the pattern.
    pub fn tag_route(&self, method: &Method, pattern: &str) {
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(HTTP_ROUTE, pattern.to_string()));
        span.update_name(Cow::Owned(format!("{method} {pattern}")));
        self.labeler.set_route(pattern);
    }
}

impl<S> FromRequestParts<S> for RequestTelemetry
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("request telemetry layer is not installed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{TraceContextExt as _, Tracer as _, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    use super::*;

    #[test]
    fn labeler_starts_untagged() {
        let labeler = Labeler::default();
        assert!(labeler.route().is_none());
    }

    #[test]
    fn labeler_keeps_last_route() {
        let labeler = Labeler::default();
        labeler.set_route("/rolldice");
        labeler.set_route("/rolldice/{player}");

        assert_eq!(labeler.route().as_deref(), Some("/rolldice/{player}"));
    }

    #[test]
    fn tag_route_renames_span_and_sets_route() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");

        let span = tracer.start("GET");
        let cx = Context::new().with_span(span);
        let request = RequestTelemetry::new(cx.clone(), tracer, Arc::new(Labeler::default()));

        request.tag_route(&Method::GET, "/rolldice/{player}");
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /rolldice/{player}");
        assert!(
            spans[0]
                .attributes
                .contains(&KeyValue::new(HTTP_ROUTE, "/rolldice/{player}"))
        );
        assert_eq!(request.labeler().route().as_deref(), Some("/rolldice/{player}"));
    }
}
