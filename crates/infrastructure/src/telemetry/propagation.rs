//! W3C trace context and baggage propagation over HTTP headers
//!
//! Provides the composite propagator used by the server and carrier adapters
//! for `http::HeaderMap`, so context can be continued from inbound requests
//! and forwarded on outbound ones.

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::{
    Context,
    propagation::{Extractor, Injector, TextMapCompositePropagator, TextMapPropagator},
    trace::TraceContextExt,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use tracing::debug;

/// Header carrying the W3C trace context
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header carrying W3C baggage entries
pub const BAGGAGE_HEADER: &str = "baggage";

/// Trace context followed by baggage, the W3C default pair
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Read-only carrier over request headers
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Write carrier over outbound headers
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
            debug!(key, "Skipping propagation header with invalid name");
            return;
        };
        let Ok(value) = HeaderValue::from_str(&value) else {
            debug!(key, "Skipping propagation header with invalid value");
            return;
        };
        self.0.insert(name, value);
    }
}

/// Decode the request-scoped context from inbound headers
///
/// A missing or malformed `traceparent` yields a context without a remote
/// parent, so the next span started in it becomes a new root. Baggage is
/// decoded independently of the trace context.
pub fn extract_context(propagator: &dyn TextMapPropagator, headers: &HeaderMap) -> Context {
    let cx = propagator.extract(&HeaderExtractor(headers));

    if let Some(traceparent) = headers.get(TRACEPARENT_HEADER)
        && !cx.span().span_context().is_valid()
    {
        debug!(
            traceparent = ?traceparent,
            "Ignoring malformed trace context header, starting a new root trace"
        );
    }

    cx
}

/// Encode a context into outbound headers
pub fn inject_context(propagator: &dyn TextMapPropagator, cx: &Context, headers: &mut HeaderMap) {
    propagator.inject_context(cx, &mut HeaderInjector(headers));
}
