//! HTTP middleware components
//!
//! Request instrumentation: the server layer opens a span and records metrics
//! for every request, the route layer labels both with the matched pattern.

pub mod request_telemetry;
pub mod route_tag;
pub mod server_telemetry;

pub use request_telemetry::{Labeler, RequestTelemetry, UNMATCHED_ROUTE};
pub use route_tag::{RouteTagLayer, RouteTagService, instrumented_route};
pub use server_telemetry::{ServerTelemetryLayer, ServerTelemetryService};
