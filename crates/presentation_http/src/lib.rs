//! Dice service HTTP presentation layer
//!
//! Routes, handlers and the request instrumentation middleware.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use middleware::{
    Labeler, RequestTelemetry, RouteTagLayer, ServerTelemetryLayer, UNMATCHED_ROUTE,
    instrumented_route,
};
pub use routes::create_router;
pub use state::AppState;
