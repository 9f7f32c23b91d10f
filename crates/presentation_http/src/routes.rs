//! Route definitions

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    handlers,
    middleware::{ServerTelemetryLayer, instrumented_route},
    state::AppState,
};

/// Fixed-path roll endpoint
pub const ROLL_DICE_ROUTE: &str = "/rolldice";

/// Parameterized roll endpoint
pub const ROLL_DICE_PLAYER_ROUTE: &str = "/rolldice/{player}";

/// Create the main router with all routes
///
/// Every route is tagged with its pattern; the server telemetry layer wraps
/// the routes and the fallback alike.
pub fn create_router(state: AppState) -> Router {
    let router = Router::new();
    let router = instrumented_route(router, ROLL_DICE_ROUTE, get(handlers::rolldice::roll_dice));
    let router = instrumented_route(
        router,
        ROLL_DICE_PLAYER_ROUTE,
        get(handlers::rolldice::roll_dice_for_player),
    );

    router
        .fallback(handlers::fallback::not_found)
        .layer(ServerTelemetryLayer::new(state.telemetry.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
