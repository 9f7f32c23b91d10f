//! Route pattern tagging
//!
//! Attached to a single route, so it only runs when the router dispatched the
//! request to that route. Labels the server span and request metrics with the
//! registered pattern rather than the concrete path.

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use axum::{Router, body::Body, extract::Request, routing::MethodRouter};
use tower::{Layer, Service};
use tracing::trace;

use super::request_telemetry::RequestTelemetry;

/// Layer that tags requests with a route pattern
#[derive(Debug, Clone)]
pub struct RouteTagLayer {
    pattern: Arc<str>,
}

impl RouteTagLayer {
    pub fn new(pattern: impl Into<Arc<str>>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl<S> Layer<S> for RouteTagLayer {
    type Service = RouteTagService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RouteTagService {
            inner,
            pattern: Arc::clone(&self.pattern),
        }
    }
}

/// Service that records its route pattern before calling the handler
#[derive(Debug, Clone)]
pub struct RouteTagService<S> {
    inner: S,
    pattern: Arc<str>,
}

impl<S> Service<Request<Body>> for RouteTagService<S>
where
    S: Service<Request<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        match request.extensions().get::<RequestTelemetry>() {
            Some(telemetry) => telemetry.tag_route(request.method(), &self.pattern),
            None => trace!(route = %self.pattern, "No request telemetry, route not tagged"),
        }
        self.inner.call(request)
    }
}

/// Register `method_router` at `pattern`, tagged with that pattern
///
/// ```ignore
/// let router = instrumented_route(Router::new(), "/rolldice/{player}", get(roll_dice_for_player));
/// ```
pub fn instrumented_route<S>(
    router: Router<S>,
    pattern: &str,
    method_router: MethodRouter<S>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route(pattern, method_router.layer(RouteTagLayer::new(pattern)))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::{http::StatusCode, response::Response};
    use tower::{ServiceExt, service_fn};

    use super::*;

    #[test]
    fn layer_keeps_pattern() {
        let layer = RouteTagLayer::new("/rolldice/{player}");
        assert_eq!(layer.pattern(), "/rolldice/{player}");
    }

    #[tokio::test]
    async fn untagged_request_passes_through() {
        let service = RouteTagLayer::new("/rolldice").layer(service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Body::empty())
                    .unwrap(),
            )
        }));

        let response = service
            .oneshot(Request::builder().uri("/rolldice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
