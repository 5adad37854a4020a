// Request middleware - request tracking and circuit breaking
// Layer order is fixed here: request tracking, then CORS, then the breaker, then handlers
// CORS preflight answers must still carry a request id

pub mod circuit_breaker;
pub mod request_tracking;

pub use circuit_breaker::*;
pub use request_tracking::*;

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Process-wide middleware state, composed onto a router once at startup
#[derive(Clone)]
pub struct MiddlewareStack {
    pub requests: Arc<RequestTracker>,
    pub breaker: Arc<CircuitBreaker>,
}

impl MiddlewareStack {
    pub fn new(requests: RequestTrackingConfig, breaker: &CircuitBreakerConfig) -> Self {
        Self {
            requests: Arc::new(RequestTracker::new(requests)),
            breaker: Arc::new(CircuitBreaker::new(breaker)),
        }
    }

    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(
                    self.requests.clone(),
                    request_tracking_middleware,
                ))
                .layer(CorsLayer::permissive())
                .layer(from_fn_with_state(
                    self.breaker.clone(),
                    circuit_breaker_middleware,
                )),
        )
    }
}
