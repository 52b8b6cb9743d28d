//! HTTP surface.

mod handlers;
mod problem;

pub use problem::ApiError;

use crate::engine::AuthorizationEngine;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Header upstream authentication sets to the logged-in user's id.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Authorization core
    pub engine: Arc<AuthorizationEngine>,
}

/// Build the router with request tracing and a per-request time bound.
pub fn router(engine: Arc<AuthorizationEngine>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/oauth/token", post(handlers::token))
        .route("/authorize", get(handlers::authorize))
        .route("/oauth/par", post(handlers::par))
        .route("/oauth/device_authorization", post(handlers::device_authorization))
        .route("/oauth/device/verify", post(handlers::device_verify))
        .route("/oauth/revoke", post(handlers::revoke))
        .route("/oauth/introspect", post(handlers::introspect))
        .route("/.well-known/jwks.json", get(handlers::jwks))
        .route("/.well-known/openid-configuration", get(handlers::discovery))
        .route("/backchannel-logout", post(handlers::backchannel_logout))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(AppState { engine })
}
