pub mod api;
pub mod relay;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Assemble every route with its state.
///
/// Rate limiting, CORS and security headers are added by the binary.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    let relay_routes = relay::create_relay_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::create_api_router())
        .merge(relay_routes)
        .with_state(state)
}
