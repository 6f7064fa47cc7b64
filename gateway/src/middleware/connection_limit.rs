//! Connection limit middleware for relay WebSocket connections
//!
//! ```ignore
//! use axum::Router;
//! use voice_relay_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/ws", get(relay_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::errors::AppError;
use crate::state::AppState;

/// Reject WebSocket upgrades with 503 while the registry is at
/// `MAX_WEBSOCKET_CONNECTIONS`.
///
/// Only upgrade requests are counted; anything else passes through.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    if state.at_connection_capacity() {
        tracing::warn!(
            clients = state.client_count(),
            max = ?state.config.max_websocket_connections,
            "Rejecting connection: global limit reached"
        );
        return AppError::ServiceUnavailable(
            "Server at capacity. Please try again later.".to_string(),
        )
        .into_response();
    }

    next.run(request).await
}
