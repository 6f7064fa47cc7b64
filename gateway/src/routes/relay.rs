//! Relay WebSocket route configuration
//!
//! # Endpoints
//!
//! `GET /` and `GET /ws` - WebSocket upgrade for a relay session
//!
//! # Protocol
//!
//! Client frames are JSON text: `{"type":"chat","text":"..."}` or
//! `{"type":"audioRequest"}`. The server answers with `connected`,
//! `chatResponse`, `audioProcessing`, `audioChunk`, `audioComplete` and
//! `error` frames, and forwards `presence` and `userActivity` broadcasts
//! from other clients.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(relay_handler))
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
