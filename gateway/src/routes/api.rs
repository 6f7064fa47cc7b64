use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::speak;
use crate::state::AppState;
use std::sync::Arc;

/// Create the synthesis API router, nested under `/api` in `main.rs`.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tts", post(speak::speak_handler))
        .route("/tts-stream", post(speak::speak_stream_handler))
        .layer(TraceLayer::new_for_http())
}
