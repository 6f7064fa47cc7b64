use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::relay::messages::utc_timestamp;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Connected relay clients
    pub clients: usize,
    pub timestamp: String,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        clients: state.client_count(),
        timestamp: utc_timestamp(),
    })
}
