//! HTTP-facing error type.
//!
//! Handlers return [`AppResult`]; the error renders as a JSON body
//! `{"error": "..."}` with a status that reflects where the failure sits.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::tts::SynthesisError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    /// A backend needed for this request is not configured.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// A backend answered with an error or could not be reached.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SynthesisError> for AppError {
    fn from(error: SynthesisError) -> Self {
        match error {
            SynthesisError::InvalidConfiguration(msg) => Self::Internal(msg),
            SynthesisError::ProviderError(msg) | SynthesisError::UpstreamConnect(msg) => {
                Self::BadGateway(msg)
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
