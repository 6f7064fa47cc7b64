//! Base trait and errors for text-generation backends.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while generating a response.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The prompt was empty or whitespace only; no request was made.
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The request could not be sent or the connection dropped.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status from the backend.
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Success status but no usable text in the body.
    #[error("Backend returned no text")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Stateless prompt-to-text generation.
///
/// Each call is independent; no conversation history is kept between calls.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GenerationResult<String>;

    /// Model identifier for logs.
    fn model(&self) -> &str;
}
