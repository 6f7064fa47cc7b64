//! One-shot speech synthesis over HTTP.
//!
//! `POST /api/tts` returns the whole `audio/mpeg` body once synthesis
//! finishes; `POST /api/tts-stream` forwards the provider's chunked body as
//! it arrives.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::tts::elevenlabs::rest::AUDIO_CONTENT_TYPE;
use crate::errors::{AppError, AppResult};
use crate::handlers::relay::messages::MAX_TEXT_SIZE;
use crate::state::AppState;

/// Request body for both synthesis endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<String>,
}

impl SpeakRequest {
    fn validated_text(&self) -> AppResult<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Text is required".to_string()));
        }
        if text.len() > MAX_TEXT_SIZE {
            return Err(AppError::BadRequest(format!(
                "Text too large: {} bytes (max {MAX_TEXT_SIZE})",
                text.len()
            )));
        }
        Ok(text)
    }
}

/// `POST /api/tts`
pub async fn speak_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeakRequest>,
) -> AppResult<Response> {
    let text = request.validated_text()?;
    info!(
        text_len = text.len(),
        voice_id = request.voice_id.as_deref().unwrap_or("default"),
        "Speech synthesis requested"
    );

    let audio = state
        .tts_client
        .synthesize(text, request.voice_id.as_deref())
        .await?;

    debug!(audio_bytes = audio.len(), "Speech synthesis complete");

    Ok(([(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)], audio).into_response())
}

/// `POST /api/tts-stream`
pub async fn speak_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeakRequest>,
) -> AppResult<Response> {
    let text = request.validated_text()?;
    info!(
        text_len = text.len(),
        voice_id = request.voice_id.as_deref().unwrap_or("default"),
        "Streaming speech synthesis requested"
    );

    let stream = state
        .tts_client
        .synthesize_stream(text, request.voice_id.as_deref())
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, AUDIO_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let request: SpeakRequest =
            serde_json::from_str(r#"{"text":"hi","voiceId":"v1"}"#).unwrap();
        assert_eq!(request.voice_id.as_deref(), Some("v1"));
        assert_eq!(request.validated_text().unwrap(), "hi");
    }

    #[test]
    fn test_blank_text_rejected() {
        let request: SpeakRequest = serde_json::from_str(r#"{"text":"   "}"#).unwrap();
        assert!(matches!(
            request.validated_text(),
            Err(AppError::BadRequest(_))
        ));

        let missing: SpeakRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.validated_text().is_err());
    }

    #[test]
    fn test_oversized_text_rejected() {
        let request = SpeakRequest {
            text: "a".repeat(MAX_TEXT_SIZE + 1),
            voice_id: None,
        };
        assert!(matches!(
            request.validated_text(),
            Err(AppError::BadRequest(msg)) if msg.contains("Text too large")
        ));
    }
}
