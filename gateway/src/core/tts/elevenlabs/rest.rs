//! ElevenLabs REST synthesis client.
//!
//! Backs the HTTP `/api/tts` and `/api/tts-stream` endpoints. The buffered
//! call returns the whole MP3 body; the streaming call hands back the body
//! as a byte stream so the handler can forward it with chunked transfer.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::core::tts::base::{SynthesisError, SynthesisResult};

use super::STREAMING_LATENCY_OPTIMIZATION;
use super::config::{ElevenLabsConfig, endpoint_url};
use super::messages::TtsRequestBody;

/// MIME type of the audio returned by both endpoints.
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub struct ElevenLabsRestClient {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsRestClient {
    pub fn new(client: reqwest::Client, config: ElevenLabsConfig) -> Self {
        Self { client, config }
    }

    /// Synthesize `text` and return the complete audio body.
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> SynthesisResult<Bytes> {
        let response = self.send(text, voice_id, false).await?;
        response
            .bytes()
            .await
            .map_err(|e| SynthesisError::ProviderError(format!("failed to read audio body: {e}")))
    }

    /// Synthesize `text` and return the audio body as it arrives.
    pub async fn synthesize_stream(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> SynthesisResult<BoxStream<'static, SynthesisResult<Bytes>>> {
        let response = self.send(text, voice_id, true).await?;
        Ok(response
            .bytes_stream()
            .map_err(|e| SynthesisError::ProviderError(format!("audio stream interrupted: {e}")))
            .boxed())
    }

    /// Build the request for the buffered or streaming endpoint.
    ///
    /// ```text
    /// POST {http_base}/v1/text-to-speech/{voice_id}[/stream]
    /// xi-api-key: ...
    /// {"text": "...", "model_id": "...", "voice_settings": {...}}
    /// ```
    pub fn build_request(
        &self,
        text: &str,
        voice_id: Option<&str>,
        streaming: bool,
    ) -> SynthesisResult<reqwest::RequestBuilder> {
        let api_key = self.config.require_api_key()?;
        let voice_id = voice_id
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.config.voice_id);

        let mut segments = vec!["v1", "text-to-speech", voice_id];
        if streaming {
            segments.push("stream");
        }
        let mut url = endpoint_url(&self.config.http_base_url, &segments)?;
        if streaming {
            url.query_pairs_mut().append_pair(
                "optimize_streaming_latency",
                &STREAMING_LATENCY_OPTIMIZATION.to_string(),
            );
        }

        debug!(
            "Building ElevenLabs TTS request: voice={}, model={}, streaming={}",
            voice_id, self.config.model_id, streaming
        );

        let body = TtsRequestBody {
            text,
            model_id: &self.config.model_id,
            voice_settings: &self.config.voice_settings,
        };

        Ok(self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .header("Content-Type", "application/json")
            .header("Accept", AUDIO_CONTENT_TYPE)
            .json(&body))
    }

    async fn send(
        &self,
        text: &str,
        voice_id: Option<&str>,
        streaming: bool,
    ) -> SynthesisResult<reqwest::Response> {
        let response = self
            .build_request(text, voice_id, streaming)?
            .send()
            .await
            .map_err(|e| SynthesisError::ProviderError(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        warn!("ElevenLabs TTS request failed: status={}, body={}", status, body);
        Err(SynthesisError::ProviderError(format!(
            "ElevenLabs API error ({}): {}",
            status.as_u16(),
            body
        )))
    }
}
