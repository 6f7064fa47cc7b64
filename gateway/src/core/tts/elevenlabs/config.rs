//! ElevenLabs configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ServerConfig;
use crate::core::tts::base::{SynthesisError, SynthesisResult};

use super::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL_ID, DEFAULT_SIMILARITY_BOOST, DEFAULT_STABILITY,
    DEFAULT_STYLE, DEFAULT_VOICE_ID, ELEVENLABS_HTTP_BASE_URL, ELEVENLABS_WS_BASE_URL,
};

/// Voice tuning sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
            style: Some(DEFAULT_STYLE),
            use_speaker_boost: Some(true),
        }
    }
}

/// Settings shared by the stream-input connector and the REST client.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    /// `None` when no key is configured; every call then fails fast.
    pub api_key: Option<String>,
    pub voice_id: String,
    pub model_id: String,
    pub ws_base_url: String,
    pub http_base_url: String,
    pub voice_settings: VoiceSettings,
    pub connect_timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            ws_base_url: ELEVENLABS_WS_BASE_URL.to_string(),
            http_base_url: ELEVENLABS_HTTP_BASE_URL.to_string(),
            voice_settings: VoiceSettings::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ElevenLabsConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            api_key: config.elevenlabs_api_key.clone(),
            voice_id: config.elevenlabs_voice_id.clone(),
            model_id: config.elevenlabs_model_id.clone(),
            ws_base_url: config.elevenlabs_ws_base_url.clone(),
            http_base_url: config.elevenlabs_http_base_url.clone(),
            voice_settings: VoiceSettings::default(),
            connect_timeout: Duration::from_secs(config.upstream_connect_timeout_seconds),
        }
    }

    /// The configured key, or `InvalidConfiguration` when it is missing or blank.
    pub fn require_api_key(&self) -> SynthesisResult<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(SynthesisError::InvalidConfiguration(
                "ElevenLabs API key not configured".to_string(),
            )),
        }
    }
}

/// Append percent-encoded path segments to a base URL.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> SynthesisResult<Url> {
    let mut url = Url::parse(base).map_err(|e| {
        SynthesisError::InvalidConfiguration(format!("invalid ElevenLabs base URL {base}: {e}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            SynthesisError::InvalidConfiguration(format!(
                "ElevenLabs base URL cannot carry a path: {base}"
            ))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
