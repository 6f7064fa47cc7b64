use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::llm::base::{GenerationError, GenerationResult};

use super::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, GEMINI_BASE_URL};

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Sent as `systemInstruction` when set.
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            system_prompt: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GeminiConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
            system_prompt: config.gemini_system_prompt.clone(),
            timeout: Duration::from_secs(config.generation_timeout_seconds),
        }
    }

    pub fn require_api_key(&self) -> GenerationResult<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(GenerationError::InvalidConfiguration(
                "Gemini API key not configured".to_string(),
            )),
        }
    }

    /// `{base}/v1beta/models/{model}:generateContent`
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}
