use serde::Deserialize;
use std::path::Path;

use super::{ConfigError, ConfigResult, ServerConfig};

/// Complete YAML configuration structure
///
/// Every field is optional. Values present here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///
/// generation:
///   api_key: "your-gemini-key"
///   model: "gemini-2.0-flash-exp"
///   base_url: "https://generativelanguage.googleapis.com"
///   system_prompt: "Answer in two sentences."
///   timeout_seconds: 30
///
/// synthesis:
///   api_key: "your-elevenlabs-key"
///   voice_id: "21m00Tcm4TlvDq8ikWAM"
///   model_id: "eleven_turbo_v2_5"
///   ws_base_url: "wss://api.elevenlabs.io"
///   http_base_url: "https://api.elevenlabs.io"
///   connect_timeout_seconds: 10
///   chunk_max_chars: 250
///
/// relay:
///   idle_timeout_seconds: 300
///   max_connections: 1000
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub generation: Option<GenerationYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Text generation (Gemini) settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GenerationYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Speech synthesis (ElevenLabs) settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub ws_base_url: Option<String>,
    pub http_base_url: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub chunk_max_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub idle_timeout_seconds: Option<u64>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

fn overlay<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn overlay_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write every value present in this file over `config`.
    pub fn apply_to(self, config: &mut ServerConfig) {
        if let Some(server) = self.server {
            overlay(&mut config.host, server.host);
            overlay(&mut config.port, server.port);
        }

        if let Some(generation) = self.generation {
            overlay_opt(&mut config.gemini_api_key, generation.api_key);
            overlay(&mut config.gemini_model, generation.model);
            overlay(&mut config.gemini_base_url, generation.base_url);
            overlay_opt(&mut config.gemini_system_prompt, generation.system_prompt);
            overlay(
                &mut config.generation_timeout_seconds,
                generation.timeout_seconds,
            );
        }

        if let Some(synthesis) = self.synthesis {
            overlay_opt(&mut config.elevenlabs_api_key, synthesis.api_key);
            overlay(&mut config.elevenlabs_voice_id, synthesis.voice_id);
            overlay(&mut config.elevenlabs_model_id, synthesis.model_id);
            overlay(&mut config.elevenlabs_ws_base_url, synthesis.ws_base_url);
            overlay(&mut config.elevenlabs_http_base_url, synthesis.http_base_url);
            overlay(
                &mut config.upstream_connect_timeout_seconds,
                synthesis.connect_timeout_seconds,
            );
            overlay(
                &mut config.synthesis_chunk_max_chars,
                synthesis.chunk_max_chars,
            );
        }

        if let Some(relay) = self.relay {
            overlay(&mut config.idle_timeout_seconds, relay.idle_timeout_seconds);
            overlay_opt(&mut config.max_websocket_connections, relay.max_connections);
        }

        if let Some(security) = self.security {
            overlay_opt(
                &mut config.cors_allowed_origins,
                security.cors_allowed_origins,
            );
            overlay(
                &mut config.rate_limit_requests_per_second,
                security.rate_limit_requests_per_second,
            );
            overlay(
                &mut config.rate_limit_burst_size,
                security.rate_limit_burst_size,
            );
        }
    }
}
