//! Server configuration
//!
//! Configuration is read from environment variables (after `.env` is loaded
//! in `main`) and optionally overlaid with a YAML file:
//!
//! YAML > environment variables > defaults
//!
//! # Environment variables
//!
//! | Key | Default |
//! |-----|---------|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `GEMINI_API_KEY` | unset |
//! | `GEMINI_MODEL` | `gemini-2.0-flash-exp` |
//! | `GEMINI_BASE_URL` | `https://generativelanguage.googleapis.com` |
//! | `GEMINI_SYSTEM_PROMPT` | unset |
//! | `GENERATION_TIMEOUT_SECONDS` | `30` |
//! | `ELEVENLABS_API_KEY` | unset |
//! | `ELEVENLABS_VOICE_ID` | `21m00Tcm4TlvDq8ikWAM` |
//! | `ELEVENLABS_MODEL` | `eleven_turbo_v2_5` |
//! | `ELEVENLABS_WS_BASE_URL` | `wss://api.elevenlabs.io` |
//! | `ELEVENLABS_HTTP_BASE_URL` | `https://api.elevenlabs.io` |
//! | `UPSTREAM_CONNECT_TIMEOUT_SECONDS` | `10` |
//! | `SYNTHESIS_CHUNK_MAX_CHARS` | `250` |
//! | `IDLE_TIMEOUT_SECONDS` | `300` |
//! | `CORS_ALLOWED_ORIGINS` | unset (same-origin only) |
//! | `RATE_LIMIT_REQUESTS_PER_SECOND` | `60` |
//! | `RATE_LIMIT_BURST_SIZE` | `10` |
//! | `MAX_WEBSOCKET_CONNECTIONS` | unset (no cap) |

pub mod yaml;

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::core::llm::gemini::{
    DEFAULT_MODEL as DEFAULT_GEMINI_MODEL, DEFAULT_TIMEOUT_SECS as DEFAULT_GENERATION_TIMEOUT_SECS,
    GEMINI_BASE_URL,
};
use crate::core::tts::DEFAULT_MAX_CHUNK_CHARS;
use crate::core::tts::elevenlabs::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL_ID, DEFAULT_VOICE_ID, ELEVENLABS_HTTP_BASE_URL,
    ELEVENLABS_WS_BASE_URL,
};

pub use yaml::YamlConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    // Text generation
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_system_prompt: Option<String>,
    pub generation_timeout_seconds: u64,

    // Speech synthesis
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,
    pub elevenlabs_ws_base_url: String,
    pub elevenlabs_http_base_url: String,
    pub upstream_connect_timeout_seconds: u64,
    pub synthesis_chunk_max_chars: usize,

    // Relay
    pub idle_timeout_seconds: u64,
    pub max_websocket_connections: Option<usize>,

    // Security
    /// Comma-separated origins, or `*`. `None` keeps browsers same-origin.
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            gemini_system_prompt: None,
            generation_timeout_seconds: DEFAULT_GENERATION_TIMEOUT_SECS,
            elevenlabs_api_key: None,
            elevenlabs_voice_id: DEFAULT_VOICE_ID.to_string(),
            elevenlabs_model_id: DEFAULT_MODEL_ID.to_string(),
            elevenlabs_ws_base_url: ELEVENLABS_WS_BASE_URL.to_string(),
            elevenlabs_http_base_url: ELEVENLABS_HTTP_BASE_URL.to_string(),
            upstream_connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            synthesis_chunk_max_chars: DEFAULT_MAX_CHUNK_CHARS,
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECS,
            max_websocket_connections: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self::env_layer()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file layered over the environment.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = Self::env_layer()?;
        yaml_config.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_gemini_key(&self) -> bool {
        self.gemini_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn has_elevenlabs_key(&self) -> bool {
        self.elevenlabs_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    fn env_layer() -> ConfigResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port)?,
            gemini_api_key: env_string("GEMINI_API_KEY"),
            gemini_model: env_string("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env_string("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_system_prompt: env_string("GEMINI_SYSTEM_PROMPT"),
            generation_timeout_seconds: env_parse(
                "GENERATION_TIMEOUT_SECONDS",
                defaults.generation_timeout_seconds,
            )?,
            elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: env_string("ELEVENLABS_VOICE_ID")
                .unwrap_or(defaults.elevenlabs_voice_id),
            elevenlabs_model_id: env_string("ELEVENLABS_MODEL")
                .unwrap_or(defaults.elevenlabs_model_id),
            elevenlabs_ws_base_url: env_string("ELEVENLABS_WS_BASE_URL")
                .unwrap_or(defaults.elevenlabs_ws_base_url),
            elevenlabs_http_base_url: env_string("ELEVENLABS_HTTP_BASE_URL")
                .unwrap_or(defaults.elevenlabs_http_base_url),
            upstream_connect_timeout_seconds: env_parse(
                "UPSTREAM_CONNECT_TIMEOUT_SECONDS",
                defaults.upstream_connect_timeout_seconds,
            )?,
            synthesis_chunk_max_chars: env_parse(
                "SYNTHESIS_CHUNK_MAX_CHARS",
                defaults.synthesis_chunk_max_chars,
            )?,
            idle_timeout_seconds: env_parse("IDLE_TIMEOUT_SECONDS", defaults.idle_timeout_seconds)?,
            max_websocket_connections: env_parse_optional("MAX_WEBSOCKET_CONNECTIONS")?,
            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: env_parse(
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                defaults.rate_limit_requests_per_second,
            )?,
            rate_limit_burst_size: env_parse("RATE_LIMIT_BURST_SIZE", defaults.rate_limit_burst_size)?,
        })
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("HOST", "must not be empty"));
        }

        for (key, value) in [
            ("GENERATION_TIMEOUT_SECONDS", self.generation_timeout_seconds),
            (
                "UPSTREAM_CONNECT_TIMEOUT_SECONDS",
                self.upstream_connect_timeout_seconds,
            ),
            ("IDLE_TIMEOUT_SECONDS", self.idle_timeout_seconds),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }

        if self.synthesis_chunk_max_chars < 16 {
            return Err(invalid("SYNTHESIS_CHUNK_MAX_CHARS", "must be at least 16"));
        }
        if self.rate_limit_requests_per_second == 0 {
            return Err(invalid(
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                "must be greater than zero",
            ));
        }
        if self.rate_limit_burst_size == 0 {
            return Err(invalid("RATE_LIMIT_BURST_SIZE", "must be greater than zero"));
        }
        if self.max_websocket_connections == Some(0) {
            return Err(invalid(
                "MAX_WEBSOCKET_CONNECTIONS",
                "must be greater than zero when set",
            ));
        }

        validate_url("GEMINI_BASE_URL", &self.gemini_base_url, &["http", "https"])?;
        validate_url(
            "ELEVENLABS_WS_BASE_URL",
            &self.elevenlabs_ws_base_url,
            &["ws", "wss"],
        )?;
        validate_url(
            "ELEVENLABS_HTTP_BASE_URL",
            &self.elevenlabs_http_base_url,
            &["http", "https"],
        )?;

        Ok(())
    }
}

fn invalid(key: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

fn validate_url(key: &'static str, value: &str, schemes: &[&str]) -> ConfigResult<()> {
    let url = Url::parse(value).map_err(|e| invalid(key, &e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(
            key,
            &format!("scheme must be one of {}", schemes.join(", ")),
        ));
    }
    Ok(())
}

/// Non-empty, trimmed environment value.
fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse_optional(key)?.unwrap_or(default))
}

fn env_parse_optional<T>(key: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| invalid(key, &format!("{raw:?}: {e}")))
        })
        .transpose()
}
