use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::llm::{GeminiClient, GeminiConfig, TextGenerator};
use crate::core::tts::{
    ElevenLabsConfig, ElevenLabsRestClient, SynthesisConnector, create_synthesis_connector,
};
use crate::errors::{AppError, AppResult};
use crate::handlers::relay::{SessionRegistry, SessionServices};

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub generator: Arc<dyn TextGenerator>,
    pub connector: Arc<dyn SynthesisConnector>,
    pub tts_client: ElevenLabsRestClient,
}

impl AppState {
    /// Build the state with the Gemini and ElevenLabs backends from `config`.
    ///
    /// Missing API keys do not stop the server; the affected requests fail
    /// with a configuration error instead.
    pub fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        if !config.has_gemini_key() {
            warn!("GEMINI_API_KEY is not set; chat messages will fail");
        }
        if !config.has_elevenlabs_key() {
            warn!("ELEVENLABS_API_KEY is not set; speech synthesis will fail");
        }

        let generator = GeminiClient::new(GeminiConfig::from_server_config(&config))
            .map_err(|e| AppError::Internal(format!("Failed to build Gemini client: {e}")))?;

        let synthesis_config = ElevenLabsConfig::from_server_config(&config);
        let connector = create_synthesis_connector("elevenlabs", synthesis_config.clone())?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.upstream_connect_timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let tts_client = ElevenLabsRestClient::new(http_client, synthesis_config);

        info!(
            gemini_model = %config.gemini_model,
            voice_id = %config.elevenlabs_voice_id,
            "Application state initialized"
        );

        Ok(Self::with_services(
            config,
            Arc::new(generator),
            connector,
            tts_client,
        ))
    }

    /// Build the state around already-constructed backends.
    pub fn with_services(
        config: ServerConfig,
        generator: Arc<dyn TextGenerator>,
        connector: Arc<dyn SynthesisConnector>,
        tts_client: ElevenLabsRestClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            generator,
            connector,
            tts_client,
        })
    }

    /// Everything a relay session needs, cloned per connection.
    pub fn session_services(&self) -> SessionServices {
        SessionServices {
            generator: self.generator.clone(),
            connector: self.connector.clone(),
            registry: self.registry.clone(),
            voice_id: self.config.elevenlabs_voice_id.clone(),
            model_id: self.config.elevenlabs_model_id.clone(),
            max_chunk_chars: self.config.synthesis_chunk_max_chars,
        }
    }

    /// Number of connected relay clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether another relay connection would exceed the configured cap.
    pub fn at_connection_capacity(&self) -> bool {
        self.config
            .max_websocket_connections
            .is_some_and(|max| self.registry.len() >= max)
    }
}
