mod base;
pub mod channel;
pub mod chunker;
pub mod elevenlabs;

pub use base::{
    Alignment, SynthesisConnector, SynthesisError, SynthesisRequest, SynthesisResult,
    UpstreamCommand, UpstreamEvent, UpstreamState,
};
pub use channel::{EVENT_CHANNEL_CAPACITY, UpstreamChannel, UpstreamTransport};
pub use chunker::{DEFAULT_MAX_CHUNK_CHARS, chunk_for_synthesis};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsConnector, ElevenLabsRestClient, VoiceSettings};

use std::sync::Arc;

/// Create the synthesis connector for a provider name.
///
/// # Supported Providers
///
/// - `"elevenlabs"` - ElevenLabs stream-input WebSocket API
pub fn create_synthesis_connector(
    provider: &str,
    config: ElevenLabsConfig,
) -> SynthesisResult<Arc<dyn SynthesisConnector>> {
    match provider.to_lowercase().as_str() {
        "elevenlabs" | "eleven-labs" => Ok(Arc::new(ElevenLabsConnector::new(config))),
        other => Err(SynthesisError::InvalidConfiguration(format!(
            "Unsupported synthesis provider: {other}. Supported providers: elevenlabs"
        ))),
    }
}
