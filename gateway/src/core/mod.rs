pub mod llm;
pub mod tts;

// Re-export commonly used types for convenience
pub use llm::{GeminiClient, GeminiConfig, GenerationError, GenerationResult, TextGenerator};

pub use tts::{
    SynthesisConnector, SynthesisError, SynthesisRequest, SynthesisResult, UpstreamChannel,
    UpstreamEvent, UpstreamState, create_synthesis_connector,
};
