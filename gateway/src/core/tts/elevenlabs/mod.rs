//! ElevenLabs speech synthesis.
//!
//! Two surfaces are used:
//!
//! - **stream-input WebSocket** for the relay: text is pushed in chunks as
//!   it becomes available and base64 audio frames come back while the text
//!   is still arriving. See [`ElevenLabsConnector`].
//! - **REST** for one-shot synthesis over HTTP, either buffered or chunked.
//!   See [`ElevenLabsRestClient`].
//!
//! # Stream-input protocol
//!
//! ```text
//! -> {"text":" ","voice_settings":{...},"xi_api_key":"..."}   handshake
//! -> {"text":"Hello there. ","try_trigger_generation":true}   chunk
//! -> {"text":""}                                              end of input
//! <- {"audio":"<base64>","alignment":{...}}
//! <- {"isFinal":true}
//! ```
//!
//! # Authentication
//!
//! The WebSocket carries the key in the handshake frame; REST calls use the
//! `xi-api-key` header.

pub mod config;
pub mod messages;
pub mod rest;
pub mod stream;

pub use config::{ElevenLabsConfig, VoiceSettings};
pub use messages::{OutboundFrame, StreamResponse, TtsRequestBody};
pub use rest::ElevenLabsRestClient;
pub use stream::ElevenLabsConnector;

// =============================================================================
// API Constants
// =============================================================================

/// Base URL of the stream-input WebSocket API.
pub const ELEVENLABS_WS_BASE_URL: &str = "wss://api.elevenlabs.io";

/// Base URL of the REST API.
pub const ELEVENLABS_HTTP_BASE_URL: &str = "https://api.elevenlabs.io";

// =============================================================================
// Defaults
// =============================================================================

/// "Rachel", a stock ElevenLabs voice.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

pub const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2_5";

pub const DEFAULT_STABILITY: f32 = 0.5;
pub const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;
pub const DEFAULT_STYLE: f32 = 0.5;

/// Latency optimization level for the REST streaming endpoint (0-4).
pub const STREAMING_LATENCY_OPTIMIZATION: u8 = 3;

/// Default timeout for connecting and sending the handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
