//! Base traits and types for streaming speech synthesis backends.
//!
//! A synthesis backend is reached through an [`UpstreamChannel`](super::UpstreamChannel):
//! one duplex connection per utterance, opened by a [`SynthesisConnector`].
//! Text goes out in chunks, audio and metadata come back as [`UpstreamEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::channel::UpstreamChannel;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by synthesis backends and upstream channels.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The backend could not be reached, the handshake failed or timed out.
    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    /// An operation was attempted in a state that does not allow it.
    #[error("Upstream channel not ready (state: {0})")]
    NotReady(UpstreamState),

    /// The transport task is gone or the socket failed mid-stream.
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Missing credential or malformed setting.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Non-success response from a REST synthesis call.
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

// =============================================================================
// Channel State
// =============================================================================

/// Lifecycle of an upstream synthesis channel.
///
/// `Connecting -> Ready -> Streaming -> Finalizing -> Closed`, with `Failed`
/// reachable from any non-terminal state. `close()` always lands in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Connecting,
    Ready,
    Streaming,
    Finalizing,
    Closed,
    Failed,
}

impl UpstreamState {
    /// Whether text chunks may be sent in this state.
    pub fn accepts_text(self) -> bool {
        matches!(self, Self::Ready | Self::Streaming)
    }

    /// Whether the channel has finished and will emit no further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for UpstreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Events and Commands
// =============================================================================

/// Character timing metadata reported alongside synthesized audio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alignment {
    pub chars: Vec<String>,
    pub char_start_times_ms: Vec<u32>,
    pub char_durations_ms: Vec<u32>,
}

/// Typed event delivered from the upstream transport to the channel owner.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Decoded audio bytes, in backend arrival order.
    AudioChunk(Bytes),
    Alignment(Alignment),
    /// The backend flagged the end of this utterance's audio.
    Complete,
    /// The backend socket closed without an error.
    Closed,
    Failed(String),
}

impl UpstreamEvent {
    /// Whether this event ends the utterance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Closed | Self::Failed(_))
    }
}

/// Provider-neutral command sent from the channel to its transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCommand {
    /// A text chunk, already carrying its trailing delimiter.
    Text {
        text: String,
        try_trigger_generation: bool,
    },
    /// No more text for this utterance.
    EndOfInput,
}

// =============================================================================
// Connector Trait
// =============================================================================

/// Identity of one utterance's synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Id of the client session that owns the channel.
    pub session_id: String,
    pub voice_id: String,
    pub model_id: String,
}

/// Opens upstream synthesis channels.
///
/// Implementations connect to the backend, send its handshake and hand back
/// a channel in the `Ready` state. Any failure before that point is reported
/// as [`SynthesisError::UpstreamConnect`].
#[async_trait]
pub trait SynthesisConnector: Send + Sync {
    async fn open(&self, request: SynthesisRequest) -> SynthesisResult<UpstreamChannel>;

    /// Provider name for logs and health output.
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_accepts_text() {
        assert!(UpstreamState::Ready.accepts_text());
        assert!(UpstreamState::Streaming.accepts_text());
        assert!(!UpstreamState::Connecting.accepts_text());
        assert!(!UpstreamState::Finalizing.accepts_text());
        assert!(!UpstreamState::Closed.accepts_text());
        assert!(!UpstreamState::Failed.accepts_text());
    }

    #[test]
    fn test_state_terminal() {
        assert!(UpstreamState::Closed.is_terminal());
        assert!(UpstreamState::Failed.is_terminal());
        assert!(!UpstreamState::Finalizing.is_terminal());
    }

    #[test]
    fn test_not_ready_error_names_state() {
        let err = SynthesisError::NotReady(UpstreamState::Finalizing);
        assert_eq!(err.to_string(), "Upstream channel not ready (state: finalizing)");
    }

    #[test]
    fn test_alignment_deserializes_camel_case() {
        let json = r#"{"chars":["H","i"],"charStartTimesMs":[0,70],"charDurationsMs":[70,90]}"#;
        let alignment: Alignment = serde_json::from_str(json).unwrap();
        assert_eq!(alignment.chars, vec!["H", "i"]);
        assert_eq!(alignment.char_start_times_ms, vec![0, 70]);
        assert_eq!(alignment.char_durations_ms, vec![70, 90]);
    }

    #[test]
    fn test_terminal_events() {
        assert!(UpstreamEvent::Complete.is_terminal());
        assert!(UpstreamEvent::Closed.is_terminal());
        assert!(UpstreamEvent::Failed("x".into()).is_terminal());
        assert!(!UpstreamEvent::AudioChunk(Bytes::from_static(b"a")).is_terminal());
    }
}
