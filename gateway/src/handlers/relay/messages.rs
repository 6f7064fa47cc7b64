//! Relay WebSocket message types
//!
//! Every frame in either direction is a JSON object tagged by `type`.
//! Field names are camelCase on the wire to match browser clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::registry::SessionId;

/// Maximum allowed size for chat text (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Recognized speech to answer and speak
    #[serde(rename = "chat")]
    Chat { text: String },

    /// Speak the most recent response again
    #[serde(rename = "audioRequest")]
    AudioRequest,

    /// Open a client-driven synthesis stream
    #[serde(rename = "startTTS")]
    StartTts {
        #[serde(rename = "voiceId", default)]
        voice_id: Option<String>,
    },

    /// Text for the open client-driven stream
    #[serde(rename = "sendText")]
    SendText { text: String },

    /// No more text for the client-driven stream
    #[serde(rename = "finalizeTTS")]
    FinalizeTts,
}

impl IncomingMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let message: Self =
            serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        message.validate_size()?;
        Ok(message)
    }

    pub fn validate_size(&self) -> Result<(), ValidationError> {
        match self {
            Self::Chat { text } | Self::SendText { text } if text.len() > MAX_TEXT_SIZE => Err(ValidationError::TextTooLarge {
                size: text.len(),
                max: MAX_TEXT_SIZE,
            }),
            _ => Ok(()),
        }
    }
}

/// Error type for inbound frame decoding failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid message format: {0}")]
    Malformed(String),

    #[error("Text too large: {size} bytes (max: {max} bytes)")]
    TextTooLarge { size: usize, max: usize },

    #[error("Binary frames are not supported")]
    BinaryFrame,
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outcome of an utterance, reported to the other sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Completed,
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Joined,
    Left,
}

/// Outgoing WebSocket messages to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// Welcome frame carrying the assigned session id
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "clientId")]
        client_id: SessionId,
        message: String,
    },

    /// Generated reply text, sent before any audio
    #[serde(rename = "chatResponse")]
    ChatResponse { text: String, timestamp: String },

    #[serde(rename = "audioProcessing")]
    AudioProcessing { status: String },

    /// One base64 audio chunk, forwarded as soon as it arrives
    #[serde(rename = "audioChunk")]
    AudioChunk { audio: String },

    /// End of an utterance's audio; `size` is the total decoded byte count
    #[serde(rename = "audioComplete")]
    AudioComplete { size: u64 },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Broadcast to every other session when an utterance ends
    #[serde(rename = "userActivity")]
    UserActivity {
        #[serde(rename = "clientId")]
        client_id: SessionId,
        activity: Activity,
    },

    /// Broadcast to every other session when a session joins or leaves
    #[serde(rename = "presence")]
    Presence {
        #[serde(rename = "clientId")]
        client_id: SessionId,
        status: PresenceStatus,
        clients: usize,
    },
}

impl OutgoingMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }

    pub fn chat_response(text: impl Into<String>) -> Self {
        Self::ChatResponse {
            text: text.into(),
            timestamp: utc_timestamp(),
        }
    }

    pub fn generating() -> Self {
        Self::AudioProcessing {
            status: "generating".to_string(),
        }
    }
}

/// Error codes carried in `error` frames.
pub mod codes {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const GENERATION_FAILED: &str = "generation_failed";
    pub const SYNTHESIS_UNAVAILABLE: &str = "synthesis_unavailable";
    pub const SYNTHESIS_FAILED: &str = "synthesis_failed";
    pub const BUSY: &str = "busy";
    pub const NO_RESPONSE: &str = "no_response";
    pub const NO_STREAM: &str = "no_stream";
    pub const SYNTHESIS_INTERRUPTED: &str = "synthesis_interrupted";
    pub const IDLE_TIMEOUT: &str = "idle_timeout";
}

/// Message routing for the WebSocket writer task
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Close,
}

/// Current UTC time as RFC 3339.
pub fn utc_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat() {
        let msg = IncomingMessage::parse(r#"{"type":"chat","text":"Hello"}"#).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::Chat {
                text: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_parse_audio_request() {
        let msg = IncomingMessage::parse(r#"{"type":"audioRequest"}"#).unwrap();
        assert_eq!(msg, IncomingMessage::AudioRequest);
    }

    #[test]
    fn test_parse_client_driven_stream() {
        assert_eq!(
            IncomingMessage::parse(r#"{"type":"startTTS","voiceId":"custom"}"#).unwrap(),
            IncomingMessage::StartTts {
                voice_id: Some("custom".to_string())
            }
        );
        assert_eq!(
            IncomingMessage::parse(r#"{"type":"startTTS"}"#).unwrap(),
            IncomingMessage::StartTts { voice_id: None }
        );
        assert_eq!(
            IncomingMessage::parse(r#"{"type":"sendText","text":"Hello. "}"#).unwrap(),
            IncomingMessage::SendText {
                text: "Hello. ".to_string()
            }
        );
        assert_eq!(
            IncomingMessage::parse(r#"{"type":"finalizeTTS"}"#).unwrap(),
            IncomingMessage::FinalizeTts
        );
    }

    #[test]
    fn test_send_text_too_large() {
        let text = "a".repeat(MAX_TEXT_SIZE + 1);
        let frame = json!({"type": "sendText", "text": text}).to_string();
        assert!(matches!(
            IncomingMessage::parse(&frame),
            Err(ValidationError::TextTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = IncomingMessage::parse(r#"{"type":"dance"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_missing_field_rejected() {
        assert!(IncomingMessage::parse(r#"{"type":"chat"}"#).is_err());
        assert!(IncomingMessage::parse("not json").is_err());
    }

    #[test]
    fn test_text_too_large() {
        let text = "a".repeat(MAX_TEXT_SIZE + 1);
        let frame = json!({"type": "chat", "text": text}).to_string();
        match IncomingMessage::parse(&frame) {
            Err(ValidationError::TextTooLarge { size, max }) => {
                assert_eq!(size, MAX_TEXT_SIZE + 1);
                assert_eq!(max, MAX_TEXT_SIZE);
            }
            other => panic!("expected TextTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_outgoing_wire_shapes() {
        let id = SessionId::from("abc");

        assert_eq!(
            serde_json::to_value(OutgoingMessage::AudioChunk {
                audio: "AAEC".to_string()
            })
            .unwrap(),
            json!({"type": "audioChunk", "audio": "AAEC"})
        );
        assert_eq!(
            serde_json::to_value(OutgoingMessage::AudioComplete { size: 42 }).unwrap(),
            json!({"type": "audioComplete", "size": 42})
        );
        assert_eq!(
            serde_json::to_value(OutgoingMessage::UserActivity {
                client_id: id.clone(),
                activity: Activity::Completed,
            })
            .unwrap(),
            json!({"type": "userActivity", "clientId": "abc", "activity": "completed"})
        );
        assert_eq!(
            serde_json::to_value(OutgoingMessage::Presence {
                client_id: id,
                status: PresenceStatus::Left,
                clients: 2,
            })
            .unwrap(),
            json!({"type": "presence", "clientId": "abc", "status": "left", "clients": 2})
        );
    }

    #[test]
    fn test_error_without_code_omits_field() {
        let value = serde_json::to_value(OutgoingMessage::Error {
            message: "boom".to_string(),
            code: None,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "error", "message": "boom"}));

        let value = serde_json::to_value(OutgoingMessage::error(codes::BUSY, "busy")).unwrap();
        assert_eq!(value["code"], "busy");
    }

    #[test]
    fn test_chat_response_has_timestamp() {
        let value = serde_json::to_value(OutgoingMessage::chat_response("Hi there!")).unwrap();
        assert_eq!(value["type"], "chatResponse");
        assert_eq!(value["text"], "Hi there!");
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(OffsetDateTime::parse(timestamp, &Rfc3339).is_ok());
    }
}
