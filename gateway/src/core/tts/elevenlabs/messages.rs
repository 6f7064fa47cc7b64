//! ElevenLabs wire message types.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::tts::base::{
    Alignment, SynthesisError, SynthesisResult, UpstreamCommand, UpstreamEvent,
};

use super::config::VoiceSettings;

// =============================================================================
// Outbound (stream-input)
// =============================================================================

/// Frame sent on the stream-input socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// First frame on a new socket: a single space plus settings and key.
    Handshake {
        text: String,
        voice_settings: VoiceSettings,
        xi_api_key: String,
    },
    Text {
        text: String,
        try_trigger_generation: bool,
    },
    /// Empty text flushes the buffer and ends generation.
    EndOfInput { text: String },
}

impl OutboundFrame {
    pub fn handshake(voice_settings: VoiceSettings, api_key: &str) -> Self {
        Self::Handshake {
            text: " ".to_string(),
            voice_settings,
            xi_api_key: api_key.to_string(),
        }
    }

    pub fn to_json(&self) -> SynthesisResult<String> {
        serde_json::to_string(self).map_err(|e| SynthesisError::Serialization(e.to_string()))
    }
}

impl From<UpstreamCommand> for OutboundFrame {
    fn from(command: UpstreamCommand) -> Self {
        match command {
            UpstreamCommand::Text {
                text,
                try_trigger_generation,
            } => Self::Text {
                text,
                try_trigger_generation,
            },
            UpstreamCommand::EndOfInput => Self::EndOfInput {
                text: String::new(),
            },
        }
    }
}

// =============================================================================
// Inbound (stream-input)
// =============================================================================

/// Frame received on the stream-input socket.
///
/// Audio frames, the final marker and error reports share one loose shape;
/// ElevenLabs sends explicit `null`s for fields that do not apply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamResponse {
    pub audio: Option<String>,
    pub is_final: Option<bool>,
    pub alignment: Option<Alignment>,
    pub normalized_alignment: Option<Alignment>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl StreamResponse {
    pub fn parse(text: &str) -> SynthesisResult<Self> {
        serde_json::from_str(text).map_err(|e| SynthesisError::Serialization(e.to_string()))
    }

    /// Translate this frame into channel events, in delivery order.
    ///
    /// Audio comes before its alignment and both come before `Complete`.
    /// Undecodable audio yields `Failed`, since a silent gap is audible.
    pub fn into_events(self) -> Vec<UpstreamEvent> {
        if self.error.is_some() {
            let reason = match (self.error, self.message) {
                (Some(error), Some(message)) => format!("{error}: {message}"),
                (Some(error), None) => error,
                (None, Some(message)) => message,
                (None, None) => "unknown backend error".to_string(),
            };
            return vec![UpstreamEvent::Failed(reason)];
        }

        let mut events = Vec::with_capacity(3);

        if let Some(audio) = self.audio.filter(|a| !a.is_empty()) {
            match BASE64_STANDARD.decode(audio.as_bytes()) {
                Ok(bytes) => events.push(UpstreamEvent::AudioChunk(Bytes::from(bytes))),
                Err(e) => {
                    events.push(UpstreamEvent::Failed(format!(
                        "invalid base64 audio from backend: {e}"
                    )));
                    return events;
                }
            }
        }

        if let Some(alignment) = self.alignment {
            events.push(UpstreamEvent::Alignment(alignment));
        }

        if self.is_final == Some(true) {
            events.push(UpstreamEvent::Complete);
        }

        events
    }
}

// =============================================================================
// REST
// =============================================================================

/// Body of `POST /v1/text-to-speech/{voice_id}[/stream]`.
#[derive(Debug, Clone, Serialize)]
pub struct TtsRequestBody<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
    pub voice_settings: &'a VoiceSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_frame_shape() {
        let frame = OutboundFrame::handshake(VoiceSettings::default(), "xi-key");
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "text": " ",
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                    "style": 0.5,
                    "use_speaker_boost": true
                },
                "xi_api_key": "xi-key"
            })
        );
    }

    #[test]
    fn test_text_and_end_frames() {
        let text: OutboundFrame = UpstreamCommand::Text {
            text: "Hi there! ".to_string(),
            try_trigger_generation: true,
        }
        .into();
        assert_eq!(
            text.to_json().unwrap(),
            r#"{"text":"Hi there! ","try_trigger_generation":true}"#
        );

        let end: OutboundFrame = UpstreamCommand::EndOfInput.into();
        assert_eq!(end.to_json().unwrap(), r#"{"text":""}"#);
    }

    #[test]
    fn test_audio_frame_with_alignment() {
        let frame = StreamResponse::parse(
            r#"{"audio":"AAEC","isFinal":null,"alignment":{"chars":["H"],"charStartTimesMs":[0],"charDurationsMs":[50]}}"#,
        )
        .unwrap();
        let events = frame.into_events();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            UpstreamEvent::AudioChunk(Bytes::from_static(&[0, 1, 2]))
        );
        assert!(matches!(events[1], UpstreamEvent::Alignment(_)));
    }

    #[test]
    fn test_final_frame() {
        let events = StreamResponse::parse(r#"{"isFinal":true}"#)
            .unwrap()
            .into_events();
        assert_eq!(events, vec![UpstreamEvent::Complete]);
    }

    #[test]
    fn test_null_audio_is_skipped() {
        let events = StreamResponse::parse(r#"{"audio":null,"isFinal":false}"#)
            .unwrap()
            .into_events();
        assert!(events.is_empty());
    }

    #[test]
    fn test_error_frame() {
        let events = StreamResponse::parse(
            r#"{"message":"Invalid API key","error":"invalid_api_key","code":1008}"#,
        )
        .unwrap()
        .into_events();
        assert_eq!(
            events,
            vec![UpstreamEvent::Failed(
                "invalid_api_key: Invalid API key".to_string()
            )]
        );
    }

    #[test]
    fn test_invalid_base64_fails() {
        let events = StreamResponse::parse(r#"{"audio":"%%%not-base64"}"#)
            .unwrap()
            .into_events();
        assert!(matches!(events.as_slice(), [UpstreamEvent::Failed(_)]));
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            StreamResponse::parse("not json"),
            Err(SynthesisError::Serialization(_))
        ));
    }

    #[test]
    fn test_rest_body() {
        let settings = VoiceSettings::default();
        let body = TtsRequestBody {
            text: "Hello",
            model_id: "eleven_turbo_v2_5",
            voice_settings: &settings,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["text"], "Hello");
        assert_eq!(value["model_id"], "eleven_turbo_v2_5");
        assert_eq!(value["voice_settings"]["similarity_boost"], 0.75);
    }
}
