//! Mock provider servers for integration tests
//!
//! - `synthesis_ws` - ElevenLabs stream-input WebSocket
//! - `gemini` - wiremock responders for `generateContent`

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod gemini;
pub mod synthesis_ws;
