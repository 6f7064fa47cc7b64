//! Google Gemini text generation.
//!
//! Uses the `generateContent` REST method:
//!
//! ```text
//! POST {base}/v1beta/models/{model}:generateContent
//! x-goog-api-key: ...
//! {"contents":[{"role":"user","parts":[{"text":"Hello"}]}]}
//! ```

pub mod client;
pub mod config;
pub mod messages;

pub use client::GeminiClient;
pub use config::GeminiConfig;

/// Base URL of the Generative Language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Default request timeout, covering connect and full response.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
