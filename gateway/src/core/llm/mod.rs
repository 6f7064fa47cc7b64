mod base;
pub mod gemini;

pub use base::{GenerationError, GenerationResult, TextGenerator};
pub use gemini::{GeminiClient, GeminiConfig};
