//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `relay` - Browser voice relay WebSocket
//! - `speak` - Text-to-speech REST API

pub mod api;
pub mod relay;
pub mod speak;

pub use relay::relay_handler;
