//! Browser-facing voice relay
//!
//! - `messages` - wire types for the client socket
//! - `registry` - live session table and broadcast
//! - `session` - per-client utterance state machine
//! - `handler` - WebSocket upgrade and session loop

pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use handler::{relay_handler, run_relay_session};
pub use messages::{IncomingMessage, MessageRoute, OutgoingMessage};
pub use registry::{SessionHandle, SessionId, SessionRegistry};
pub use session::{Session, SessionError, SessionServices, SessionState};
