//! Process-wide table of live relay sessions.
//!
//! The registry hands out session ids, tracks each session's outbound
//! queue, and fans presence and activity events out to every other
//! session. Broadcast never blocks: a full recipient queue drops that one
//! notification, a closed queue triggers that recipient's close path.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::{MessageRoute, OutgoingMessage};

/// Opaque unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the registry holds for each live session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<MessageRoute>,
    close: CancellationToken,
    dropped_notifications: Arc<AtomicU64>,
}

impl SessionHandle {
    /// `close` is cancelled when a broadcast finds the session's queue closed.
    pub fn new(sender: mpsc::Sender<MessageRoute>, close: CancellationToken) -> Self {
        Self {
            sender,
            close,
            dropped_notifications: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Broadcast notifications dropped because this session's queue was full.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}

/// Per-call delivery tally returned by [`SessionRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session under a fresh id.
    pub fn register(&self, handle: SessionHandle) -> SessionId {
        loop {
            let id = SessionId::generate();
            if let Entry::Vacant(entry) = self.sessions.entry(id.clone()) {
                entry.insert(handle);
                debug!(session_id = %id, "Registered relay session");
                return id;
            }
        }
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn deregister(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Deregistered relay session");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn dropped_notifications(&self, id: &SessionId) -> Option<u64> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().dropped_notifications())
    }

    /// Deliver `message` to every registered session except `exclude`.
    ///
    /// Sends are non-blocking and happen while the map shard is read-locked,
    /// so a session that has been deregistered is never a recipient.
    pub fn broadcast(
        &self,
        message: &OutgoingMessage,
        exclude: Option<&SessionId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for entry in self.sessions.iter() {
            if exclude == Some(entry.key()) {
                continue;
            }

            let handle = entry.value();
            match handle
                .sender
                .try_send(MessageRoute::Outgoing(message.clone()))
            {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let dropped = handle.dropped_notifications.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        session_id = %entry.key(),
                        dropped_total = dropped,
                        "Outbound queue full, dropping broadcast notification"
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %entry.key(), "Broadcast recipient closed, signalling teardown");
                    handle.close.cancel();
                    report.closed += 1;
                }
            }
        }

        report
    }
}
