//! Upstream synthesis channel.
//!
//! The channel is the session-side handle of one backend connection. The
//! socket itself lives in a transport task owned by the connector; the two
//! sides talk over a command queue (text out) and a bounded event queue
//! (audio and metadata in). All state transitions happen here, on the task
//! that owns the channel, so the owner always observes a consistent state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{
    SynthesisError, SynthesisRequest, SynthesisResult, UpstreamCommand, UpstreamEvent,
    UpstreamState,
};

/// Capacity of the transport -> channel event queue.
///
/// When the owner stops draining events the transport blocks on this queue
/// and stops reading the backend socket.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long a transport task gets to send its close frame and exit after
/// cancellation before it is aborted.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Handle to the task that owns the backend socket.
pub struct UpstreamTransport {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl UpstreamTransport {
    pub fn new(handle: JoinHandle<()>, shutdown: CancellationToken) -> Self {
        Self { handle, shutdown }
    }

    /// Signal the task to close its socket and reap it within [`CLOSE_GRACE_PERIOD`].
    fn shutdown(self) {
        self.shutdown.cancel();

        let mut handle = self.handle;
        if handle.is_finished() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if tokio::time::timeout(CLOSE_GRACE_PERIOD, &mut handle)
                        .await
                        .is_err()
                    {
                        warn!("Upstream transport did not exit within grace period, aborting");
                        handle.abort();
                    }
                });
            }
            Err(_) => handle.abort(),
        }
    }
}

/// One duplex connection to the synthesis backend for a single utterance.
pub struct UpstreamChannel {
    request: SynthesisRequest,
    state: UpstreamState,
    audio_bytes: u64,
    audio_chunks: u64,
    commands: mpsc::UnboundedSender<UpstreamCommand>,
    events: mpsc::Receiver<UpstreamEvent>,
    transport: Option<UpstreamTransport>,
}

impl UpstreamChannel {
    /// Wrap the queues of a freshly connected transport.
    ///
    /// The channel starts in `Connecting`; the connector calls
    /// [`mark_ready`](Self::mark_ready) once the backend handshake is sent.
    /// The command queue is unbounded: it only ever holds the text of one
    /// generated response.
    pub fn new(
        request: SynthesisRequest,
        commands: mpsc::UnboundedSender<UpstreamCommand>,
        events: mpsc::Receiver<UpstreamEvent>,
        transport: Option<UpstreamTransport>,
    ) -> Self {
        Self {
            request,
            state: UpstreamState::Connecting,
            audio_bytes: 0,
            audio_chunks: 0,
            commands,
            events,
            transport,
        }
    }

    /// `Connecting -> Ready`. No effect in any other state.
    pub fn mark_ready(&mut self) {
        if self.state == UpstreamState::Connecting {
            self.state = UpstreamState::Ready;
        }
    }

    pub fn state(&self) -> UpstreamState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.request.session_id
    }

    pub fn voice_id(&self) -> &str {
        &self.request.voice_id
    }

    pub fn model_id(&self) -> &str {
        &self.request.model_id
    }

    /// Total bytes of audio received on this channel so far.
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    pub fn audio_chunks(&self) -> u64 {
        self.audio_chunks
    }

    /// Send one text chunk with a trailing space delimiter.
    ///
    /// Valid only in `Ready` or `Streaming`. Whitespace-only chunks are
    /// skipped since the backend treats a lone space as a keep-alive.
    pub fn send_text(&mut self, chunk: &str, try_trigger_generation: bool) -> SynthesisResult<()> {
        if !self.state.accepts_text() {
            return Err(SynthesisError::NotReady(self.state));
        }

        let trimmed = chunk.trim_end();
        if trimmed.trim_start().is_empty() {
            return Ok(());
        }

        let command = UpstreamCommand::Text {
            text: format!("{trimmed} "),
            try_trigger_generation,
        };
        self.dispatch(command)?;
        self.state = UpstreamState::Streaming;
        Ok(())
    }

    /// Tell the backend no more text is coming.
    ///
    /// Idempotent: a second call, or a call after the channel finished, is a no-op.
    pub fn finalize(&mut self) -> SynthesisResult<()> {
        match self.state {
            UpstreamState::Ready | UpstreamState::Streaming => {
                self.dispatch(UpstreamCommand::EndOfInput)?;
                self.state = UpstreamState::Finalizing;
                Ok(())
            }
            UpstreamState::Finalizing | UpstreamState::Closed | UpstreamState::Failed => Ok(()),
            UpstreamState::Connecting => Err(SynthesisError::NotReady(self.state)),
        }
    }

    /// Wait for the next backend event.
    ///
    /// Returns `None` once the channel is terminal. A transport that goes
    /// away without a terminal event is reported as `Closed`. Cancel safe.
    pub async fn next_event(&mut self) -> Option<UpstreamEvent> {
        if self.state.is_terminal() {
            return None;
        }

        let event = self.events.recv().await.unwrap_or(UpstreamEvent::Closed);
        self.observe(&event);
        Some(event)
    }

    /// Tear the channel down from any state. Always ends in `Closed`, and no
    /// event is delivered afterwards.
    pub fn close(&mut self) {
        if self.state != UpstreamState::Closed || self.transport.is_some() {
            debug!(
                session_id = %self.request.session_id,
                state = %self.state,
                audio_bytes = self.audio_bytes,
                "Closing upstream synthesis channel"
            );
        }
        self.state = UpstreamState::Closed;
        self.release();
    }

    fn dispatch(&mut self, command: UpstreamCommand) -> SynthesisResult<()> {
        if self.commands.send(command).is_err() {
            self.state = UpstreamState::Failed;
            self.release();
            return Err(SynthesisError::Transport(
                "upstream transport task has exited".to_string(),
            ));
        }
        Ok(())
    }

    fn observe(&mut self, event: &UpstreamEvent) {
        match event {
            UpstreamEvent::AudioChunk(bytes) => {
                self.audio_bytes += bytes.len() as u64;
                self.audio_chunks += 1;
            }
            UpstreamEvent::Alignment(_) => {}
            UpstreamEvent::Complete | UpstreamEvent::Closed => {
                self.state = UpstreamState::Closed;
                self.release();
            }
            UpstreamEvent::Failed(reason) => {
                warn!(
                    session_id = %self.request.session_id,
                    reason = %reason,
                    "Upstream synthesis channel failed"
                );
                self.state = UpstreamState::Failed;
                self.release();
            }
        }
    }

    fn release(&mut self) {
        self.events.close();
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }
}

impl std::fmt::Debug for UpstreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamChannel")
            .field("session_id", &self.request.session_id)
            .field("voice_id", &self.request.voice_id)
            .field("state", &self.state)
            .field("audio_bytes", &self.audio_bytes)
            .finish_non_exhaustive()
    }
}

impl Drop for UpstreamChannel {
    fn drop(&mut self) {
        self.release();
    }
}
