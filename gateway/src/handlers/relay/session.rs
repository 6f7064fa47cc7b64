//! Per-client relay session.
//!
//! A session runs on its client's socket loop. It owns at most one
//! utterance at a time: a generation task, then an upstream connect task,
//! then a streaming [`UpstreamChannel`]. Long-running work is spawned and
//! its result comes back through [`Session::next_activity`], so every
//! state change and every client write happens on the loop task.
//!
//! An utterance is either a generated response (`chat`, `audioRequest`) or
//! a client-driven stream (`startTTS`, `sendText`, `finalizeTTS`). Stream
//! text that arrives before the upstream is ready is buffered and flushed
//! once it connects.

use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::core::llm::{GenerationError, GenerationResult, TextGenerator};
use crate::core::tts::{
    SynthesisConnector, SynthesisError, SynthesisRequest, SynthesisResult, UpstreamChannel,
    UpstreamEvent, UpstreamState, chunk_for_synthesis,
};

use super::messages::{
    Activity, IncomingMessage, MessageRoute, OutgoingMessage, ValidationError, codes,
};
use super::registry::{SessionId, SessionRegistry};

/// Errors that end or affect a relay session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A client frame could not be decoded. The session stays open.
    #[error("Failed to decode client message: {0}")]
    Decode(#[from] ValidationError),

    /// The client writer is gone. Fatal to this session only.
    #[error("Client transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Shared collaborators a session needs.
#[derive(Clone)]
pub struct SessionServices {
    pub generator: Arc<dyn TextGenerator>,
    pub connector: Arc<dyn SynthesisConnector>,
    pub registry: Arc<SessionRegistry>,
    pub voice_id: String,
    pub model_id: String,
    pub max_chunk_chars: usize,
}

/// Result of in-flight work, delivered back to the session loop.
#[derive(Debug)]
pub enum SessionActivity {
    Generated(GenerationResult<String>),
    Connected(SynthesisResult<UpstreamChannel>),
    /// `None` once the channel has finished.
    Upstream(Option<UpstreamEvent>),
}

/// Text waiting on an upstream connect.
enum PendingInput {
    /// A whole response, chunked and finalized as soon as the channel opens.
    Response(String),
    /// Client-driven stream text received so far.
    Stream { buffered: Vec<String>, finalize: bool },
}

enum Utterance {
    Idle,
    Generating(JoinHandle<GenerationResult<String>>),
    Connecting {
        task: JoinHandle<SynthesisResult<UpstreamChannel>>,
        input: PendingInput,
    },
    Streaming {
        channel: UpstreamChannel,
        client_driven: bool,
    },
}

pub struct Session {
    id: SessionId,
    state: SessionState,
    outbound: mpsc::Sender<MessageRoute>,
    services: SessionServices,
    utterance: Utterance,
    last_response: Option<String>,
}

impl Session {
    pub fn new(id: SessionId, outbound: mpsc::Sender<MessageRoute>, services: SessionServices) -> Self {
        Self {
            id,
            state: SessionState::Open,
            outbound,
            services,
            utterance: Utterance::Idle,
            last_response: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether no utterance is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self.utterance, Utterance::Idle)
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// State of the active upstream channel, if one is streaming.
    pub fn upstream_state(&self) -> Option<UpstreamState> {
        match &self.utterance {
            Utterance::Streaming { channel, .. } => Some(channel.state()),
            _ => None,
        }
    }

    /// Send the welcome frame.
    pub async fn greet(&self) -> Result<(), SessionError> {
        self.send(OutgoingMessage::Connected {
            client_id: self.id.clone(),
            message: "Connected to voice relay".to_string(),
        })
        .await
    }

    /// Dispatch one decoded client message.
    ///
    /// Only a dead client writer is returned as an error; everything else is
    /// reported to the client as an `error` frame.
    pub async fn handle_message(&mut self, message: IncomingMessage) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Ok(());
        }

        let message = match message {
            IncomingMessage::SendText { text } => return self.stream_text(text).await,
            IncomingMessage::FinalizeTts => return self.finalize_stream().await,
            other => other,
        };

        if !self.is_idle() {
            debug!(session_id = %self.id, "Rejecting request while an utterance is in flight");
            return self
                .send(OutgoingMessage::error(
                    codes::BUSY,
                    "A response is already in progress",
                ))
                .await;
        }

        match message {
            IncomingMessage::Chat { text } => {
                info!(session_id = %self.id, chars = text.chars().count(), "Chat received");
                let generator = self.services.generator.clone();
                let task = tokio::spawn(async move { generator.generate(&text).await });
                self.utterance = Utterance::Generating(task);
                Ok(())
            }
            IncomingMessage::AudioRequest => match self.last_response.clone() {
                Some(text) => {
                    let voice_id = self.services.voice_id.clone();
                    self.start_synthesis(voice_id, PendingInput::Response(text))
                        .await
                }
                None => {
                    self.send(OutgoingMessage::error(
                        codes::NO_RESPONSE,
                        "No previous response to synthesize",
                    ))
                    .await
                }
            },
            IncomingMessage::StartTts { voice_id } => {
                let voice_id = voice_id
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| self.services.voice_id.clone());
                info!(session_id = %self.id, voice_id = %voice_id, "Client-driven stream requested");
                let input = PendingInput::Stream {
                    buffered: Vec::new(),
                    finalize: false,
                };
                self.start_synthesis(voice_id, input).await
            }
            IncomingMessage::SendText { .. } | IncomingMessage::FinalizeTts => Ok(()),
        }
    }

    /// Forward `sendText` into the open stream, or buffer it while the
    /// upstream is still connecting.
    async fn stream_text(&mut self, text: String) -> Result<(), SessionError> {
        let sent = match &mut self.utterance {
            Utterance::Connecting {
                input: PendingInput::Stream {
                    buffered,
                    finalize: false,
                },
                ..
            } => {
                buffered.push(text);
                return Ok(());
            }
            Utterance::Streaming {
                channel,
                client_driven: true,
            } if channel.state().accepts_text() => channel.send_text(&text, true),
            _ => return self.reject_stream_command().await,
        };

        match sent {
            Ok(()) => Ok(()),
            Err(e) => self.abort_synthesis(e).await,
        }
    }

    /// Handle `finalizeTTS`. Repeated calls are no-ops.
    async fn finalize_stream(&mut self) -> Result<(), SessionError> {
        let finalized = match &mut self.utterance {
            Utterance::Connecting {
                input: PendingInput::Stream { finalize, .. },
                ..
            } => {
                *finalize = true;
                return Ok(());
            }
            Utterance::Streaming {
                channel,
                client_driven: true,
            } => channel.finalize(),
            _ => return self.reject_stream_command().await,
        };

        match finalized {
            Ok(()) => Ok(()),
            Err(e) => self.abort_synthesis(e).await,
        }
    }

    async fn reject_stream_command(&self) -> Result<(), SessionError> {
        debug!(session_id = %self.id, "Stream command without an open stream");
        self.send(OutgoingMessage::error(
            codes::NO_STREAM,
            "No synthesis stream is open; send startTTS first",
        ))
        .await
    }

    /// Report a frame that could not be decoded.
    pub async fn reject(&self, error: &SessionError) -> Result<(), SessionError> {
        warn!(session_id = %self.id, "Invalid client frame: {error}");
        self.send(OutgoingMessage::error(codes::PARSE_ERROR, error.to_string()))
            .await
    }

    /// Wait for the in-flight utterance to make progress.
    ///
    /// Pends forever while idle. Cancel safe, for use in `select!`.
    pub async fn next_activity(&mut self) -> SessionActivity {
        match &mut self.utterance {
            Utterance::Idle => std::future::pending().await,
            Utterance::Generating(task) => SessionActivity::Generated(match task.await {
                Ok(result) => result,
                Err(e) => Err(GenerationError::RequestFailed(format!(
                    "generation task failed: {e}"
                ))),
            }),
            Utterance::Connecting { task, .. } => SessionActivity::Connected(match task.await {
                Ok(result) => result,
                Err(e) => Err(SynthesisError::UpstreamConnect(format!(
                    "connect task failed: {e}"
                ))),
            }),
            Utterance::Streaming { channel, .. } => {
                SessionActivity::Upstream(channel.next_event().await)
            }
        }
    }

    pub async fn handle_activity(&mut self, activity: SessionActivity) -> Result<(), SessionError> {
        match activity {
            SessionActivity::Generated(result) => {
                self.utterance = Utterance::Idle;
                self.on_generated(result).await
            }
            SessionActivity::Connected(result) => {
                let input = match std::mem::replace(&mut self.utterance, Utterance::Idle) {
                    Utterance::Connecting { input, .. } => input,
                    other => {
                        self.utterance = other;
                        return Ok(());
                    }
                };
                self.on_connected(result, input).await
            }
            SessionActivity::Upstream(event) => self.on_upstream_event(event).await,
        }
    }

    /// Stop in-flight work and close the upstream channel, if any.
    ///
    /// Moves the session to `Closing`; the caller deregisters it and then
    /// calls [`mark_closed`](Self::mark_closed).
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        match std::mem::replace(&mut self.utterance, Utterance::Idle) {
            Utterance::Idle => {}
            Utterance::Generating(task) => task.abort(),
            Utterance::Connecting { task, .. } => task.abort(),
            Utterance::Streaming { mut channel, .. } => channel.close(),
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }

    async fn on_generated(&mut self, result: GenerationResult<String>) -> Result<(), SessionError> {
        match result {
            Ok(text) => {
                info!(
                    session_id = %self.id,
                    model = %self.services.generator.model(),
                    chars = text.chars().count(),
                    "Generated response"
                );
                self.last_response = Some(text.clone());
                self.send(OutgoingMessage::chat_response(text.clone()))
                    .await?;
                let voice_id = self.services.voice_id.clone();
                self.start_synthesis(voice_id, PendingInput::Response(text))
                    .await
            }
            Err(e) => {
                warn!(session_id = %self.id, "Generation failed: {e}");
                self.send(OutgoingMessage::error(codes::GENERATION_FAILED, e.to_string()))
                    .await?;
                self.notify(Activity::Failed);
                Ok(())
            }
        }
    }

    async fn start_synthesis(
        &mut self,
        voice_id: String,
        input: PendingInput,
    ) -> Result<(), SessionError> {
        self.send(OutgoingMessage::generating()).await?;

        let connector = self.services.connector.clone();
        let request = SynthesisRequest {
            session_id: self.id.to_string(),
            voice_id,
            model_id: self.services.model_id.clone(),
        };
        let task = tokio::spawn(async move { connector.open(request).await });
        self.utterance = Utterance::Connecting { task, input };
        Ok(())
    }

    async fn on_connected(
        &mut self,
        result: SynthesisResult<UpstreamChannel>,
        input: PendingInput,
    ) -> Result<(), SessionError> {
        let mut channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                warn!(session_id = %self.id, "Upstream connect failed: {e}");
                self.send(OutgoingMessage::error(
                    codes::SYNTHESIS_UNAVAILABLE,
                    e.to_string(),
                ))
                .await?;
                self.notify(Activity::Failed);
                return Ok(());
            }
        };

        let (chunks, finalize, client_driven) = match input {
            PendingInput::Response(text) => (
                chunk_for_synthesis(&text, self.services.max_chunk_chars),
                true,
                false,
            ),
            PendingInput::Stream { buffered, finalize } => (buffered, finalize, true),
        };

        let streamed = chunks
            .iter()
            .try_for_each(|chunk| channel.send_text(chunk, true))
            .and_then(|()| if finalize { channel.finalize() } else { Ok(()) });

        match streamed {
            Ok(()) => {
                debug!(
                    session_id = %self.id,
                    chunks = chunks.len(),
                    client_driven,
                    "Text streamed to synthesis"
                );
                self.utterance = Utterance::Streaming {
                    channel,
                    client_driven,
                };
                Ok(())
            }
            Err(e) => {
                channel.close();
                warn!(session_id = %self.id, "Failed to stream text upstream: {e}");
                self.send(OutgoingMessage::error(codes::SYNTHESIS_FAILED, e.to_string()))
                    .await?;
                self.notify(Activity::Failed);
                Ok(())
            }
        }
    }

    async fn on_upstream_event(&mut self, event: Option<UpstreamEvent>) -> Result<(), SessionError> {
        match event {
            Some(UpstreamEvent::AudioChunk(bytes)) => {
                self.send(OutgoingMessage::AudioChunk {
                    audio: BASE64_STANDARD.encode(&bytes),
                })
                .await
            }
            Some(UpstreamEvent::Alignment(alignment)) => {
                trace!(session_id = %self.id, chars = alignment.chars.len(), "Alignment received");
                Ok(())
            }
            Some(UpstreamEvent::Complete) => {
                let size = self.end_utterance();
                info!(session_id = %self.id, audio_bytes = size, "Utterance complete");
                self.send(OutgoingMessage::AudioComplete { size }).await?;
                self.notify(Activity::Completed);
                Ok(())
            }
            Some(UpstreamEvent::Failed(reason)) => {
                self.end_utterance();
                self.send(OutgoingMessage::error(codes::SYNTHESIS_FAILED, reason))
                    .await?;
                self.notify(Activity::Failed);
                Ok(())
            }
            Some(UpstreamEvent::Closed) | None => {
                let size = self.end_utterance();
                info!(session_id = %self.id, audio_bytes = size, "Upstream closed before completion");
                self.send(OutgoingMessage::error(
                    codes::SYNTHESIS_INTERRUPTED,
                    format!("Synthesis ended early after {size} audio bytes"),
                ))
                .await?;
                self.notify(Activity::Interrupted);
                Ok(())
            }
        }
    }

    /// End the utterance after a failed upstream write.
    async fn abort_synthesis(&mut self, error: SynthesisError) -> Result<(), SessionError> {
        self.end_utterance();
        warn!(session_id = %self.id, "Failed to stream text upstream: {error}");
        self.send(OutgoingMessage::error(codes::SYNTHESIS_FAILED, error.to_string()))
            .await?;
        self.notify(Activity::Failed);
        Ok(())
    }

    /// Drop the current utterance, closing its channel. Returns the audio
    /// byte count it delivered.
    fn end_utterance(&mut self) -> u64 {
        match std::mem::replace(&mut self.utterance, Utterance::Idle) {
            Utterance::Streaming { mut channel, .. } => {
                let size = channel.audio_bytes();
                channel.close();
                size
            }
            Utterance::Generating(task) => {
                task.abort();
                0
            }
            Utterance::Connecting { task, .. } => {
                task.abort();
                0
            }
            Utterance::Idle => 0,
        }
    }

    fn notify(&self, activity: Activity) {
        let report = self.services.registry.broadcast(
            &OutgoingMessage::UserActivity {
                client_id: self.id.clone(),
                activity,
            },
            Some(&self.id),
        );
        trace!(session_id = %self.id, ?activity, ?report, "Activity broadcast");
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), SessionError> {
        self.outbound
            .send(MessageRoute::Outgoing(message))
            .await
            .map_err(|_| SessionError::Transport("client writer closed".to_string()))
    }
}
