//! Relay WebSocket handler
//!
//! Accepts browser connections, registers a [`Session`] for each and drives
//! it until the socket closes. Outgoing frames go through one bounded queue
//! drained by a dedicated writer task.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::messages::{
    IncomingMessage, MessageRoute, OutgoingMessage, PresenceStatus, ValidationError, codes,
};
use super::registry::SessionHandle;
use super::session::{Session, SessionError, SessionServices};

/// Outbound queue depth per client
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How often an idle connection is checked for staleness
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Time the writer gets to flush queued frames and send Close
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to a relay session.
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let idle_timeout = Duration::from_secs(app_state.config.idle_timeout_seconds);
    run_relay_session(socket, app_state.session_services(), idle_timeout).await;
}

/// Drive one client socket from registration to teardown.
pub async fn run_relay_session(socket: WebSocket, services: SessionServices, idle_timeout: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let registry = services.registry.clone();
    let close_signal = CancellationToken::new();
    let session_id = registry.register(SessionHandle::new(
        message_tx.clone(),
        close_signal.clone(),
    ));
    let mut session = Session::new(session_id.clone(), message_tx.clone(), services);

    info!(session_id = %session_id, clients = registry.len(), "Relay session connected");

    if session.greet().await.is_ok() {
        registry.broadcast(
            &OutgoingMessage::Presence {
                client_id: session_id.clone(),
                status: PresenceStatus::Joined,
                clients: registry.len(),
            },
            Some(&session_id),
        );

        let check_interval = IDLE_CHECK_INTERVAL.min(idle_timeout);
        let mut last_activity = Instant::now();

        loop {
            select! {
                _ = close_signal.cancelled() => {
                    info!(session_id = %session_id, "Relay session closed by registry");
                    break;
                }
                msg_result = receiver.next() => {
                    last_activity = Instant::now();

                    match msg_result {
                        Some(Ok(msg)) => match process_client_frame(msg, &mut session).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                warn!(session_id = %session_id, "Ending relay session: {e}");
                                break;
                            }
                        },
                        Some(Err(e)) => {
                            warn!(session_id = %session_id, "Relay WebSocket error: {}", e);
                            break;
                        }
                        None => {
                            info!(session_id = %session_id, "Relay WebSocket closed by client");
                            break;
                        }
                    }
                }
                activity = session.next_activity() => {
                    last_activity = Instant::now();

                    if let Err(e) = session.handle_activity(activity).await {
                        warn!(session_id = %session_id, "Ending relay session: {e}");
                        break;
                    }
                }
                _ = tokio::time::sleep(check_interval) => {
                    if session.is_idle() && last_activity.elapsed() >= idle_timeout {
                        warn!(
                            session_id = %session_id,
                            "Relay session idle for {}s, closing stale connection",
                            last_activity.elapsed().as_secs()
                        );
                        let _ = message_tx
                            .send(MessageRoute::Outgoing(OutgoingMessage::error(
                                codes::IDLE_TIMEOUT,
                                "Connection closed due to inactivity",
                            )))
                            .await;
                        break;
                    }
                }
            }
        }
    }

    // Upstream first, then the registry entry
    session.shutdown();
    registry.deregister(&session_id);
    session.mark_closed();
    drop(session);

    registry.broadcast(
        &OutgoingMessage::Presence {
            client_id: session_id.clone(),
            status: PresenceStatus::Left,
            clients: registry.len(),
        },
        None,
    );

    let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, message_tx.send(MessageRoute::Close)).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    info!(session_id = %session_id, "Relay session terminated");
}

/// Process one inbound frame. Returns `false` when the client asked to close.
async fn process_client_frame(msg: Message, session: &mut Session) -> Result<bool, SessionError> {
    match msg {
        Message::Text(text) => {
            debug!(session_id = %session.id(), "Received text message: {} bytes", text.len());

            match IncomingMessage::parse(text.as_str()) {
                Ok(message) => session.handle_message(message).await?,
                Err(e) => session.reject(&SessionError::Decode(e)).await?,
            }
            Ok(true)
        }
        Message::Binary(data) => {
            debug!(session_id = %session.id(), "Rejecting binary frame: {} bytes", data.len());
            session
                .reject(&SessionError::Decode(ValidationError::BinaryFrame))
                .await?;
            Ok(true)
        }
        Message::Ping(_) | Message::Pong(_) => Ok(true),
        Message::Close(_) => {
            debug!(session_id = %session.id(), "Relay WebSocket close received");
            Ok(false)
        }
    }
}
