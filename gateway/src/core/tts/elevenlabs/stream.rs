//! ElevenLabs stream-input connector.
//!
//! Each [`open`](SynthesisConnector::open) call dials a fresh socket, sends
//! the handshake and spawns a transport task that owns both halves of the
//! socket. The task forwards channel commands as JSON frames and turns
//! backend frames into [`UpstreamEvent`]s.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::core::tts::base::{
    SynthesisConnector, SynthesisError, SynthesisRequest, SynthesisResult, UpstreamCommand,
    UpstreamEvent,
};
use crate::core::tts::channel::{
    CLOSE_GRACE_PERIOD, EVENT_CHANNEL_CAPACITY, UpstreamChannel, UpstreamTransport,
};

use super::config::{ElevenLabsConfig, endpoint_url};
use super::messages::{OutboundFrame, StreamResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Opens ElevenLabs stream-input channels.
pub struct ElevenLabsConnector {
    config: ElevenLabsConfig,
}

impl ElevenLabsConnector {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ElevenLabsConfig {
        &self.config
    }

    /// `{ws_base}/v1/text-to-speech/{voice_id}/stream-input?model_id={model_id}`
    pub fn stream_input_url(&self, voice_id: &str, model_id: &str) -> SynthesisResult<Url> {
        let mut url = endpoint_url(
            &self.config.ws_base_url,
            &["v1", "text-to-speech", voice_id, "stream-input"],
        )?;
        url.query_pairs_mut().append_pair("model_id", model_id);
        Ok(url)
    }

    async fn dial(&self, url: &Url, handshake: String) -> SynthesisResult<(WsSink, WsSource)> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| SynthesisError::UpstreamConnect(e.to_string()))?;

        let (mut sink, source) = ws_stream.split();
        sink.send(Message::Text(handshake.into()))
            .await
            .map_err(|e| SynthesisError::UpstreamConnect(format!("handshake failed: {e}")))?;

        Ok((sink, source))
    }
}

#[async_trait]
impl SynthesisConnector for ElevenLabsConnector {
    async fn open(&self, request: SynthesisRequest) -> SynthesisResult<UpstreamChannel> {
        let api_key = self
            .config
            .require_api_key()
            .map_err(|e| SynthesisError::UpstreamConnect(e.to_string()))?;
        let url = self.stream_input_url(&request.voice_id, &request.model_id)?;
        let handshake =
            OutboundFrame::handshake(self.config.voice_settings.clone(), api_key).to_json()?;

        debug!(
            session_id = %request.session_id,
            voice_id = %request.voice_id,
            model_id = %request.model_id,
            "Opening ElevenLabs stream-input socket"
        );

        let (sink, source) =
            match tokio::time::timeout(self.config.connect_timeout, self.dial(&url, handshake))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(SynthesisError::UpstreamConnect(format!(
                        "connect timed out after {}s",
                        self.config.connect_timeout.as_secs_f32()
                    )));
                }
            };

        info!(
            session_id = %request.session_id,
            voice_id = %request.voice_id,
            "Connected to ElevenLabs stream-input"
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_transport(
            sink,
            source,
            command_rx,
            event_tx,
            shutdown.clone(),
            request.session_id.clone(),
        ));

        let mut channel = UpstreamChannel::new(
            request,
            command_tx,
            event_rx,
            Some(UpstreamTransport::new(handle, shutdown)),
        );
        channel.mark_ready();
        Ok(channel)
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Owns the socket for one utterance.
///
/// Exits after a terminal event, on cancellation, or once the channel side
/// is gone. A backend frame that does not parse fails the channel, since
/// any audio it carried is lost. Event delivery awaits queue capacity, so a slow owner stalls
/// reads from the backend instead of growing memory.
async fn run_transport(
    mut sink: WsSink,
    mut source: WsSource,
    mut commands: mpsc::UnboundedReceiver<UpstreamCommand>,
    events: mpsc::Sender<UpstreamEvent>,
    shutdown: CancellationToken,
    session_id: String,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!(session_id = %session_id, "Upstream transport cancelled");
                close_socket(&mut sink).await;
                return;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    close_socket(&mut sink).await;
                    return;
                };

                let json = match OutboundFrame::from(command).to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(session_id = %session_id, "Failed to serialize ElevenLabs frame: {e}");
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    let _ = events
                        .send(UpstreamEvent::Failed(format!("send failed: {e}")))
                        .await;
                    return;
                }
            }

            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let response = match StreamResponse::parse(&text) {
                            Ok(response) => response,
                            Err(e) => {
                                warn!(session_id = %session_id, "Failed to parse ElevenLabs frame: {e}");
                                let _ = events
                                    .send(UpstreamEvent::Failed(format!(
                                        "unparseable backend frame: {e}"
                                    )))
                                    .await;
                                close_socket(&mut sink).await;
                                return;
                            }
                        };

                        for event in response.into_events() {
                            let terminal = event.is_terminal();
                            if events.send(event).await.is_err() {
                                close_socket(&mut sink).await;
                                return;
                            }
                            if terminal {
                                close_socket(&mut sink).await;
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            warn!(session_id = %session_id, "Failed to send pong: {e}");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let event = match frame {
                            Some(frame) if frame.code != CloseCode::Normal => {
                                UpstreamEvent::Failed(format!(
                                    "backend closed connection ({}): {}",
                                    u16::from(frame.code),
                                    frame.reason.as_str()
                                ))
                            }
                            _ => UpstreamEvent::Closed,
                        };
                        let _ = events.send(event).await;
                        return;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(session_id = %session_id, "Ignoring binary frame from ElevenLabs");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events
                            .send(UpstreamEvent::Failed(format!("transport error: {e}")))
                            .await;
                        return;
                    }
                    None => {
                        let _ = events.send(UpstreamEvent::Closed).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn close_socket(sink: &mut WsSink) {
    let _ = tokio::time::timeout(CLOSE_GRACE_PERIOD, sink.send(Message::Close(None))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_input_url() {
        let connector = ElevenLabsConnector::new(ElevenLabsConfig::default());
        let url = connector
            .stream_input_url("21m00Tcm4TlvDq8ikWAM", "eleven_turbo_v2_5")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.elevenlabs.io/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM/stream-input?model_id=eleven_turbo_v2_5"
        );
    }

    #[test]
    fn test_stream_input_url_escapes_voice() {
        let connector = ElevenLabsConnector::new(ElevenLabsConfig {
            ws_base_url: "ws://127.0.0.1:9000/".to_string(),
            ..Default::default()
        });
        let url = connector.stream_input_url("a/b", "m").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/v1/text-to-speech/a%2Fb/stream-input?model_id=m"
        );
    }

    #[tokio::test]
    async fn test_open_without_api_key_fails_fast() {
        let connector = ElevenLabsConnector::new(ElevenLabsConfig::default());
        let result = connector
            .open(SynthesisRequest {
                session_id: "s".to_string(),
                voice_id: "v".to_string(),
                model_id: "m".to_string(),
            })
            .await;
        assert!(matches!(result, Err(SynthesisError::UpstreamConnect(_))));
    }

    #[tokio::test]
    async fn test_unparseable_frame_fails_channel() {
        use tokio_tungstenite::accept_async;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // handshake
            ws.next().await;
            ws.send(Message::Text(r#"{"audio":123}"#.into()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let connector = ElevenLabsConnector::new(ElevenLabsConfig {
            api_key: Some("key".to_string()),
            ws_base_url: format!("ws://{addr}"),
            connect_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        });
        let mut channel = connector
            .open(SynthesisRequest {
                session_id: "s".to_string(),
                voice_id: "v".to_string(),
                model_id: "m".to_string(),
            })
            .await
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), channel.next_event())
            .await
            .unwrap();
        match event {
            Some(UpstreamEvent::Failed(reason)) => {
                assert!(reason.contains("unparseable backend frame"), "{reason}")
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(channel.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_open_unreachable_backend() {
        let connector = ElevenLabsConnector::new(ElevenLabsConfig {
            api_key: Some("key".to_string()),
            ws_base_url: "ws://127.0.0.1:1".to_string(),
            connect_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        });
        let result = connector
            .open(SynthesisRequest {
                session_id: "s".to_string(),
                voice_id: "v".to_string(),
                model_id: "m".to_string(),
            })
            .await;
        assert!(matches!(result, Err(SynthesisError::UpstreamConnect(_))));
    }
}
