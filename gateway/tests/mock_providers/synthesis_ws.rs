//! ElevenLabs stream-input mock
//!
//! Accepts any path, records every request path and text frame it
//! receives and answers according to a [`Script`].

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub const TEST_API_KEY: &str = "test-eleven-key";

/// How the mock answers a synthesis connection.
#[derive(Clone, Debug)]
pub enum Script {
    /// After end-of-input, send each chunk as an audio frame, then `isFinal`.
    Complete(Vec<&'static str>),
    /// After the first text chunk, send these audio frames and then go
    /// silent until the client disconnects.
    Hold(Vec<&'static str>),
    /// After end-of-input, send a provider error frame.
    Fail(&'static str),
    /// After end-of-input, send these audio frames and close normally
    /// without `isFinal`.
    CloseWithoutFinal(Vec<&'static str>),
    /// After end-of-input, send this text frame verbatim.
    Raw(&'static str),
}

struct MockState {
    script: Script,
    chunk_delay: Duration,
    connections: AtomicUsize,
    disconnects: AtomicUsize,
    disconnected: Notify,
    frames: Mutex<Vec<Value>>,
    paths: Mutex<Vec<String>>,
}

pub struct MockSynthesisServer {
    pub url: String,
    state: Arc<MockState>,
}

impl MockSynthesisServer {
    pub async fn start(script: Script) -> Self {
        Self::start_with_delay(script, Duration::ZERO).await
    }

    /// Like [`start`](Self::start), pausing between audio frames.
    pub async fn start_with_delay(script: Script, chunk_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            script,
            chunk_delay,
            connections: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            disconnected: Notify::new(),
            frames: Mutex::new(Vec::new()),
            paths: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state.clone()).await {
                        eprintln!("mock synthesis connection error: {e}");
                    }
                    state.disconnects.fetch_add(1, Ordering::SeqCst);
                    state.disconnected.notify_one();
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            state,
        }
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Wait until some connection has ended.
    pub async fn wait_for_disconnect(&self, limit: Duration) -> bool {
        if self.disconnects() > 0 {
            return true;
        }
        tokio::time::timeout(limit, self.state.disconnected.notified())
            .await
            .is_ok()
    }

    /// Request path and query of every accepted connection.
    pub fn paths(&self) -> Vec<String> {
        self.state.paths.lock().unwrap().clone()
    }

    /// Every JSON text frame received so far, across connections.
    pub fn frames(&self) -> Vec<Value> {
        self.state.frames.lock().unwrap().clone()
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let record_path = |request: &Request, response: Response| {
        state.paths.lock().unwrap().push(request.uri().to_string());
        Ok::<_, ErrorResponse>(response)
    };
    let ws_stream = accept_hdr_async(stream, record_path).await?;
    let (mut write, mut read) = ws_stream.split();
    state.connections.fetch_add(1, Ordering::SeqCst);

    let mut held = false;

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(&text)?;
                state.frames.lock().unwrap().push(frame.clone());

                let is_handshake = frame.get("xi_api_key").is_some();
                let is_end = !is_handshake && frame["text"] == "";

                match &state.script {
                    Script::Complete(chunks) if is_end => {
                        for chunk in chunks {
                            tokio::time::sleep(state.chunk_delay).await;
                            let audio = json!({"audio": BASE64_STANDARD.encode(chunk.as_bytes())});
                            write.send(Message::Text(audio.to_string().into())).await?;
                        }
                        let done = json!({"isFinal": true});
                        write.send(Message::Text(done.to_string().into())).await?;
                    }
                    Script::Hold(chunks) if !is_handshake && !is_end && !held => {
                        held = true;
                        for chunk in chunks {
                            let audio = json!({"audio": BASE64_STANDARD.encode(chunk.as_bytes())});
                            write.send(Message::Text(audio.to_string().into())).await?;
                        }
                    }
                    Script::Fail(message) if is_end => {
                        let error = json!({"message": message, "error": "quota_exceeded"});
                        write.send(Message::Text(error.to_string().into())).await?;
                    }
                    Script::CloseWithoutFinal(chunks) if is_end => {
                        for chunk in chunks {
                            let audio = json!({"audio": BASE64_STANDARD.encode(chunk.as_bytes())});
                            write.send(Message::Text(audio.to_string().into())).await?;
                        }
                        write.send(Message::Close(None)).await?;
                        break;
                    }
                    Script::Raw(frame) if is_end => {
                        write.send(Message::Text((*frame).into())).await?;
                    }
                    _ => {}
                }
            }
            Ok(Message::Ping(data)) => write.send(Message::Pong(data)).await?,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    Ok(())
}
