//! In-memory Kodi node for tests.
//!
//! [`MockKodi`] serves the Kodi JSON-RPC subset used by the engine over a
//! tokio duplex pipe, behind a real websocket handshake. Its playback clock
//! follows `tokio::time`, so tests running on a paused runtime see holds
//! and positions advance deterministically.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::client::{NodeClient, handshake_request};
use crate::errors::KodiError;
use crate::identity::NodeIdentity;
use crate::message::PlayerTime;
use crate::methods::{ON_PAUSE, ON_RESUME, PLAYER_GET_PROPERTIES, PLAYER_PLAY_PAUSE};
use crate::router::PoolSink;

const PIPE_CAPACITY: usize = 64 * 1024;

/// A request received by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCommand {
    GetProperties(Vec<String>),
    PlayPause(bool),
    Other(String),
}

enum ServerEvent {
    Push(String),
    Disconnect,
}

struct MockState {
    position: Duration,
    anchor: Instant,
    playing: bool,
    muted: bool,
    commands: Vec<(Instant, MockCommand)>,
    authorization: Option<String>,
    events: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl MockState {
    fn elapsed(&self) -> Duration {
        if self.playing {
            self.position + self.anchor.elapsed()
        } else {
            self.position
        }
    }

    /// Changes the play state; returns true if it actually changed.
    fn set_playing(&mut self, playing: bool) -> bool {
        if self.playing == playing {
            return false;
        }
        self.position = self.elapsed();
        self.anchor = Instant::now();
        self.playing = playing;
        true
    }

    fn push(&self, event: ServerEvent) {
        if let Some(events) = self.events.as_ref() {
            let _ = events.send(event);
        }
    }
}

#[derive(Clone)]
pub struct MockKodi {
    identity: NodeIdentity,
    state: Arc<Mutex<MockState>>,
}

impl MockKodi {
    pub fn new(host: &str, elapsed: Duration, playing: bool) -> Self {
        Self {
            identity: NodeIdentity::new(host, "kodi", "kodi"),
            state: Arc::new(Mutex::new(MockState {
                position: elapsed,
                anchor: Instant::now(),
                playing,
                muted: false,
                commands: Vec::new(),
                authorization: None,
                events: None,
            })),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Opens a websocket to this mock and wraps it in a [`NodeClient`].
    pub async fn connect(&self, pool: Option<PoolSink>) -> Result<NodeClient, KodiError> {
        let (client_io, server_io) = tokio::io::duplex(PIPE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.state().events = Some(events_tx);
        tokio::spawn(serve(Arc::clone(&self.state), server_io, events_rx));

        let request = handshake_request(&self.identity)?;
        let (websocket, _) = tokio_tungstenite::client_async(request, client_io)
            .await
            .map_err(|e| KodiError::Websocket(self.identity.description(), e))?;
        Ok(NodeClient::from_stream(self.identity.clone(), websocket, pool))
    }

    pub fn elapsed(&self) -> Duration {
        self.state().elapsed()
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.state().commands.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Play/pause commands with the instant they were received.
    pub fn play_pause_log(&self) -> Vec<(Instant, bool)> {
        self.state()
            .commands
            .iter()
            .filter_map(|(at, c)| match c {
                MockCommand::PlayPause(play) => Some((*at, *play)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Authorization header received during the handshake.
    pub fn authorization(&self) -> Option<String> {
        self.state().authorization.clone()
    }

    /// Stops answering requests (they are still recorded).
    pub fn mute_responses(&self, muted: bool) {
        self.state().muted = muted;
    }

    /// Simulates the user pausing on the node's own remote.
    pub fn user_pause(&self) {
        self.user_action(false);
    }

    /// Simulates the user resuming on the node's own remote.
    pub fn user_resume(&self) {
        self.user_action(true);
    }

    /// Moves the playback clock, as a seek would.
    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut state = self.state();
        state.position = elapsed;
        state.anchor = Instant::now();
    }

    /// Sends an arbitrary text frame to the client.
    pub fn push_raw(&self, text: &str) {
        self.state().push(ServerEvent::Push(text.to_string()));
    }

    /// Closes the connection from the node side.
    pub fn disconnect(&self) {
        self.state().push(ServerEvent::Disconnect);
    }

    fn user_action(&self, play: bool) {
        let mut state = self.state();
        if state.set_playing(play) {
            let notification = playback_notification(play);
            state.push(ServerEvent::Push(notification));
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn playback_notification(play: bool) -> String {
    let method = if play { ON_RESUME } else { ON_PAUSE };
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {
            "data": {
                "item": {"id": 1, "type": "movie"},
                "player": {"playerid": 1, "speed": if play { 1 } else { 0 }},
            },
            "sender": "xbmc",
        },
    })
    .to_string()
}

async fn serve(
    state: Arc<Mutex<MockState>>,
    io: DuplexStream,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let handshake_state = Arc::clone(&state);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        handshake_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .authorization = authorization;
        Ok(response)
    };

    let Ok(websocket) = tokio_tungstenite::accept_hdr_async(io, callback).await else {
        return;
    };
    let (mut sink, mut source) = websocket.split();

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let replies = handle_request(&state, &text);
                    for reply in replies {
                        if sink.send(Message::Text(reply)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Some(ServerEvent::Push(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Some(ServerEvent::Disconnect) | None => {
                    let _ = sink.close().await;
                    return;
                }
            },
        }
    }
}

/// Builds the frames answering one request (notification first, then response).
fn handle_request(state: &Arc<Mutex<MockState>>, text: &str) -> Vec<String> {
    let Ok(request) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let mut frames = Vec::new();

    let outcome = match method.as_str() {
        PLAYER_GET_PROPERTIES => {
            let properties: Vec<String> = params
                .get("properties")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            state
                .commands
                .push((Instant::now(), MockCommand::GetProperties(properties.clone())));

            let mut result = serde_json::Map::new();
            for property in &properties {
                match property.as_str() {
                    "time" => {
                        result.insert("time".into(), json!(PlayerTime::from_duration(state.elapsed())));
                    }
                    "speed" => {
                        result.insert("speed".into(), json!(if state.playing { 1 } else { 0 }));
                    }
                    _ => {}
                }
            }
            Ok(Value::Object(result))
        }
        PLAYER_PLAY_PAUSE => {
            let play = match params.get("play") {
                Some(Value::Bool(play)) => *play,
                _ => !state.playing,
            };
            state
                .commands
                .push((Instant::now(), MockCommand::PlayPause(play)));
            if state.set_playing(play) {
                frames.push(playback_notification(play));
            }
            Ok(json!({"speed": if state.playing { 1 } else { 0 }}))
        }
        other => {
            state
                .commands
                .push((Instant::now(), MockCommand::Other(other.to_string())));
            Err(json!({"code": -32601, "message": "Method not found."}))
        }
    };

    if !state.muted {
        let response = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        frames.push(response.to_string());
    }
    frames
}
