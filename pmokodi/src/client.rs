//! Persistent JSON-RPC connection to one Kodi node.
//!
//! A [`NodeClient`] owns two tasks for the lifetime of its websocket:
//!
//! - the **sender** consumes the bounded outbound queue in submission order,
//!   registers each identifier in the [`Correlator`] and writes the frame;
//! - the **reader** decodes every inbound frame, applies responses to the
//!   node's recorded playback state, releases waiting callers and hands
//!   notifications to the node's [`NotificationRouter`].
//!
//! Losing the connection closes the node: both tasks stop, every pending
//! caller is released with [`KodiError::ConnectionClosed`] and later
//! submissions fail immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::correlator::{Correlator, IdAllocator, Operation, ResponseOutcome};
use crate::errors::KodiError;
use crate::identity::{NodeId, NodeIdentity};
use crate::message::{
    Inbound, Notification, PlayerProperties, PlayerSpeed, RpcCall, RpcRequest, RpcResponse,
};
use crate::methods;
use crate::router::{NotificationRouter, PoolSink};

/// Capacity of the per-node outbound work queue.
const OUTBOUND_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Paused,
    Playing,
}

impl PlayState {
    /// Kodi reports 0 when paused; any other speed means the item advances.
    pub fn from_speed(speed: i64) -> Self {
        if speed == 0 {
            PlayState::Paused
        } else {
            PlayState::Playing
        }
    }

    pub fn from_play(play: bool) -> Self {
        if play {
            PlayState::Playing
        } else {
            PlayState::Paused
        }
    }
}

/// Last values recorded from the node's own responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub elapsed: Option<Duration>,
    pub state: Option<PlayState>,
}

/// Handle on a submitted request, resolved when its response arrives.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    node: String,
    rx: oneshot::Receiver<ResponseOutcome>,
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(self) -> ResponseOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(KodiError::ConnectionClosed(self.node)),
        }
    }

    /// Like [`wait`](Self::wait), giving up after `limit` when one is set.
    ///
    /// Giving up leaves the correlation entry in place; a late response is
    /// still consumed by the reader and simply reaches nobody.
    pub async fn wait_for(self, limit: Option<Duration>) -> ResponseOutcome {
        let Some(limit) = limit else {
            return self.wait().await;
        };
        let label = format!("{} on {}", self.id, self.node);
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(KodiError::Timeout(label)),
        }
    }
}

struct Outbound {
    request: RpcRequest,
    operation: Operation,
    waiter: Option<oneshot::Sender<ResponseOutcome>>,
}

/// State shared by the client handle and its two tasks.
struct NodeShared {
    identity: NodeIdentity,
    description: String,
    ids: IdAllocator,
    correlator: Mutex<Correlator>,
    playback: Mutex<PlaybackSnapshot>,
    router: NotificationRouter,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl NodeShared {
    fn correlator(&self) -> MutexGuard<'_, Correlator> {
        self.correlator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn playback(&self) -> MutexGuard<'_, PlaybackSnapshot> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the node closed, stops both loops and releases every waiter.
    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        let released = self.correlator().fail_all();
        warn!(node = %self.description, released, "Node connection closed: {}", reason);
    }

    fn handle_text(&self, text: &str) {
        match Inbound::decode(text) {
            Ok(Inbound::Notification(notification)) => self.handle_notification(notification),
            Ok(Inbound::Response(response)) => self.handle_response(response),
            Err(err) => warn!(node = %self.description, "Dropping malformed message: {}", err),
        }
    }

    fn handle_notification(&self, notification: Notification) {
        debug!(node = %self.description, method = %notification.method, "Notification");
        if let Some(event) = methods::PlaybackNotification::from_method(&notification.method) {
            info!(node = %self.description, ?event, "Playback notification");
        }
        self.router.route(notification);
    }

    fn handle_response(&self, response: RpcResponse) {
        let Some(pending) = self.correlator().resolve(response.id) else {
            debug!(node = %self.description, id = response.id, "Response without pending request");
            return;
        };

        if let Some(error) = response.error.as_ref() {
            warn!(
                node = %self.description,
                id = response.id,
                code = error.code,
                "Request failed: {}",
                error.message
            );
            let err = KodiError::Rpc {
                node: self.description.clone(),
                code: error.code,
                message: error.message.clone(),
            };
            pending.release(Err(err));
            return;
        }

        match self.apply(pending.operation, &response) {
            Ok(()) => pending.release(Ok(response)),
            Err(err) => {
                warn!(node = %self.description, id = response.id, "Cannot decode response: {}", err);
                pending.release(Err(err));
            }
        }
    }

    fn apply(&self, operation: Operation, response: &RpcResponse) -> Result<(), KodiError> {
        if operation == Operation::Acknowledge {
            return Ok(());
        }

        let result = response
            .result
            .clone()
            .ok_or(KodiError::MissingField("result"))?;

        match operation {
            Operation::RecordElapsed => {
                let properties: PlayerProperties = serde_json::from_value(result)?;
                let time = properties.time.ok_or(KodiError::MissingField("time"))?;
                self.playback().elapsed = Some(time.to_duration()?);
            }
            Operation::RecordSpeed => {
                let reply: PlayerSpeed = serde_json::from_value(result)?;
                self.playback().state = Some(PlayState::from_speed(reply.speed));
            }
            Operation::RecordPlayback => {
                let properties: PlayerProperties = serde_json::from_value(result)?;
                let time = properties.time.ok_or(KodiError::MissingField("time"))?;
                let elapsed = time.to_duration()?;
                let mut playback = self.playback();
                playback.elapsed = Some(elapsed);
                if let Some(speed) = properties.speed {
                    playback.state = Some(PlayState::from_speed(speed));
                }
            }
            Operation::Acknowledge => {}
        }
        Ok(())
    }
}

/// Builds the websocket handshake request carrying the node credentials.
pub fn handshake_request(identity: &NodeIdentity) -> Result<Request, KodiError> {
    let mut request = identity
        .ws_uri()
        .into_client_request()
        .map_err(|e| KodiError::Websocket(identity.description(), e))?;
    let authorization = HeaderValue::from_str(&identity.authorization())
        .map_err(|_| KodiError::InvalidCredentials(identity.description()))?;
    request.headers_mut().insert(AUTHORIZATION, authorization);
    Ok(request)
}

pub struct NodeClient {
    shared: Arc<NodeShared>,
    outbound: mpsc::Sender<Outbound>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeClient {
    /// Dials the node and starts its reader and sender tasks.
    pub async fn connect(identity: NodeIdentity, pool: Option<PoolSink>) -> Result<Self, KodiError> {
        let request = handshake_request(&identity)?;
        let (websocket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| KodiError::Websocket(identity.description(), e))?;
        info!(node = %identity.description(), "Connected");
        Ok(Self::from_stream(identity, websocket, pool))
    }

    /// Starts the reader and sender tasks on an established websocket.
    pub fn from_stream<S>(
        identity: NodeIdentity,
        websocket: WebSocketStream<S>,
        pool: Option<PoolSink>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let description = identity.description();
        let router = NotificationRouter::new(identity.id(), pool);
        let shared = Arc::new(NodeShared {
            identity,
            description,
            ids: IdAllocator::new(),
            correlator: Mutex::new(Correlator::new()),
            playback: Mutex::new(PlaybackSnapshot::default()),
            router,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });

        let (sink, stream) = websocket.split();
        let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);

        let reader = tokio::spawn(reader_loop(Arc::clone(&shared), stream));
        let sender = tokio::spawn(sender_loop(Arc::clone(&shared), queue, sink));

        Self {
            shared,
            outbound,
            tasks: Mutex::new(vec![reader, sender]),
        }
    }

    pub fn id(&self) -> NodeId {
        self.shared.identity.id()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.shared.identity
    }

    pub fn description(&self) -> &str {
        &self.shared.description
    }

    /// Queues `call` and returns a handle resolved by the matching response.
    pub async fn submit(&self, call: RpcCall, operation: Operation) -> Result<PendingResponse, KodiError> {
        if self.shared.is_closed() {
            return Err(self.closed_error());
        }

        let id = self.shared.ids.next_id();
        let (tx, rx) = oneshot::channel();
        let outbound = Outbound {
            request: call.with_id(id),
            operation,
            waiter: Some(tx),
        };

        self.outbound
            .send(outbound)
            .await
            .map_err(|_| self.closed_error())?;

        Ok(PendingResponse {
            id,
            node: self.shared.description.clone(),
            rx,
        })
    }

    /// Fire and forget: queues `call` and returns its identifier.
    pub async fn send(&self, call: RpcCall, operation: Operation) -> Result<u64, KodiError> {
        let pending = self.submit(call, operation).await?;
        Ok(pending.id())
    }

    /// Sends `call` and suspends until its own response arrives or the
    /// connection closes.
    pub async fn request_and_wait(&self, call: RpcCall, operation: Operation) -> Result<RpcResponse, KodiError> {
        self.submit(call, operation).await?.wait().await
    }

    /// Asks the node to play or pause.
    ///
    /// The node echoes a state change with a notification; unless the node
    /// is already known to be in the target state, that echo is announced to
    /// the router so it does not reach the pool as a user action.
    pub async fn command_play(&self, player_id: i64, play: bool) -> Result<PendingResponse, KodiError> {
        let target = PlayState::from_play(play);
        if self.play_state() != Some(target) {
            let echo = if play {
                methods::PlaybackNotification::Resumed
            } else {
                methods::PlaybackNotification::Paused
            };
            self.shared.router.expect_self_notification(echo);
        }
        debug!(node = %self.shared.description, play, "PlayPause command");
        self.submit(methods::play_pause(player_id, play), Operation::RecordSpeed)
            .await
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.shared.playback()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.snapshot().elapsed
    }

    pub fn play_state(&self) -> Option<PlayState> {
        self.snapshot().state
    }

    /// Self-triggered notifications still expected from this node.
    pub fn pending_self_notifications(&self) -> u32 {
        self.shared.router.pending_echoes()
    }

    /// Requests still waiting for their response.
    pub fn in_flight(&self) -> usize {
        self.shared.correlator().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.router.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Resolves once the node has been closed or shut down.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await
    }

    /// Closes the connection and waits for both tasks to finish.
    pub async fn shutdown(&self) {
        self.shared.close("shutdown requested");
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(err) = task.await {
                warn!(node = %self.shared.description, "Node task ended abnormally: {}", err);
            }
        }
    }

    fn closed_error(&self) -> KodiError {
        KodiError::ConnectionClosed(self.shared.description.clone())
    }
}

impl Drop for NodeClient {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("node", &self.shared.description)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Errors after which the websocket cannot be read anymore.
fn is_fatal(err: &tungstenite::Error) -> bool {
    !matches!(
        err,
        tungstenite::Error::Capacity(_) | tungstenite::Error::Utf8
    )
}

/// Closes the node when the reader stops, including on panic or abort.
struct CloseOnExit {
    shared: Arc<NodeShared>,
    reason: &'static str,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.shared.close(self.reason);
    }
}

async fn reader_loop<S>(shared: Arc<NodeShared>, mut stream: SplitStream<WebSocketStream<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut exit = CloseOnExit {
        shared: Arc::clone(&shared),
        reason: "reader aborted",
    };

    exit.reason = loop {
        let frame = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break "reader stopped",
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => shared.handle_text(&text),
            Some(Ok(Message::Binary(_))) => {
                warn!(node = %shared.description, "Ignoring binary frame");
            }
            Some(Ok(Message::Close(_))) => break "closed by peer",
            Some(Ok(_)) => {}
            Some(Err(err)) if is_fatal(&err) => {
                warn!(node = %shared.description, "Read error: {}", err);
                break "read failure";
            }
            Some(Err(err)) => {
                warn!(node = %shared.description, "Dropping unreadable frame: {}", err);
            }
            None => break "stream ended",
        }
    };
}

async fn sender_loop<S>(
    shared: Arc<NodeShared>,
    mut queue: mpsc::Receiver<Outbound>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            next = queue.recv() => next,
        };
        let Some(Outbound {
            request,
            operation,
            waiter,
        }) = next
        else {
            break;
        };

        let text = match request.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(node = %shared.description, method = %request.method, "Cannot encode request: {}", err);
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Err(err));
                }
                continue;
            }
        };

        {
            // Checked under the correlator lock: close() flips the flag
            // before draining, so an entry is either drained or never added.
            let mut correlator = shared.correlator();
            if shared.is_closed() {
                break;
            }
            if let Err(err) = correlator.register(request.id, operation, waiter) {
                warn!(node = %shared.description, "Not sending request: {}", err);
                continue;
            }
        }

        debug!(node = %shared.description, id = request.id, method = %request.method, "Sending request");
        if let Err(err) = sink.send(Message::Text(text)).await {
            let pending = shared.correlator().resolve(request.id);
            warn!(node = %shared.description, id = request.id, "Write failed: {}", err);
            if let Some(pending) = pending {
                pending.release(Err(KodiError::Websocket(shared.description.clone(), err)));
            }
            shared.close("write failure");
            break;
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{DEFAULT_PLAYER_ID, PlayerProperty, get_properties};
    use crate::mock::{MockCommand, MockKodi};
    use crate::router::NodeNotification;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn poll_call() -> RpcCall {
        get_properties(DEFAULT_PLAYER_ID, &[PlayerProperty::Time])
    }

    #[tokio::test]
    async fn test_request_and_wait_records_elapsed_time() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::from_secs(3723), false);
        let client = kodi.connect(None).await.unwrap();

        let response = client
            .request_and_wait(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap();

        assert_eq!(response.result.unwrap()["time"]["hours"], json!(1));
        assert_eq!(client.elapsed(), Some(Duration::from_secs(3723)));
        assert_eq!(client.in_flight(), 0);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_handshake_carries_basic_auth() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();
        assert_eq!(
            kodi.authorization().as_deref(),
            Some(client.identity().authorization().as_str())
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_playback_tag_records_time_and_speed() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::from_secs(12), false);
        let client = kodi.connect(None).await.unwrap();

        client
            .request_and_wait(
                get_properties(DEFAULT_PLAYER_ID, &[PlayerProperty::Time, PlayerProperty::Speed]),
                Operation::RecordPlayback,
            )
            .await
            .unwrap();

        assert_eq!(
            client.snapshot(),
            PlaybackSnapshot {
                elapsed: Some(Duration::from_secs(12)),
                state: Some(PlayState::Paused),
            }
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_requests_match_by_id() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::from_secs(5), true);
        let client = kodi.connect(None).await.unwrap();

        let first = client.submit(poll_call(), Operation::Acknowledge).await.unwrap();
        let second = client
            .submit(methods::play_pause(DEFAULT_PLAYER_ID, true), Operation::RecordSpeed)
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());

        let (second_id, first_id) = (second.id(), first.id());
        let second = second.wait().await.unwrap();
        let first = first.wait().await.unwrap();
        assert_eq!(second.id, second_id);
        assert_eq!(first.id, first_id);
        assert_eq!(second.result, Some(json!({"speed": 1})));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_waiter_stays_pending_until_response() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();
        kodi.mute_responses(true);

        let pending = client.submit(poll_call(), Operation::RecordElapsed).await.unwrap();
        let mut waiting = task::spawn(pending.wait());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_pending!(waiting.poll());
        assert_eq!(client.in_flight(), 1);

        // Losing the connection releases the waiter instead of hanging it.
        kodi.disconnect();
        client.closed().await;
        assert!(waiting.is_woken());
        let outcome = assert_ready!(waiting.poll());
        assert!(matches!(outcome, Err(KodiError::ConnectionClosed(_))));
        assert!(client.is_closed());
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails_fast() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();
        client.shutdown().await;

        let err = client
            .request_and_wait(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_rpc_error_reaches_waiter() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();

        let err = client
            .request_and_wait(RpcCall::new("Player.Unknown", None), Operation::Acknowledge)
            .await
            .unwrap_err();
        assert!(matches!(err, KodiError::Rpc { code: -32601, .. }));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_leaves_late_response_harmless() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();
        kodi.mute_responses(true);

        let err = client
            .submit(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap()
            .wait_for(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, KodiError::Timeout(_)));

        kodi.mute_responses(false);
        client
            .request_and_wait(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap();
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_command_echo_is_not_forwarded_to_pool() {
        let (pool_tx, mut pool_rx) = mpsc::channel::<NodeNotification>(8);
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(Some(pool_tx)).await.unwrap();
        let mut local = client.subscribe();

        // Engine pause then engine resume: both echoes swallowed.
        client.command_play(DEFAULT_PLAYER_ID, false).await.unwrap().wait().await.unwrap();
        client.command_play(DEFAULT_PLAYER_ID, true).await.unwrap().wait().await.unwrap();
        assert_eq!(local.recv().await.unwrap().method, methods::ON_PAUSE);
        assert_eq!(local.recv().await.unwrap().method, methods::ON_RESUME);
        assert_eq!(client.pending_self_notifications(), 0);

        // Two genuine user actions both reach the pool.
        kodi.user_pause();
        kodi.user_resume();
        assert_eq!(pool_rx.recv().await.unwrap().method, methods::ON_PAUSE);
        assert_eq!(pool_rx.recv().await.unwrap().method, methods::ON_RESUME);
        assert!(pool_rx.try_recv().is_err());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_on_paused_node_expects_no_echo() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, false);
        let client = kodi.connect(None).await.unwrap();

        client.command_play(DEFAULT_PLAYER_ID, false).await.unwrap().wait().await.unwrap();
        assert_eq!(client.play_state(), Some(PlayState::Paused));
        // Known paused now: a second pause needs no suppression.
        client.command_play(DEFAULT_PLAYER_ID, false).await.unwrap().wait().await.unwrap();
        assert_eq!(client.pending_self_notifications(), 1);
        assert!(!kodi.is_playing());
        assert_eq!(
            kodi.commands(),
            vec![MockCommand::PlayPause(false), MockCommand::PlayPause(false)]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_out_of_range_time_is_dropped_and_node_stays_usable() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::from_secs(5), false);
        let client = kodi.connect(None).await.unwrap();
        kodi.mute_responses(true);

        let pending = client.submit(poll_call(), Operation::RecordElapsed).await.unwrap();
        let reply = json!({
            "jsonrpc": "2.0",
            "id": pending.id(),
            "result": {"time": {"hours": u64::MAX, "minutes": 0, "seconds": 0}},
        });
        kodi.push_raw(&reply.to_string());

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, KodiError::Decode(_)));
        assert!(!client.is_closed());
        assert_eq!(client.elapsed(), None);

        kodi.mute_responses(false);
        client
            .request_and_wait(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap();
        assert_eq!(client.elapsed(), Some(Duration::from_secs(5)));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_reader_ending_abnormally_closes_node() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::ZERO, true);
        let client = kodi.connect(None).await.unwrap();
        kodi.mute_responses(true);
        let pending = client.submit(poll_call(), Operation::RecordElapsed).await.unwrap();

        // Reader is the first task spawned.
        client.tasks.lock().unwrap()[0].abort();
        client.closed().await;

        assert!(client.is_closed());
        assert!(matches!(pending.wait().await, Err(KodiError::ConnectionClosed(_))));
        assert!(client.submit(poll_call(), Operation::RecordElapsed).await.is_err());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let kodi = MockKodi::new("kodi-a:8080", Duration::from_secs(9), true);
        let client = kodi.connect(None).await.unwrap();

        kodi.push_raw("{not json");
        kodi.push_raw(r#"{"jsonrpc":"2.0","id":999,"result":"orphan"}"#);
        client
            .request_and_wait(poll_call(), Operation::RecordElapsed)
            .await
            .unwrap();
        assert!(!client.is_closed());
        client.shutdown().await;
    }
}
