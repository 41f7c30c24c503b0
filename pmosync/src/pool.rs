//! Pool of Kodi nodes driven by one global state.
//!
//! The coordinator owns the node connections, the pool-wide notification
//! queue and the [`StateMachine`]. User pause/resume notifications coming
//! from any node become global transitions, which are fanned out to every
//! other live node while the transition lock is held.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;
use pmokodi::methods::{self, PlaybackNotification, PlayerProperty};
use pmokodi::{KodiError, NodeClient, NodeId, NodeIdentity, NodeNotification, Operation, PoolSink};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SyncError;
use crate::settings::SyncSettings;
use crate::state::{GlobalState, PoolEvent, StateMachine};

/// Capacity of the pool-wide notification queue.
const POOL_QUEUE_CAPACITY: usize = 64;

pub struct PoolCoordinator {
    settings: SyncSettings,
    nodes: RwLock<Vec<Arc<NodeClient>>>,
    state: StateMachine,
    sink: PoolSink,
    inbox: Mutex<Option<mpsc::Receiver<NodeNotification>>>,
    cancel: CancellationToken,
}

impl PoolCoordinator {
    pub fn new(settings: SyncSettings) -> Self {
        let (sink, inbox) = mpsc::channel(POOL_QUEUE_CAPACITY);
        Self {
            settings,
            nodes: RwLock::new(Vec::new()),
            state: StateMachine::new(GlobalState::Playing),
            sink,
            inbox: Mutex::new(Some(inbox)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Queue to hand to every node joining the pool.
    pub fn pool_sink(&self) -> PoolSink {
        self.sink.clone()
    }

    /// Adds a connected node. Returns false if a node with the same id is
    /// already in the pool.
    pub fn add_node(&self, node: NodeClient) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let id = node.id();
        if nodes.iter().any(|n| n.id() == id) {
            warn!(node = %node.description(), "Node already in the pool, ignoring");
            return false;
        }
        info!(node = %node.description(), "Node joined the pool");
        nodes.push(Arc::new(node));
        true
    }

    /// Connects every identity concurrently. Nodes that fail to connect are
    /// logged and left out; returns the number of nodes that joined.
    pub async fn connect_all(&self, identities: Vec<NodeIdentity>) -> Result<usize, SyncError> {
        let attempts = identities.into_iter().map(|identity| {
            let sink = self.pool_sink();
            async move {
                let description = identity.description();
                match NodeClient::connect(identity, Some(sink)).await {
                    Ok(node) => Some(node),
                    Err(err) => {
                        warn!(node = %description, error = %err, "Connection failed, node excluded");
                        None
                    }
                }
            }
        });

        let mut joined = 0;
        for node in join_all(attempts).await.into_iter().flatten() {
            if self.add_node(node) {
                joined += 1;
            }
        }

        if joined == 0 {
            return Err(SyncError::NoNodes);
        }
        Ok(joined)
    }

    /// Nodes whose connection is still open.
    pub fn live_nodes(&self) -> Vec<Arc<NodeClient>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| !n.is_closed())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the nodes whose connection was lost. Returns how many left.
    pub async fn prune_closed(&self) -> usize {
        let removed: Vec<Arc<NodeClient>> = {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let (closed, live): (Vec<_>, Vec<_>) = nodes.drain(..).partition(|n| n.is_closed());
            *nodes = live;
            closed
        };

        for node in &removed {
            warn!(node = %node.description(), "Connection lost, node excluded from the pool");
            node.shutdown().await;
        }
        removed.len()
    }

    /// Current state, after any transition in progress.
    pub async fn state(&self) -> GlobalState {
        self.state.current().await
    }

    pub fn subscribe(&self) -> watch::Receiver<GlobalState> {
        self.state.subscribe()
    }

    /// Applies `event` and, for user events, sends the matching command to
    /// every live node except `origin`. Returns the new state, or `None` if
    /// the event was rejected.
    pub async fn transition(&self, event: PoolEvent, origin: Option<&NodeId>) -> Option<GlobalState> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, event, origin).await
    }

    async fn apply(
        &self,
        state: &mut GlobalState,
        event: PoolEvent,
        origin: Option<&NodeId>,
    ) -> Option<GlobalState> {
        let Some(next) = state.next(event) else {
            debug!(state = %state, ?event, "Transition rejected");
            return None;
        };

        info!(from = %state, to = %next, ?event, "Global state transition");
        *state = next;

        if event.is_user() {
            if let Some(play) = next.play_command() {
                self.fan_out(play, origin).await;
            }
        }
        self.state.publish(next);
        Some(next)
    }

    async fn fan_out(&self, play: bool, skip: Option<&NodeId>) {
        self.prune_closed().await;
        let player_id = self.settings.player_id;
        let nodes = self.live_nodes();
        let commands = nodes
            .iter()
            .filter(|node| skip.is_none_or(|origin| node.id() != *origin))
            .map(|node| async move {
                // The response updates the node's recorded state on its own.
                if let Err(err) = node.command_play(player_id, play).await {
                    warn!(node = %node.description(), error = %err, "Failed to send play command");
                }
            });
        join_all(commands).await;
    }

    /// Enters `Busy` from `Playing`. Returns false in any other state.
    pub(crate) async fn begin_pass(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state != GlobalState::Playing {
            debug!(state = %*state, "Sync pass skipped");
            return false;
        }
        self.apply(&mut state, PoolEvent::BeginPass, None)
            .await
            .is_some()
    }

    /// Leaves `Busy`. Returns false when a user transition ended the pass first.
    pub(crate) async fn end_pass(&self) -> bool {
        let mut state = self.state.lock().await;
        self.apply(&mut state, PoolEvent::EndPass, None)
            .await
            .is_some()
    }

    /// Sends a play command to `node` only while a pass is running. The
    /// command is enqueued under the transition lock, so any later user
    /// transition reaches the node after it.
    pub(crate) async fn command_if_busy(&self, node: &NodeClient, play: bool) -> bool {
        let state = self.state.lock().await;
        if *state != GlobalState::Busy {
            return false;
        }
        match node.command_play(self.settings.player_id, play).await {
            Ok(_) => true,
            Err(err) => {
                warn!(node = %node.description(), error = %err, "Failed to send play command");
                false
            }
        }
    }

    /// Refreshes the recorded position and play state of `node`.
    pub async fn poll_node(&self, node: &NodeClient) -> Result<(), KodiError> {
        let call = methods::get_properties(
            self.settings.player_id,
            &[PlayerProperty::Time, PlayerProperty::Speed],
        );
        node.submit(call, Operation::RecordPlayback)
            .await?
            .wait_for(self.settings.request_timeout)
            .await?;
        Ok(())
    }

    /// Starts playback on every node, then waits for them to settle.
    pub async fn play_all(&self) {
        let nodes = self.live_nodes();
        // Knowing each node's state first keeps the self-notification
        // counters exact: nodes already playing will not echo.
        let polls = nodes.iter().map(|node| async move {
            if let Err(err) = self.poll_node(node).await {
                warn!(node = %node.description(), error = %err, "Initial poll failed");
            }
        });
        join_all(polls).await;

        {
            let _state = self.state.lock().await;
            info!(nodes = nodes.len(), "Starting playback on every node");
            self.fan_out(true, None).await;
        }
        tokio::time::sleep(self.settings.startup_settle).await;
    }

    /// Turns user pause/resume notifications into global transitions.
    pub async fn handle_notification(&self, notification: NodeNotification) -> Option<GlobalState> {
        let event = match notification.playback()? {
            PlaybackNotification::Paused => PoolEvent::UserPause,
            PlaybackNotification::Resumed => PoolEvent::UserResume,
        };
        info!(node = %notification.node, ?event, "User action on node");
        self.transition(event, Some(&notification.node)).await
    }

    /// Consumes the pool-wide notification queue until shutdown.
    pub async fn run_notification_listener(&self) {
        let taken = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut inbox) = taken else {
            warn!("Notification listener already running");
            return;
        };

        info!("Notification listener started");
        loop {
            let notification = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = inbox.recv() => match received {
                    Some(notification) => notification,
                    None => break,
                },
            };
            self.handle_notification(notification).await;
        }
        info!("Notification listener stopped");
    }

    /// Resolves once [`PoolCoordinator::shutdown`] has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the listener and the sync loop, then closes every connection.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let nodes = std::mem::take(&mut *self.nodes.write().unwrap_or_else(PoisonError::into_inner));
        join_all(nodes.iter().map(|node| node.shutdown())).await;
        info!(nodes = nodes.len(), "Pool shut down");
    }
}

impl std::fmt::Debug for PoolCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCoordinator")
            .field("nodes", &self.len())
            .field("state", &self.state)
            .finish()
    }
}
