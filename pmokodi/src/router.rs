//! Delivery of server-pushed notifications.
//!
//! Each node has its own router, fed by the node's reader loop. A
//! notification goes to the per-node broadcast emitter (anyone may
//! subscribe) and to the pool-wide queue, except when it is the echo of a
//! command the engine issued itself: those are counted in advance with
//! [`NotificationRouter::expect_self_notification`], per direction, and
//! swallowed when the matching notification arrives.
//! Neither path ever blocks the reader.

use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::identity::NodeId;
use crate::message::Notification;
use crate::methods::PlaybackNotification;

const LOCAL_CAPACITY: usize = 16;

/// A notification tagged with the node that emitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeNotification {
    pub node: NodeId,
    pub method: String,
    pub params: Option<Value>,
}

impl NodeNotification {
    pub fn playback(&self) -> Option<PlaybackNotification> {
        PlaybackNotification::from_method(&self.method)
    }
}

/// Sending half of the pool-wide notification queue.
pub type PoolSink = mpsc::Sender<NodeNotification>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Reached the pool-wide listener.
    Forwarded,
    /// Recognised as the echo of an engine command.
    Suppressed,
    /// No pool listener configured, or its queue is full or closed.
    LocalOnly,
}

#[derive(Debug)]
pub struct NotificationRouter {
    node: NodeId,
    local: broadcast::Sender<Notification>,
    pool: Option<PoolSink>,
    pending_pauses: AtomicU32,
    pending_resumes: AtomicU32,
}

impl NotificationRouter {
    pub fn new(node: NodeId, pool: Option<PoolSink>) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CAPACITY);
        Self {
            node,
            local,
            pool,
            pending_pauses: AtomicU32::new(0),
            pending_resumes: AtomicU32::new(0),
        }
    }

    /// Subscribes to every notification of this node.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.local.subscribe()
    }

    /// Announces that the next `event` notification is self-triggered.
    pub fn expect_self_notification(&self, event: PlaybackNotification) {
        self.echo_counter(event).fetch_add(1, Ordering::SeqCst);
    }

    /// Self-triggered notifications still expected, both directions.
    pub fn pending_echoes(&self) -> u32 {
        self.pending_echoes_for(PlaybackNotification::Paused)
            + self.pending_echoes_for(PlaybackNotification::Resumed)
    }

    pub fn pending_echoes_for(&self, event: PlaybackNotification) -> u32 {
        self.echo_counter(event).load(Ordering::SeqCst)
    }

    pub fn route(&self, notification: Notification) -> RouteOutcome {
        // No subscriber is not an error.
        let _ = self.local.send(notification.clone());

        let event = PlaybackNotification::from_method(&notification.method);
        if event.is_some_and(|event| self.consume_echo(event)) {
            debug!(node = %self.node, method = %notification.method, "Swallowed self-triggered notification");
            return RouteOutcome::Suppressed;
        }

        let Some(pool) = self.pool.as_ref() else {
            return RouteOutcome::LocalOnly;
        };

        let forwarded = NodeNotification {
            node: self.node.clone(),
            method: notification.method,
            params: notification.params,
        };

        match pool.try_send(forwarded) {
            Ok(()) => RouteOutcome::Forwarded,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(node = %self.node, method = %dropped.method, "Pool notification queue full, dropping");
                RouteOutcome::LocalOnly
            }
            Err(mpsc::error::TrySendError::Closed(_)) => RouteOutcome::LocalOnly,
        }
    }

    fn echo_counter(&self, event: PlaybackNotification) -> &AtomicU32 {
        match event {
            PlaybackNotification::Paused => &self.pending_pauses,
            PlaybackNotification::Resumed => &self.pending_resumes,
        }
    }

    fn consume_echo(&self, event: PlaybackNotification) -> bool {
        self.echo_counter(event)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(method: &str) -> Notification {
        Notification {
            method: method.to_string(),
            params: None,
        }
    }

    fn router_with_pool(capacity: usize) -> (NotificationRouter, mpsc::Receiver<NodeNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            NotificationRouter::new(NodeId("kodi-a".into()), Some(tx)),
            rx,
        )
    }

    #[test]
    fn test_forwards_to_pool_and_local() {
        let (router, mut pool_rx) = router_with_pool(4);
        let mut local_rx = router.subscribe();

        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::Forwarded);

        let forwarded = pool_rx.try_recv().unwrap();
        assert_eq!(forwarded.node, NodeId("kodi-a".into()));
        assert_eq!(forwarded.playback(), Some(PlaybackNotification::Paused));
        assert_eq!(local_rx.try_recv().unwrap().method, "Player.OnPause");
    }

    #[test]
    fn test_one_echo_swallowed_per_command() {
        let (router, mut pool_rx) = router_with_pool(4);
        let mut local_rx = router.subscribe();

        router.expect_self_notification(PlaybackNotification::Paused);
        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::Suppressed);
        assert_eq!(router.route(notification("Player.OnResume")), RouteOutcome::Forwarded);

        assert_eq!(pool_rx.try_recv().unwrap().method, "Player.OnResume");
        assert!(pool_rx.try_recv().is_err());
        // The node's own listener sees both.
        assert_eq!(local_rx.try_recv().unwrap().method, "Player.OnPause");
        assert_eq!(local_rx.try_recv().unwrap().method, "Player.OnResume");
        assert_eq!(router.pending_echoes(), 0);
    }

    #[test]
    fn test_burst_of_commands_then_genuine_events() {
        let (router, mut pool_rx) = router_with_pool(8);

        router.expect_self_notification(PlaybackNotification::Paused);
        router.expect_self_notification(PlaybackNotification::Resumed);
        // Echoes of the two engine commands.
        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::Suppressed);
        assert_eq!(router.route(notification("Player.OnResume")), RouteOutcome::Suppressed);
        // Two genuine user actions.
        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::Forwarded);
        assert_eq!(router.route(notification("Player.OnResume")), RouteOutcome::Forwarded);

        assert_eq!(pool_rx.try_recv().unwrap().method, "Player.OnPause");
        assert_eq!(pool_rx.try_recv().unwrap().method, "Player.OnResume");
    }

    #[test]
    fn test_other_notifications_do_not_consume_echoes() {
        let (router, mut pool_rx) = router_with_pool(4);
        router.expect_self_notification(PlaybackNotification::Paused);

        assert_eq!(router.route(notification("Player.OnSeek")), RouteOutcome::Forwarded);
        assert_eq!(router.pending_echoes(), 1);
        assert_eq!(pool_rx.try_recv().unwrap().method, "Player.OnSeek");
    }

    #[test]
    fn test_pending_pause_echo_does_not_swallow_user_resume() {
        let (router, mut pool_rx) = router_with_pool(4);

        // A pause the node never echoed (it was already paused).
        router.expect_self_notification(PlaybackNotification::Paused);
        assert_eq!(router.route(notification("Player.OnResume")), RouteOutcome::Forwarded);

        assert_eq!(pool_rx.try_recv().unwrap().method, "Player.OnResume");
        assert_eq!(router.pending_echoes_for(PlaybackNotification::Paused), 1);
        assert_eq!(router.pending_echoes_for(PlaybackNotification::Resumed), 0);
    }

    #[test]
    fn test_full_pool_queue_does_not_block() {
        let (router, _pool_rx) = router_with_pool(1);
        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::Forwarded);
        assert_eq!(router.route(notification("Player.OnResume")), RouteOutcome::LocalOnly);
    }

    #[test]
    fn test_without_pool_listener() {
        let router = NotificationRouter::new(NodeId("solo".into()), None);
        assert_eq!(router.route(notification("Player.OnPause")), RouteOutcome::LocalOnly);
    }
}
