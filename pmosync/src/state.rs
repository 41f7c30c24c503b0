//! Global playback state shared by the whole pool.
//!
//! Transitions are serialized by one async mutex. The holder keeps it for
//! the whole transition, command fan-out included, so two transitions never
//! interleave their commands on a node. Each committed state is then
//! published on a watch channel for tasks that only need to be woken up
//! (holds in flight, the sync loop).

use std::fmt;

use tokio::sync::{Mutex, MutexGuard, watch};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalState {
    /// Every node is expected to play.
    Playing,
    /// A user paused one node; the others follow.
    Paused,
    /// A sync pass is holding some nodes.
    Busy,
}

impl fmt::Display for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GlobalState::Playing => "playing",
            GlobalState::Paused => "paused",
            GlobalState::Busy => "busy",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    UserPause,
    UserResume,
    BeginPass,
    EndPass,
}

impl PoolEvent {
    /// User events are fanned out to the pool, pass events are not.
    pub fn is_user(self) -> bool {
        matches!(self, PoolEvent::UserPause | PoolEvent::UserResume)
    }
}

impl GlobalState {
    /// Returns the state reached from `self` on `event`, or `None` when the
    /// event is rejected in this state.
    pub fn next(self, event: PoolEvent) -> Option<GlobalState> {
        use GlobalState::*;
        use PoolEvent::*;

        match (self, event) {
            (Playing | Busy, UserPause) => Some(Paused),
            (Paused | Busy, UserResume) => Some(Playing),
            (Playing | Paused, BeginPass) => Some(Busy),
            (Busy, EndPass) => Some(Playing),
            _ => None,
        }
    }

    /// Play flag to send to the nodes after entering this state.
    pub fn play_command(self) -> Option<bool> {
        match self {
            GlobalState::Playing => Some(true),
            GlobalState::Paused => Some(false),
            GlobalState::Busy => None,
        }
    }
}

pub struct StateMachine {
    current: Mutex<GlobalState>,
    published: watch::Sender<GlobalState>,
}

impl StateMachine {
    pub fn new(initial: GlobalState) -> Self {
        let (published, _) = watch::channel(initial);
        Self {
            current: Mutex::new(initial),
            published,
        }
    }

    /// Reads the state, waiting for any transition in progress.
    pub async fn current(&self) -> GlobalState {
        *self.current.lock().await
    }

    /// Last state published, without waiting.
    pub fn published(&self) -> GlobalState {
        *self.published.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GlobalState> {
        self.published.subscribe()
    }

    /// Takes the transition lock.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, GlobalState> {
        self.current.lock().await
    }

    pub(crate) fn publish(&self, state: GlobalState) {
        self.published.send_replace(state);
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("published", &self.published())
            .finish()
    }
}
