//! Matching of asynchronously arriving responses to outstanding requests.
//!
//! Every request sent on a node connection gets a fresh identifier from
//! [`IdAllocator`]. The [`Correlator`] remembers, for each identifier still in
//! flight, which [`Operation`] the response has to perform and who (if
//! anyone) is waiting for it. Entries are consumed exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::errors::KodiError;
use crate::message::RpcResponse;

/// What a response should do to the node once it arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Decode `result.time` and store it as the node's elapsed time.
    RecordElapsed,
    /// Decode `result.speed` and store it as the node's play state.
    RecordSpeed,
    /// Both of the above, for a `Player.GetProperties` asking for time and speed.
    RecordPlayback,
    /// Command acknowledgement, only used to unblock the caller.
    Acknowledge,
}

pub type ResponseOutcome = Result<RpcResponse, KodiError>;

/// Per-connection request identifier source.
///
/// Identifiers are a monotonic counter starting at 1. Wrapping would need
/// 2^64 requests on a single connection, so an identifier is never reused
/// while the connection lives.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Pending {
    pub operation: Operation,
    waiter: Option<oneshot::Sender<ResponseOutcome>>,
}

impl Pending {
    /// Hands the outcome to the waiting caller, if there still is one.
    ///
    /// Never blocks: a caller that went away (or never waited) simply
    /// misses the signal.
    pub fn release(self, outcome: ResponseOutcome) {
        if let Some(waiter) = self.waiter {
            let _ = waiter.send(outcome);
        }
    }
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u64, Pending>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `id` is in flight.
    ///
    /// A duplicate identifier is refused: the existing entry stays, and the
    /// new waiter is released with [`KodiError::DuplicateId`].
    pub fn register(
        &mut self,
        id: u64,
        operation: Operation,
        waiter: Option<oneshot::Sender<ResponseOutcome>>,
    ) -> Result<(), KodiError> {
        if self.pending.contains_key(&id) {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(KodiError::DuplicateId(id)));
            }
            return Err(KodiError::DuplicateId(id));
        }
        self.pending.insert(id, Pending { operation, waiter });
        Ok(())
    }

    /// Removes and returns the entry for `id`, or `None` on a correlation miss.
    pub fn resolve(&mut self, id: u64) -> Option<Pending> {
        self.pending.remove(&id)
    }

    /// Drops every entry; waiters observe a closed channel.
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
