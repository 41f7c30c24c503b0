//! Periodic catch-up of the nodes running ahead.
//!
//! Every pass polls the position of each live node, takes the least
//! advanced one as the reference and pauses every other node for exactly
//! its lead over the reference. Holds run concurrently and end early when a
//! user transition takes the pool out of `Busy`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pmokodi::{NodeClient, NodeId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::pool::PoolCoordinator;
use crate::state::GlobalState;

/// One node to pause for `delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hold<T> {
    pub node: T,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchUpPlan<T> {
    /// Least advanced node, kept playing.
    pub reference: T,
    pub reference_elapsed: Duration,
    /// Every other node, with its lead over the reference.
    pub holds: Vec<Hold<T>>,
    pub spread: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatchUpDecision<T> {
    InSync { spread: Duration },
    CatchUp(CatchUpPlan<T>),
}

/// Decides whether the pool needs a catch-up and how.
///
/// Samples are ordered by elapsed time with a stable sort, so ties keep
/// their input order. A spread of at least `threshold` yields a plan;
/// fewer than two samples never do.
///
/// ```
/// use std::time::Duration;
/// use pmosync::sync::{plan_catch_up, CatchUpDecision};
///
/// let secs = Duration::from_secs;
/// let decision = plan_catch_up(vec![("a", secs(15)), ("b", secs(10))], secs(2));
/// let CatchUpDecision::CatchUp(plan) = decision else { unreachable!() };
/// assert_eq!(plan.reference, "b");
/// assert_eq!(plan.holds[0].delay, secs(5));
/// ```
pub fn plan_catch_up<T>(mut samples: Vec<(T, Duration)>, threshold: Duration) -> CatchUpDecision<T> {
    samples.sort_by_key(|(_, elapsed)| *elapsed);

    let spread = match (samples.first(), samples.last()) {
        (Some((_, low)), Some((_, high))) => high.saturating_sub(*low),
        _ => Duration::ZERO,
    };
    if samples.len() < 2 || spread < threshold {
        return CatchUpDecision::InSync { spread };
    }

    let mut samples = samples.into_iter();
    let Some((reference, reference_elapsed)) = samples.next() else {
        return CatchUpDecision::InSync { spread };
    };
    let holds = samples
        .map(|(node, elapsed)| Hold {
            node,
            delay: elapsed.saturating_sub(reference_elapsed),
        })
        .collect();

    CatchUpDecision::CatchUp(CatchUpPlan {
        reference,
        reference_elapsed,
        holds,
        spread,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncReport {
    /// The pool was not playing, or had fewer than two responsive nodes.
    Skipped,
    InSync { spread: Duration },
    CaughtUp {
        reference: NodeId,
        holds: Vec<(NodeId, Duration)>,
    },
    /// A user transition ended the pass before every hold completed.
    Interrupted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HoldOutcome {
    NotNeeded,
    Resumed,
    Interrupted,
    Failed,
}

pub struct SyncAlgorithm {
    pool: Arc<PoolCoordinator>,
}

impl SyncAlgorithm {
    pub fn new(pool: Arc<PoolCoordinator>) -> Self {
        Self { pool }
    }

    /// Runs passes every check interval while the pool is playing, until
    /// the pool shuts down.
    pub async fn run(&self) {
        let mut states = self.pool.subscribe();
        let interval = self.pool.settings().check_interval;
        info!(?interval, "Sync loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.pool.cancelled() => break,
                playing = wait_until(&mut states, GlobalState::Playing) => {
                    if !playing {
                        break;
                    }
                }
            }

            let report = self.run_pass().await;
            debug!(?report, "Sync pass done");

            tokio::select! {
                biased;
                _ = self.pool.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Sync loop stopped");
    }

    /// Runs a single poll-and-catch-up pass.
    pub async fn run_pass(&self) -> SyncReport {
        self.pool.prune_closed().await;
        if self.pool.state().await != GlobalState::Playing {
            return SyncReport::Skipped;
        }

        let nodes = self.pool.live_nodes();
        if nodes.len() < 2 {
            return SyncReport::Skipped;
        }

        let samples = self.poll(&nodes).await;
        if samples.len() < 2 {
            return SyncReport::Skipped;
        }

        let plan = match plan_catch_up(samples, self.pool.settings().threshold) {
            CatchUpDecision::InSync { spread } => {
                debug!(?spread, "Nodes in sync");
                return SyncReport::InSync { spread };
            }
            CatchUpDecision::CatchUp(plan) => plan,
        };

        if !self.pool.begin_pass().await {
            return SyncReport::Skipped;
        }
        info!(
            reference = %plan.reference.description(),
            elapsed = ?plan.reference_elapsed,
            spread = ?plan.spread,
            "Catching up"
        );

        // The reference must keep advancing while the others wait.
        self.pool.command_if_busy(&plan.reference, true).await;

        let holds = plan
            .holds
            .iter()
            .map(|hold| self.hold(&hold.node, hold.delay));
        let outcomes = join_all(holds).await;

        let interrupted = outcomes.contains(&HoldOutcome::Interrupted);
        if !self.pool.end_pass().await || interrupted {
            info!("Sync pass interrupted");
            return SyncReport::Interrupted;
        }

        SyncReport::CaughtUp {
            reference: plan.reference.id(),
            holds: plan
                .holds
                .iter()
                .map(|hold| (hold.node.id(), hold.delay))
                .collect(),
        }
    }

    /// Polls every node concurrently. Nodes that fail or report no
    /// position are left out of this pass.
    async fn poll(&self, nodes: &[Arc<NodeClient>]) -> Vec<(Arc<NodeClient>, Duration)> {
        let polls = nodes.iter().map(|node| async move {
            if let Err(err) = self.pool.poll_node(node).await {
                warn!(node = %node.description(), error = %err, "Poll failed, node skipped for this pass");
                return None;
            }
            let elapsed = node.elapsed()?;
            debug!(node = %node.description(), ?elapsed, "Polled");
            Some((Arc::clone(node), elapsed))
        });
        join_all(polls).await.into_iter().flatten().collect()
    }

    async fn hold(&self, node: &NodeClient, delay: Duration) -> HoldOutcome {
        if delay.is_zero() {
            return HoldOutcome::NotNeeded;
        }

        let mut states = self.pool.subscribe();
        if !self.pool.command_if_busy(node, false).await {
            return if self.pool.state().await == GlobalState::Busy {
                HoldOutcome::Failed
            } else {
                HoldOutcome::Interrupted
            };
        }
        info!(node = %node.description(), ?delay, "Holding node");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_until_not_busy(&mut states) => {
                info!(node = %node.description(), "Hold interrupted");
                return HoldOutcome::Interrupted;
            }
        }

        if self.pool.command_if_busy(node, true).await {
            debug!(node = %node.description(), "Hold released");
            HoldOutcome::Resumed
        } else {
            HoldOutcome::Interrupted
        }
    }
}

/// Waits for `state` to be published. Returns false if the pool is gone.
async fn wait_until(states: &mut watch::Receiver<GlobalState>, state: GlobalState) -> bool {
    states.wait_for(|s| *s == state).await.is_ok()
}

async fn wait_until_not_busy(states: &mut watch::Receiver<GlobalState>) {
    if states.wait_for(|s| *s != GlobalState::Busy).await.is_err() {
        std::future::pending::<()>().await;
    }
}
