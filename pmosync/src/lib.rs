//! # pmosync
//!
//! Keeps several Kodi players on the same position in the same item.
//!
//! A [`PoolCoordinator`] holds one [`pmokodi::NodeClient`] per node and a
//! global state (playing, paused, busy). A user pausing or resuming any node
//! pauses or resumes all the others. Meanwhile a [`SyncAlgorithm`]
//! periodically polls every node and, when the gap between the most and the
//! least advanced node exceeds the threshold, pauses the nodes running ahead
//! for exactly their lead.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pmokodi::NodeIdentity;
//! use pmosync::{PoolCoordinator, SyncAlgorithm, SyncSettings};
//!
//! # async fn demo() -> Result<(), pmosync::SyncError> {
//! let pool = Arc::new(PoolCoordinator::new(SyncSettings::default()));
//! pool.connect_all(vec![
//!     NodeIdentity::new("salon:9090", "kodi", "kodi"),
//!     NodeIdentity::new("cuisine:9090", "kodi", "kodi"),
//! ])
//! .await?;
//! pool.play_all().await;
//!
//! let listener = tokio::spawn({
//!     let pool = Arc::clone(&pool);
//!     async move { pool.run_notification_listener().await }
//! });
//! SyncAlgorithm::new(Arc::clone(&pool)).run().await;
//! # let _ = listener;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod logs;
pub mod pool;
pub mod settings;
pub mod state;
pub mod sync;

pub use errors::SyncError;
pub use pool::PoolCoordinator;
pub use settings::SyncSettings;
pub use state::{GlobalState, PoolEvent, StateMachine};
pub use sync::{CatchUpDecision, CatchUpPlan, Hold, SyncAlgorithm, SyncReport, plan_catch_up};
