//! # pmokodi
//!
//! Websocket JSON-RPC client for Kodi media centers.
//!
//! A [`NodeClient`] keeps one authenticated connection per Kodi instance,
//! numbers outgoing requests, matches responses back to them whatever order
//! they arrive in, and routes the notifications Kodi pushes on its own
//! (`Player.OnPause`, `Player.OnResume`, …) to per-node subscribers and to a
//! pool-wide queue.
//!
//! ```no_run
//! use pmokodi::{NodeClient, NodeIdentity, Operation, methods};
//!
//! # async fn demo() -> Result<(), pmokodi::KodiError> {
//! let identity = NodeIdentity::new("192.168.1.20:9090", "kodi", "secret");
//! let client = NodeClient::connect(identity, None).await?;
//!
//! client
//!     .request_and_wait(
//!         methods::get_properties(methods::DEFAULT_PLAYER_ID, &[methods::PlayerProperty::Time]),
//!         Operation::RecordElapsed,
//!     )
//!     .await?;
//! println!("elapsed: {:?}", client.elapsed());
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod correlator;
pub mod errors;
pub mod identity;
pub mod message;
pub mod methods;
pub mod router;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{NodeClient, PendingResponse, PlayState, PlaybackSnapshot, handshake_request};
pub use correlator::{Correlator, IdAllocator, Operation, ResponseOutcome};
pub use errors::KodiError;
pub use identity::{NodeId, NodeIdentity};
pub use message::{Inbound, Notification, PlayerProperties, PlayerTime, RpcCall, RpcRequest, RpcResponse};
pub use router::{NodeNotification, NotificationRouter, PoolSink, RouteOutcome};
