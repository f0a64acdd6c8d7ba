//! # Peer Broadcast
//!
//! Bounded-concurrency fan-out of one message to many peers.
//!
//! ## Guarantees
//!
//! | Guarantee | Description |
//! |-----------|-------------|
//! | Bounded concurrency | At most `max_concurrency` attempts in flight |
//! | Batch-boundary stop | `should_stop` is checked only between batches |
//! | No dropped attempts | Every dispatched attempt lands in the report |
//! | Single collector | Outcomes are merged by one loop, never written concurrently |
//!
//! ## Retry
//!
//! `request_with_retry` re-issues a request only after a timeout. Refused
//! connections and protocol errors fail immediately.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = BroadcastCoordinator::new(transport, BroadcastConfig::default());
//! let report = coordinator
//!     .broadcast(&peers, NetworkMessage::new("/dfs/announce/1.0.0", payload), false, || false, on_result)
//!     .await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryTransport, PeerBehavior};
pub use domain::{BroadcastConfig, BroadcastError, BroadcastReport, FailurePolicy, PeerOutcome};
pub use ports::{NetworkMessage, PeerTransport};
pub use service::{BroadcastCoordinator, ResultCallback};
