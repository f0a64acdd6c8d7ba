//! # Node Runtime Library
//!
//! Everything `main.rs` wires together, exposed for tests.
//!
//! ## Modules
//!
//! - `container/` - `NodeConfig` loading and the `TransferNode` container
//! - `adapters/` - Task store backends, block files, chain client, TCP transport
//! - `server` - Inbound frame listener
//! - `telemetry` - Tracing subscriber setup

pub mod adapters;
pub mod container;
pub mod server;
pub mod telemetry;

pub use container::{ConfigError, NodeConfig, NodeError, TransferNode};
