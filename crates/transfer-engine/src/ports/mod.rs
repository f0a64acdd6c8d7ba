//! # Ports Layer
//!
//! Traits the engine depends on. The engine's own API is the concrete
//! service types in `crate::service`, so there is no inbound trait.

pub mod outbound;

pub use outbound::*;
