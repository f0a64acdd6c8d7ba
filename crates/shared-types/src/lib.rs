//! # Shared Types Crate
//!
//! Identifiers and primitives shared by the transfer engine, the broadcast
//! coordinator and the node runtime.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: block/file hashes, peer addresses and the
//!   numeric ids handed out to peers are defined once, here.
//! - **Content Addressing**: a block is identified by the lowercase hex
//!   SHA-256 of its bytes (`content_hash`).

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
