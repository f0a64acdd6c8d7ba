//! # Adapters Module
//!
//! In-process implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `storage`: in-memory and file-backed `KeyValueStore`
//! - `serializer`: bincode `RecordSerializer`
//! - `infra`: clocks and id sources
//! - `chain`: in-memory `PaymentChain`
//! - `blocks`: in-memory `BlockRepository`

pub mod blocks;
pub mod chain;
pub mod infra;
pub mod serializer;
pub mod storage;

pub use blocks::InMemoryBlockRepository;
pub use chain::InMemoryPaymentChain;
pub use infra::{FixedTimeSource, RandomIdSource, ScriptedIdSource, SystemTimeSource};
pub use serializer::BincodeRecordSerializer;
pub use storage::{FileBackedKVStore, InMemoryKVStore};
