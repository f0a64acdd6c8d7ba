//! # Block Transfer Engine
//!
//! Tracks per-peer, per-file upload and download progress, gates block
//! delivery on proof of payment, and skips blocks a task already holds.
//!
//! ## Flow
//!
//! ```text
//! peer ──putBlocks──→ UploadTasks ──reconcile──→ BlockRepository
//!                          │
//! buyer ─issuePayment─→ PaymentGate ──ticket──→ TaskStore
//!                          │
//! buyer ─downloadBlocks─→ PaymentGate.authorize_release ──chain──→ PaymentChain
//!                          │
//!                          └──→ DownloadTasks.record_blocks (record + spend, one batch)
//! ```
//!
//! ## Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Aligned ledger | `block_hashes` and `block_indexes` always have equal length |
//! | Monotonic status | Completed tasks live in the done partition; nothing moves back |
//! | Atomic completion | Done write and doing delete are one batch |
//! | Single spend | A ticket releases its blocks once, then reserves nothing |
//! | All-or-nothing release | One uncovered hash rejects the whole download |
//! | Serialized mutations | One engine-wide lock around the store |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Keys, records, reconciliation, errors
//! - `ports/` - Outbound traits (KV store, serializer, chain, blocks, time, ids)
//! - `adapters/` - In-process adapters for tests and light deployments
//! - `service/` - `TaskStore`, `UploadTasks`, `DownloadTasks`, `PaymentGate`
//! - `api/` - Request/response handler
//!
//! ## Usage
//!
//! ```ignore
//! use transfer_engine::{TransferService, TransferDependencies, TransferConfig};
//!
//! let service = TransferService::new(deps, TransferConfig::default());
//! service.uploads().create(peer, file_hash, prefix)?;
//! let quote = service.payments().issue_ticket(&hashes)?;
//! ```

pub mod adapters;
pub mod api;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export key types for convenience
pub use domain::entities::{
    BlockLedger, DownloadRecord, PaymentTicket, TaskRecord, TaskStatus, TaskSummary, TransferredBlock, UploadRecord,
};
pub use domain::errors::{ChainClientError, KVStoreError, SerializationError, TransferError};
pub use domain::keys::{TaskDirection, TaskKey, TaskPartition};
pub use domain::reconciler::{partition_blocks, BlockPartition};
pub use domain::value_objects::{Authorization, OrderedManifest, PaymentQuote, TransferConfig};
pub use ports::outbound::{
    BatchOperation, BlockPayload, BlockRepository, ContractEvent, IdSource, KeyValueStore, Notification,
    PaymentChain, RecordSerializer, ScanResult, TimeSource,
};
pub use service::{
    DownloadTasks, PaymentGate, ScannedRecord, SharedStore, TaskStore, TransferDependencies, TransferService,
    UploadTasks,
};

// Re-export API types
pub use api::{handle_api_query, ApiQueryError, ApiResponse, TransferApiHandler};
