//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the transfer engine requires the host to provide.
//!
//! Production adapters live in `node-runtime` (RocksDB store, block files,
//! JSON-RPC chain client); in-process adapters for tests live in
//! `crate::adapters`.

use crate::domain::errors::{ChainClientError, KVStoreError, SerializationError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, PaymentId, Timestamp};

/// Result type of a prefix scan: `(key, value)` pairs in key order.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for key-value database operations.
///
/// Production: `RocksDbStore` (node-runtime/adapters/rocksdb_adapter.rs)
/// Testing: `InMemoryKVStore`
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// All pairs whose key starts with `prefix`, ordered by key.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Encoding of persisted records and tickets.
///
/// Must round-trip every field losslessly, including sequence order and
/// map contents.
pub trait RecordSerializer: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

/// Source of random task and payment ids.
pub trait IdSource: Send + Sync {
    /// A value in `1..=MAX_RANDOM_ID`.
    fn next_id(&self) -> u32;
}

/// A smart-contract event fetched by transaction hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub tx_hash: String,
    /// Block height the transaction was included at.
    pub height: u64,
    pub notifications: Vec<Notification>,
}

impl ContractEvent {
    /// True if any notification carries exactly `payment_id`.
    pub fn carries_payment(&self, payment_id: PaymentId) -> bool {
        self.notifications
            .iter()
            .any(|n| n.payment_ids().contains(&payment_id))
    }
}

/// One notification emitted by a contract invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub contract_address: String,
    /// Decoded notification state as returned by the chain node.
    pub states: serde_json::Value,
}

impl Notification {
    /// Payment ids found in the decoded state.
    ///
    /// Accepts an object with a `paymentId` field (number or numeric
    /// string), or an array of such objects.
    pub fn payment_ids(&self) -> Vec<PaymentId> {
        match &self.states {
            serde_json::Value::Array(items) => items.iter().filter_map(read_payment_id).collect(),
            other => read_payment_id(other).into_iter().collect(),
        }
    }
}

fn read_payment_id(state: &serde_json::Value) -> Option<PaymentId> {
    match state.get("paymentId")? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| PaymentId::try_from(v).ok()),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Blockchain client used as the proof-of-payment source.
#[async_trait]
pub trait PaymentChain: Send + Sync {
    /// Fetch the contract event of a transaction. `Ok(None)` if unknown.
    async fn smart_contract_event(&self, tx_hash: &str) -> Result<Option<ContractEvent>, ChainClientError>;

    /// Resolve once the chain has reached `height`.
    async fn wait_for_confirmation(&self, height: u64) -> Result<(), ChainClientError>;
}

/// Stored block payload with its proof tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub data: Vec<u8>,
    /// Opaque proof-of-storage tag, passed through verbatim.
    pub tag: Vec<u8>,
}

/// Where block bytes live. Task records only track hashes.
pub trait BlockRepository: Send + Sync {
    fn put_block(&self, hash: &BlockHash, payload: &BlockPayload) -> Result<(), KVStoreError>;

    fn get_block(&self, hash: &BlockHash) -> Result<Option<BlockPayload>, KVStoreError>;
}
