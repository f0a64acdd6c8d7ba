//! # Core Entities
//!
//! Persisted task records and payment tickets.
//!
//! ## Clusters
//!
//! - **Ledger**: `TransferredBlock`, `BlockLedger`
//! - **Records**: `UploadRecord`, `DownloadRecord`, `TaskRecord`
//! - **Payment**: `PaymentTicket`
//! - **Listing**: `TaskSummary`

use super::errors::TransferError;
use super::keys::{TaskDirection, TaskKey, TaskPartition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, DownloadTaskId, FileHash, PaymentId, PeerAddress, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle status of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    InProgress,
    Completed,
    Deleted,
    /// Reported for stored entries that fail to decode. Never persisted.
    Corrupt,
}

/// One block as reported by the caller of `record_blocks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredBlock {
    pub hash: BlockHash,
    /// Canonical position of the block within its file.
    pub index: u64,
    /// Peers known to hold or to have delivered the block.
    pub holders: BTreeSet<PeerAddress>,
}

impl TransferredBlock {
    pub fn new(hash: impl Into<BlockHash>, index: u64) -> Self {
        Self {
            hash: hash.into(),
            index,
            holders: BTreeSet::new(),
        }
    }

    pub fn held_by(mut self, peer: impl Into<PeerAddress>) -> Self {
        self.holders.insert(peer.into());
        self
    }
}

/// Hash/index sequences of a task, kept aligned by position.
///
/// Fields are private so that every mutation goes through methods that
/// keep `block_hashes.len() == block_indexes.len()`. A record decoded
/// from storage may still violate it; `sort_by_index` reports that as
/// `SortError`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLedger {
    block_hashes: Vec<BlockHash>,
    block_indexes: Vec<u64>,
    node_list_by_hash: BTreeMap<BlockHash, BTreeSet<PeerAddress>>,
}

impl BlockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from raw parts without checking alignment.
    pub(crate) fn from_parts(
        block_hashes: Vec<BlockHash>,
        block_indexes: Vec<u64>,
        node_list_by_hash: BTreeMap<BlockHash, BTreeSet<PeerAddress>>,
    ) -> Self {
        Self {
            block_hashes,
            block_indexes,
            node_list_by_hash,
        }
    }

    /// Append blocks in arrival order. Duplicates are appended as well.
    pub fn append(&mut self, blocks: &[TransferredBlock]) {
        for block in blocks {
            self.block_hashes.push(block.hash.clone());
            self.block_indexes.push(block.index);
            self.node_list_by_hash
                .entry(block.hash.clone())
                .or_default()
                .extend(block.holders.iter().cloned());
        }
    }

    pub fn block_hashes(&self) -> &[BlockHash] {
        &self.block_hashes
    }

    pub fn block_indexes(&self) -> &[u64] {
        &self.block_indexes
    }

    pub fn node_list_by_hash(&self) -> &BTreeMap<BlockHash, BTreeSet<PeerAddress>> {
        &self.node_list_by_hash
    }

    pub fn holders_of(&self, hash: &str) -> Option<&BTreeSet<PeerAddress>> {
        self.node_list_by_hash.get(hash)
    }

    pub fn len(&self) -> usize {
        self.block_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_hashes.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.block_hashes.len() == self.block_indexes.len()
    }

    /// Reorder both sequences ascending by index.
    ///
    /// Stable: blocks sharing an index keep their arrival order.
    pub fn sort_by_index(&mut self) -> Result<(), TransferError> {
        if !self.is_consistent() {
            return Err(TransferError::SortError {
                hashes: self.block_hashes.len(),
                indexes: self.block_indexes.len(),
            });
        }

        let mut pairs: Vec<(u64, BlockHash)> = self
            .block_indexes
            .drain(..)
            .zip(self.block_hashes.drain(..))
            .collect();
        pairs.sort_by_key(|(index, _)| *index);

        for (index, hash) in pairs {
            self.block_indexes.push(index);
            self.block_hashes.push(hash);
        }
        Ok(())
    }
}

/// Serving-side record: blocks a peer uploaded to this node for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub peer_address: PeerAddress,
    pub file_hash: FileHash,
    pub ledger: BlockLedger,
    pub status: TaskStatus,
    pub created_at: Timestamp,
    pub is_sorted: bool,
    /// Opaque file header handed back to downloaders verbatim.
    pub prefix: Vec<u8>,
}

impl UploadRecord {
    pub fn new(
        peer_address: impl Into<PeerAddress>,
        file_hash: impl Into<FileHash>,
        prefix: Vec<u8>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            peer_address: peer_address.into(),
            file_hash: file_hash.into(),
            ledger: BlockLedger::new(),
            status: TaskStatus::InProgress,
            created_at,
            is_sorted: false,
            prefix,
        }
    }
}

/// Consuming-side record: blocks released to a paying peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub task_id: DownloadTaskId,
    pub peer_address: PeerAddress,
    /// Unknown until the first block batch names the file.
    pub file_hash: Option<FileHash>,
    pub ledger: BlockLedger,
    pub status: TaskStatus,
    pub created_at: Timestamp,
}

impl DownloadRecord {
    pub fn new(task_id: DownloadTaskId, peer_address: impl Into<PeerAddress>, created_at: Timestamp) -> Self {
        Self {
            task_id,
            peer_address: peer_address.into(),
            file_hash: None,
            ledger: BlockLedger::new(),
            status: TaskStatus::InProgress,
            created_at,
        }
    }
}

/// A reservation binding block hashes to a payment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTicket {
    pub payment_id: PaymentId,
    /// Emptied once the blocks are released; the ticket itself is kept.
    pub reserved_hashes: Vec<BlockHash>,
    pub amount_due: u64,
    pub created_at: Timestamp,
}

impl PaymentTicket {
    pub fn is_spent(&self) -> bool {
        self.reserved_hashes.is_empty()
    }

    pub fn spend(&mut self) {
        self.reserved_hashes.clear();
    }
}

/// Listing row for one stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub peer_address: PeerAddress,
    pub file_hash: Option<FileHash>,
    pub status: TaskStatus,
    pub block_count: usize,
    pub created_at: Timestamp,
}

impl TaskSummary {
    /// Row for an entry whose bytes could not be decoded.
    pub fn corrupt(key: &TaskKey) -> Self {
        Self {
            task_id: key.id.clone(),
            peer_address: key.peer.clone(),
            file_hash: None,
            status: TaskStatus::Corrupt,
            block_count: 0,
            created_at: 0,
        }
    }
}

/// Behaviour shared by upload and download records, so one `TaskStore`
/// serves both directions.
pub trait TaskRecord: Serialize + DeserializeOwned + Send {
    const DIRECTION: TaskDirection;

    fn peer_address(&self) -> &str;
    fn task_id(&self) -> String;
    fn status(&self) -> TaskStatus;
    fn set_status(&mut self, status: TaskStatus);
    fn ledger(&self) -> &BlockLedger;
    fn file_hash(&self) -> Option<&str>;
    fn created_at(&self) -> Timestamp;

    fn key(&self, partition: TaskPartition) -> TaskKey {
        TaskKey::new(self.peer_address(), Self::DIRECTION, partition, self.task_id())
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id(),
            peer_address: self.peer_address().to_string(),
            file_hash: self.file_hash().map(str::to_string),
            status: self.status(),
            block_count: self.ledger().len(),
            created_at: self.created_at(),
        }
    }
}

impl TaskRecord for UploadRecord {
    const DIRECTION: TaskDirection = TaskDirection::Upload;

    fn peer_address(&self) -> &str {
        &self.peer_address
    }

    fn task_id(&self) -> String {
        self.file_hash.clone()
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    fn ledger(&self) -> &BlockLedger {
        &self.ledger
    }

    fn file_hash(&self) -> Option<&str> {
        Some(&self.file_hash)
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl TaskRecord for DownloadRecord {
    const DIRECTION: TaskDirection = TaskDirection::Download;

    fn peer_address(&self) -> &str {
        &self.peer_address
    }

    fn task_id(&self) -> String {
        self.task_id.to_string()
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    fn ledger(&self) -> &BlockLedger {
        &self.ledger
    }

    fn file_hash(&self) -> Option<&str> {
        self.file_hash.as_deref()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}
