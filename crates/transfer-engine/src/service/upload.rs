//! # Upload Tasks
//!
//! Serving-side lifecycle: a peer pushes blocks of one file to this node.

use super::{list_summaries, SharedStore};
use crate::domain::entities::{TransferredBlock, TaskSummary, UploadRecord};
use crate::domain::errors::TransferError;
use crate::domain::keys::{TaskKey, TaskPartition};
use crate::domain::reconciler::{partition_blocks, BlockPartition};
use crate::domain::value_objects::OrderedManifest;
use crate::ports::outbound::{KeyValueStore, RecordSerializer, TimeSource};
use shared_types::{validate_peer_address, BlockHash};
use std::sync::Arc;
use tracing::{debug, info};

pub struct UploadTasks<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    store: SharedStore<KV, S>,
    time_source: Arc<dyn TimeSource>,
}

impl<KV, S> UploadTasks<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    pub fn new(store: SharedStore<KV, S>, time_source: Arc<dyn TimeSource>) -> Self {
        Self { store, time_source }
    }

    /// Create an empty in-progress record.
    ///
    /// Overwrites any in-progress record for the same file. Request
    /// handlers go through [`UploadTasks::create_if_absent`] instead.
    pub fn create(&self, peer: &str, file_hash: &str, prefix: Vec<u8>) -> Result<UploadRecord, TransferError> {
        check_identity(peer, file_hash)?;
        let record = UploadRecord::new(peer, file_hash, prefix, self.time_source.now());
        self.store.lock().put(&record, TaskPartition::Doing)?;

        info!(peer, file_hash, "[transfer] 📤 upload task created");
        Ok(record)
    }

    /// Create the in-progress record unless one already exists.
    ///
    /// The lookup and the write happen under one store lock, so a racing
    /// create can never replace a task that has started recording blocks.
    /// `Ok(false)` if the task was already there.
    pub fn create_if_absent(&self, peer: &str, file_hash: &str, prefix: Vec<u8>) -> Result<bool, TransferError> {
        check_identity(peer, file_hash)?;
        let mut store = self.store.lock();
        let key = TaskKey::upload(peer, file_hash, TaskPartition::Doing);
        if store.find::<UploadRecord>(&key)?.is_some() {
            debug!(peer, file_hash, "[transfer] upload task already exists");
            return Ok(false);
        }
        let record = UploadRecord::new(peer, file_hash, prefix, self.time_source.now());
        store.put(&record, TaskPartition::Doing)?;
        drop(store);

        info!(peer, file_hash, "[transfer] 📤 upload task created");
        Ok(true)
    }

    /// The in-progress record, `TaskNotFound` if absent.
    pub fn get(&self, peer: &str, file_hash: &str) -> Result<UploadRecord, TransferError> {
        self.store
            .lock()
            .get(&TaskKey::upload(peer, file_hash, TaskPartition::Doing))
    }

    pub fn find(&self, peer: &str, file_hash: &str) -> Result<Option<UploadRecord>, TransferError> {
        self.store
            .lock()
            .find(&TaskKey::upload(peer, file_hash, TaskPartition::Doing))
    }

    /// Split `candidates` into hashes the in-progress task already holds
    /// and hashes still missing.
    pub fn reconcile(&self, peer: &str, file_hash: &str, candidates: &[BlockHash]) -> Result<BlockPartition, TransferError> {
        let record = self.get(peer, file_hash)?;
        Ok(partition_blocks(record.ledger.block_hashes(), candidates))
    }

    /// Append blocks in arrival order and persist.
    ///
    /// No deduplication happens here; filter with
    /// [`UploadTasks::reconcile`] first.
    pub fn record_blocks(
        &self,
        peer: &str,
        file_hash: &str,
        blocks: &[TransferredBlock],
    ) -> Result<UploadRecord, TransferError> {
        let key = TaskKey::upload(peer, file_hash, TaskPartition::Doing);
        let mut store = self.store.lock();

        let mut record: UploadRecord = store.get(&key)?;
        record.ledger.append(blocks);
        if !blocks.is_empty() {
            record.is_sorted = false;
        }
        store.put(&record, TaskPartition::Doing)?;

        debug!(key = %key, added = blocks.len(), total = record.ledger.len(), "[transfer] upload blocks recorded");
        Ok(record)
    }

    /// Hashes and indexes in canonical order, plus the file prefix.
    ///
    /// Sorts and persists the record the first time it is asked for;
    /// later calls reuse the stored order. Looks in the in-progress
    /// partition first, then the done partition.
    pub fn ordered_manifest(&self, peer: &str, file_hash: &str) -> Result<OrderedManifest, TransferError> {
        let doing_key = TaskKey::upload(peer, file_hash, TaskPartition::Doing);
        let mut store = self.store.lock();

        let (mut record, partition) = match store.find::<UploadRecord>(&doing_key)? {
            Some(record) => (record, TaskPartition::Doing),
            None => {
                let done_key = doing_key.with_partition(TaskPartition::Done);
                (store.get::<UploadRecord>(&done_key)?, TaskPartition::Done)
            }
        };

        if !record.is_sorted {
            record.ledger.sort_by_index()?;
            record.is_sorted = true;
            store.put(&record, partition)?;
            debug!(key = %doing_key.with_partition(partition), "[transfer] upload ledger sorted");
        }

        Ok(OrderedManifest {
            hashes: record.ledger.block_hashes().to_vec(),
            indexes: record.ledger.block_indexes().to_vec(),
            prefix: record.prefix,
        })
    }

    /// Move the task to the done partition.
    pub fn complete(&self, peer: &str, file_hash: &str) -> Result<UploadRecord, TransferError> {
        let record: UploadRecord = self
            .store
            .lock()
            .complete(&TaskKey::upload(peer, file_hash, TaskPartition::Doing))?;
        info!(peer, file_hash, blocks = record.ledger.len(), "[transfer] ✅ upload task completed");
        Ok(record)
    }

    /// Remove the task from `partition`. `Ok(false)` if it was not there.
    pub fn delete(&self, peer: &str, file_hash: &str, partition: TaskPartition) -> Result<bool, TransferError> {
        let removed = self
            .store
            .lock()
            .delete(&TaskKey::upload(peer, file_hash, partition))?;
        if removed {
            info!(peer, file_hash, partition = partition.as_str(), "[transfer] 🗑️ upload task deleted");
        }
        Ok(removed)
    }

    pub fn list(&self, peer: &str, partition: TaskPartition) -> Result<Vec<TaskSummary>, TransferError> {
        list_summaries::<UploadRecord, _, _>(&self.store, peer, partition)
    }
}

fn check_identity(peer: &str, file_hash: &str) -> Result<(), TransferError> {
    validate_peer_address(peer)?;
    if file_hash.is_empty() {
        return Err(TransferError::parameter("fileHash is required"));
    }
    Ok(())
}
