//! # Download Tasks
//!
//! Consuming-side lifecycle: blocks released to a peer that paid for them.

use super::payment::spend_operation;
use super::{list_summaries, SharedStore};
use crate::domain::entities::{DownloadRecord, TaskSummary, TransferredBlock};
use crate::domain::errors::TransferError;
use crate::domain::keys::{TaskKey, TaskPartition};
use crate::domain::value_objects::TransferConfig;
use crate::ports::outbound::{IdSource, KeyValueStore, RecordSerializer, TimeSource};
use shared_types::{validate_peer_address, DownloadTaskId, PaymentId};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DownloadTasks<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    store: SharedStore<KV, S>,
    time_source: Arc<dyn TimeSource>,
    id_source: Arc<dyn IdSource>,
    config: TransferConfig,
}

impl<KV, S> DownloadTasks<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    pub fn new(
        store: SharedStore<KV, S>,
        time_source: Arc<dyn TimeSource>,
        id_source: Arc<dyn IdSource>,
        config: TransferConfig,
    ) -> Self {
        Self {
            store,
            time_source,
            id_source,
            config,
        }
    }

    /// Create an empty in-progress record under a fresh random id.
    ///
    /// Ids already used by this peer in either partition are skipped.
    pub fn create(&self, peer: &str) -> Result<DownloadTaskId, TransferError> {
        validate_peer_address(peer)?;
        let mut store = self.store.lock();

        for _ in 0..self.config.max_id_attempts {
            let task_id = self.id_source.next_id();
            let doing = TaskKey::download(peer, task_id, TaskPartition::Doing);
            let done = doing.with_partition(TaskPartition::Done);

            if store.kv_store().exists(&doing.encode())? || store.kv_store().exists(&done.encode())? {
                debug!(task_id, "[transfer] download task id collision, retrying");
                continue;
            }

            let record = DownloadRecord::new(task_id, peer, self.time_source.now());
            store.put(&record, TaskPartition::Doing)?;

            info!(peer, task_id, "[transfer] 📥 download task created");
            return Ok(task_id);
        }

        Err(TransferError::IdExhausted {
            attempts: self.config.max_id_attempts,
        })
    }

    /// The in-progress record, `TaskNotFound` if absent.
    pub fn get(&self, peer: &str, task_id: DownloadTaskId) -> Result<DownloadRecord, TransferError> {
        self.store
            .lock()
            .get(&TaskKey::download(peer, task_id, TaskPartition::Doing))
    }

    /// Append delivered blocks and spend the ticket in one atomic batch.
    ///
    /// Fails without writing anything if the task or the ticket is
    /// missing, or if the ticket no longer reserves every delivered hash.
    pub fn record_blocks(
        &self,
        task_id: DownloadTaskId,
        peer: &str,
        file_hash: Option<&str>,
        blocks: &[TransferredBlock],
        payment_id: PaymentId,
    ) -> Result<DownloadRecord, TransferError> {
        let key = TaskKey::download(peer, task_id, TaskPartition::Doing);
        let mut store = self.store.lock();

        let mut record: DownloadRecord = store.get(&key)?;
        let delivered: Vec<_> = blocks.iter().map(|b| b.hash.clone()).collect();
        let spend = spend_operation(&*store, payment_id, &delivered)?;

        if let Some(hash) = file_hash {
            let known = record.file_hash.get_or_insert_with(|| hash.to_string());
            if known != hash {
                warn!(key = %key, known = %known, incoming = hash, "[transfer] ⚠️ download task spans files");
            }
        }
        record.ledger.append(blocks);

        let put = store.record_operation(&record, TaskPartition::Doing)?;
        store.commit(vec![put, spend])?;

        debug!(
            key = %key,
            payment_id,
            added = blocks.len(),
            total = record.ledger.len(),
            "[transfer] download blocks recorded"
        );
        Ok(record)
    }

    /// Move the task to the done partition.
    pub fn complete(&self, peer: &str, task_id: DownloadTaskId) -> Result<DownloadRecord, TransferError> {
        let record: DownloadRecord = self
            .store
            .lock()
            .complete(&TaskKey::download(peer, task_id, TaskPartition::Doing))?;
        info!(peer, task_id, blocks = record.ledger.len(), "[transfer] ✅ download task completed");
        Ok(record)
    }

    /// Remove the task from `partition`. `Ok(false)` if it was not there.
    pub fn delete(&self, peer: &str, task_id: DownloadTaskId, partition: TaskPartition) -> Result<bool, TransferError> {
        let removed = self
            .store
            .lock()
            .delete(&TaskKey::download(peer, task_id, partition))?;
        if removed {
            info!(peer, task_id, partition = partition.as_str(), "[transfer] 🗑️ download task deleted");
        }
        Ok(removed)
    }

    pub fn list(&self, peer: &str, partition: TaskPartition) -> Result<Vec<TaskSummary>, TransferError> {
        list_summaries::<DownloadRecord, _, _>(&self.store, peer, partition)
    }
}
