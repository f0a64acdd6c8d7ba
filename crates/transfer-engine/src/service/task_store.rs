//! # Task Store
//!
//! Typed ledger of task records and payment tickets on top of a
//! `KeyValueStore`. The store is the only writer of task and ticket keys.

use crate::domain::entities::{PaymentTicket, TaskRecord, TaskStatus};
use crate::domain::errors::TransferError;
use crate::domain::keys::{ticket_key, TaskKey, TaskPartition};
use crate::ports::outbound::{BatchOperation, KeyValueStore, RecordSerializer};
use serde::Serialize;
use shared_types::PaymentId;
use tracing::{debug, warn};

/// One entry returned by a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedRecord<R> {
    Valid(R),
    /// Bytes under `key` could not be decoded.
    Corrupt { key: TaskKey, message: String },
}

/// Key-value backed ledger of task records and payment tickets.
pub struct TaskStore<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    kv_store: KV,
    serializer: S,
}

impl<KV, S> TaskStore<KV, S>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    pub fn new(kv_store: KV, serializer: S) -> Self {
        Self {
            kv_store,
            serializer,
        }
    }

    /// Underlying key-value store.
    pub fn kv_store(&self) -> &KV {
        &self.kv_store
    }

    pub fn kv_store_mut(&mut self) -> &mut KV {
        &mut self.kv_store
    }

    /// Write `record` under its key in `partition`.
    pub fn put<R: TaskRecord>(&mut self, record: &R, partition: TaskPartition) -> Result<(), TransferError> {
        let key = record.key(partition);
        let bytes = self.encode(record, &key)?;
        self.kv_store.put(&key.encode(), &bytes)?;
        debug!(key = %key, "[transfer] record stored");
        Ok(())
    }

    /// Read the record at `key`, `TaskNotFound` if absent.
    pub fn get<R: TaskRecord>(&self, key: &TaskKey) -> Result<R, TransferError> {
        self.find(key)?.ok_or_else(|| TransferError::TaskNotFound {
            key: key.to_string(),
        })
    }

    /// Read the record at `key` if present.
    pub fn find<R: TaskRecord>(&self, key: &TaskKey) -> Result<Option<R>, TransferError> {
        match self.kv_store.get(&key.encode())? {
            Some(bytes) => self
                .serializer
                .decode(&bytes)
                .map(Some)
                .map_err(|e| e.at_key(key)),
            None => Ok(None),
        }
    }

    /// Remove the entry at `key`. Returns whether anything was there.
    pub fn delete(&mut self, key: &TaskKey) -> Result<bool, TransferError> {
        let raw = key.encode();
        if !self.kv_store.exists(&raw)? {
            return Ok(false);
        }
        self.kv_store.delete(&raw)?;
        debug!(key = %key, "[transfer] record deleted");
        Ok(true)
    }

    /// Every record of type `R` stored for `peer` in `partition`, in key
    /// order. Undecodable entries are returned as `Corrupt`.
    pub fn scan<R: TaskRecord>(
        &self,
        peer: &str,
        partition: TaskPartition,
    ) -> Result<Vec<ScannedRecord<R>>, TransferError> {
        let prefix = TaskKey::prefix(peer, R::DIRECTION, partition);
        let entries = self.kv_store.prefix_scan(&prefix)?;

        let records = entries
            .into_iter()
            .map(|(raw_key, bytes)| {
                let key = TaskKey::decode(&raw_key).unwrap_or_else(|| {
                    TaskKey::new(peer, R::DIRECTION, partition, hex::encode(&raw_key))
                });
                match self.serializer.decode::<R>(&bytes) {
                    Ok(record) => ScannedRecord::Valid(record),
                    Err(e) => {
                        warn!(key = %key, error = %e, "[transfer] undecodable record skipped");
                        ScannedRecord::Corrupt {
                            key,
                            message: e.message,
                        }
                    }
                }
            })
            .collect();
        Ok(records)
    }

    /// Move the record at `doing_key` to the done partition in one atomic
    /// batch and mark it `Completed`.
    ///
    /// Retrying after a completed move returns the done record.
    pub fn complete<R: TaskRecord>(&mut self, doing_key: &TaskKey) -> Result<R, TransferError> {
        let done_key = doing_key.with_partition(TaskPartition::Done);

        let Some(mut record) = self.find::<R>(doing_key)? else {
            return match self.find::<R>(&done_key)? {
                Some(done) => {
                    debug!(key = %done_key, "[transfer] task already completed");
                    Ok(done)
                }
                None => Err(TransferError::TaskNotFound {
                    key: doing_key.to_string(),
                }),
            };
        };

        record.set_status(TaskStatus::Completed);
        let bytes = self.encode(&record, &done_key)?;
        self.kv_store.atomic_batch_write(vec![
            BatchOperation::put(done_key.encode(), bytes),
            BatchOperation::delete(doing_key.encode()),
        ])?;
        Ok(record)
    }

    pub fn get_ticket(&self, payment_id: PaymentId) -> Result<Option<PaymentTicket>, TransferError> {
        match self.kv_store.get(&ticket_key(payment_id))? {
            Some(bytes) => self
                .serializer
                .decode(&bytes)
                .map(Some)
                .map_err(|e| e.at_key(format!("ticket/{payment_id}"))),
            None => Ok(None),
        }
    }

    pub fn ticket_exists(&self, payment_id: PaymentId) -> Result<bool, TransferError> {
        Ok(self.kv_store.exists(&ticket_key(payment_id))?)
    }

    pub fn put_ticket(&mut self, ticket: &PaymentTicket) -> Result<(), TransferError> {
        let op = self.ticket_operation(ticket)?;
        self.commit(vec![op])
    }

    /// Batch operation writing `ticket`.
    pub fn ticket_operation(&self, ticket: &PaymentTicket) -> Result<BatchOperation, TransferError> {
        let bytes = self.encode(ticket, format!("ticket/{}", ticket.payment_id))?;
        Ok(BatchOperation::put(ticket_key(ticket.payment_id), bytes))
    }

    /// Batch operation writing `record` under `partition`.
    pub fn record_operation<R: TaskRecord>(
        &self,
        record: &R,
        partition: TaskPartition,
    ) -> Result<BatchOperation, TransferError> {
        let key = record.key(partition);
        let bytes = self.encode(record, &key)?;
        Ok(BatchOperation::put(key.encode(), bytes))
    }

    /// Apply `operations` atomically.
    pub fn commit(&mut self, operations: Vec<BatchOperation>) -> Result<(), TransferError> {
        self.kv_store.atomic_batch_write(operations)?;
        Ok(())
    }

    fn encode<T: Serialize>(&self, value: &T, key: impl std::fmt::Display) -> Result<Vec<u8>, TransferError> {
        self.serializer
            .encode(value)
            .map_err(|e| TransferError::StoreIo {
                message: format!("cannot encode {key}: {}", e.message),
            })
    }
}
