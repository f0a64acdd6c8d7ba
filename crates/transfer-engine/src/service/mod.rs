//! # Transfer Service
//!
//! Upload and download task lifecycles plus payment gating, sharing one
//! `TaskStore`.
//!
//! ## Architecture
//!
//! - One `parking_lot::Mutex` guards the store for the whole engine, so
//!   every task mutation is serialized process-wide
//! - The lock is taken and dropped inside synchronous sections; nothing
//!   holds it across an `.await`
//! - Chain lookups happen outside the lock in `PaymentGate`

mod download;
mod payment;
mod task_store;
mod upload;

pub use download::DownloadTasks;
pub use payment::PaymentGate;
pub use task_store::{ScannedRecord, TaskStore};
pub use upload::UploadTasks;

use crate::domain::entities::{TaskRecord, TaskSummary};
use crate::domain::errors::TransferError;
use crate::domain::keys::TaskPartition;
use crate::domain::value_objects::TransferConfig;
use crate::ports::outbound::{IdSource, KeyValueStore, PaymentChain, RecordSerializer, TimeSource};
use parking_lot::Mutex;
use std::sync::Arc;

/// Engine-wide handle to the task store.
pub type SharedStore<KV, S> = Arc<Mutex<TaskStore<KV, S>>>;

/// Dependencies for `TransferService`.
pub struct TransferDependencies<KV, S, C> {
    pub kv_store: KV,
    pub serializer: S,
    pub chain: Arc<C>,
    pub time_source: Arc<dyn TimeSource>,
    pub id_source: Arc<dyn IdSource>,
}

/// The block-transfer engine.
pub struct TransferService<KV, S, C>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
{
    store: SharedStore<KV, S>,
    uploads: UploadTasks<KV, S>,
    downloads: DownloadTasks<KV, S>,
    payments: PaymentGate<KV, S, C>,
}

impl<KV, S, C> TransferService<KV, S, C>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
{
    pub fn new(deps: TransferDependencies<KV, S, C>, config: TransferConfig) -> Self {
        let store: SharedStore<KV, S> = Arc::new(Mutex::new(TaskStore::new(deps.kv_store, deps.serializer)));

        Self {
            uploads: UploadTasks::new(store.clone(), deps.time_source.clone()),
            downloads: DownloadTasks::new(
                store.clone(),
                deps.time_source.clone(),
                deps.id_source.clone(),
                config.clone(),
            ),
            payments: PaymentGate::new(store.clone(), deps.chain, deps.time_source, deps.id_source, config),
            store,
        }
    }

    pub fn uploads(&self) -> &UploadTasks<KV, S> {
        &self.uploads
    }

    pub fn downloads(&self) -> &DownloadTasks<KV, S> {
        &self.downloads
    }

    pub fn payments(&self) -> &PaymentGate<KV, S, C> {
        &self.payments
    }

    /// Shared store handle, for adapters and diagnostics.
    pub fn store(&self) -> &SharedStore<KV, S> {
        &self.store
    }
}

/// Summaries of every `R` stored for `peer` in `partition`.
pub(crate) fn list_summaries<R, KV, S>(
    store: &SharedStore<KV, S>,
    peer: &str,
    partition: TaskPartition,
) -> Result<Vec<TaskSummary>, TransferError>
where
    R: TaskRecord,
    KV: KeyValueStore,
    S: RecordSerializer,
{
    let scanned = store.lock().scan::<R>(peer, partition)?;
    Ok(scanned
        .into_iter()
        .map(|entry| match entry {
            ScannedRecord::Valid(record) => record.summary(),
            ScannedRecord::Corrupt { key, .. } => TaskSummary::corrupt(&key),
        })
        .collect())
}
