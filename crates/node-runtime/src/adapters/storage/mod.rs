//! # Task Store Backends
//!
//! `NodeStore` picks the backend at startup: RocksDB when built with the
//! `rocksdb` feature and asked for, the file-backed store otherwise.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::container::config::StorageConfig;
use transfer_engine::adapters::FileBackedKVStore;
use transfer_engine::{BatchOperation, KVStoreError, KeyValueStore, ScanResult};

/// The node's task store.
pub enum NodeStore {
    File(FileBackedKVStore),
    #[cfg(feature = "rocksdb")]
    RocksDb(RocksDbStore),
}

impl NodeStore {
    /// Open the backend `config` asks for, creating the data directory.
    pub fn open(config: &StorageConfig) -> Result<Self, KVStoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| KVStoreError::IOError {
            message: format!("cannot create {}: {e}", config.data_dir.display()),
        })?;

        #[cfg(feature = "rocksdb")]
        if config.use_rocksdb {
            let rocks = RocksDbConfig {
                path: config.task_store_path(),
                ..RocksDbConfig::default()
            };
            return RocksDbStore::open(rocks).map(NodeStore::RocksDb);
        }

        FileBackedKVStore::open(config.task_store_path()).map(NodeStore::File)
    }

    pub fn backend(&self) -> &'static str {
        match self {
            NodeStore::File(_) => "file",
            #[cfg(feature = "rocksdb")]
            NodeStore::RocksDb(_) => "rocksdb",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            NodeStore::File($store) => $call,
            #[cfg(feature = "rocksdb")]
            NodeStore::RocksDb($store) => $call,
        }
    };
}

impl KeyValueStore for NodeStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        delegate!(self, store => store.get(key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        delegate!(self, store => store.put(key, value))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        delegate!(self, store => store.delete(key))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        delegate!(self, store => store.atomic_batch_write(operations))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        delegate!(self, store => store.exists(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        delegate!(self, store => store.prefix_scan(prefix))
    }
}
