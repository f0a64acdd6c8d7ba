use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use std::collections::BTreeMap;

/// In-memory key-value store for unit tests.
///
/// Backed by a `BTreeMap` so prefix scans come back in key order, the
/// same order RocksDB iterates in.
#[derive(Debug, Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    fail_writes: bool,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `IOError`.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Overwrite raw bytes under a key, bypassing write failures.
    pub fn insert_raw(&mut self, key: &[u8], value: &[u8]) {
        self.data.insert(key.to_vec(), value.to_vec());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_writable(&self) -> Result<(), KVStoreError> {
        if self.fail_writes {
            return Err(KVStoreError::IOError {
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.check_writable()?;
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.check_writable()?;
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.check_writable()?;
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_kv_store() {
        let mut store = InMemoryKVStore::new();

        store.put(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key3").unwrap(), None);
        assert!(store.exists(b"key1").unwrap());

        store.delete(b"key1").unwrap();
        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
    }

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let mut store = InMemoryKVStore::new();
        store.put(b"b:2", b"2").unwrap();
        store.put(b"b:1", b"1").unwrap();
        store.put(b"c:1", b"x").unwrap();
        store.put(b"a:1", b"y").unwrap();

        let keys: Vec<_> = store
            .prefix_scan(b"b:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b:1".to_vec(), b"b:2".to_vec()]);
    }

    #[test]
    fn test_failed_batch_applies_nothing() {
        let mut store = InMemoryKVStore::new();
        store.put(b"a", b"1").unwrap();
        store.set_fail_writes(true);

        let ops = vec![BatchOperation::delete(b"a".to_vec()), BatchOperation::put(b"b".to_vec(), b"2".to_vec())];
        assert!(store.atomic_batch_write(ops).is_err());
        assert!(store.exists(b"a").unwrap());
        assert!(!store.exists(b"b").unwrap());
    }
}
