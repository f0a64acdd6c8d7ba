use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed key-value store for nodes built without RocksDB.
///
/// The whole map is held in memory and rewritten on every mutation via a
/// temp file and rename, so a crash leaves either the old or the new
/// snapshot on disk.
///
/// Layout: `[key_len:u32 LE][key][value_len:u32 LE][value]...`
#[derive(Debug)]
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open the store at `path`, loading any existing snapshot.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let data = Self::load_from_file(&path)?;
            info!(
                "[transfer] 💾 Loaded {} keys from {}",
                data.len(),
                path.display()
            );
            data
        } else {
            info!("[transfer] 📁 No existing storage file at {}", path.display());
            BTreeMap::new()
        };

        Ok(Self { data, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(io_error)?;

        let mut data = BTreeMap::new();
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            let (key, after_key) = read_chunk(rest)?;
            let (value, after_value) = read_chunk(after_key)?;
            data.insert(key.to_vec(), value.to_vec());
            rest = after_value;
        }
        Ok(data)
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_error)?;
        file.write_all(&bytes).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_error)?;

        debug!(keys = self.data.len(), "[transfer] snapshot written");
        Ok(())
    }

    /// Apply `mutate`, persist, and roll back the in-memory map if the
    /// snapshot could not be written.
    fn commit(&mut self, mutate: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>)) -> Result<(), KVStoreError> {
        let previous = self.data.clone();
        mutate(&mut self.data);
        if let Err(err) = self.save_to_file() {
            self.data = previous;
            return Err(err);
        }
        Ok(())
    }
}

fn read_chunk(bytes: &[u8]) -> Result<(&[u8], &[u8]), KVStoreError> {
    let truncated = || KVStoreError::CorruptionError {
        message: "truncated storage file".to_string(),
    };
    if bytes.len() < 4 {
        return Err(truncated());
    }
    let (len, rest) = bytes.split_at(4);
    let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if rest.len() < len {
        return Err(truncated());
    }
    Ok(rest.split_at(len))
}

fn io_error(err: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: err.to_string(),
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.commit(|data| {
            data.insert(key.to_vec(), value.to_vec());
        })
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        if !self.data.contains_key(key) {
            return Ok(());
        }
        self.commit(|data| {
            data.remove(key);
        })
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.commit(|data| {
            for op in operations {
                match op {
                    BatchOperation::Put { key, value } => {
                        data.insert(key, value);
                    }
                    BatchOperation::Delete { key } => {
                        data.remove(&key);
                    }
                }
            }
        })
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
