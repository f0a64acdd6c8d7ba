//! # Block Files
//!
//! `BlockRepository` over a directory tree: one file per block at
//! `<root>/<first two hex chars>/<hash>.blk`, holding the bincode-encoded
//! payload (data and tag together).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use transfer_engine::{BlockPayload, BlockRepository, KVStoreError};

use shared_types::{validate_content_hash, BlockHash};

pub struct FileBlockRepository {
    root: PathBuf,
}

impl FileBlockRepository {
    /// Use `root`, creating it if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, KVStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only well-formed content hashes map to paths, so a hash can never
    /// name a file outside `root`.
    fn path_for(&self, hash: &str) -> Result<PathBuf, KVStoreError> {
        validate_content_hash(hash).map_err(|e| KVStoreError::IOError {
            message: format!("refusing block path for {hash:?}: {e}"),
        })?;
        Ok(self.root.join(&hash[..2]).join(format!("{hash}.blk")))
    }
}

impl BlockRepository for FileBlockRepository {
    fn put_block(&self, hash: &BlockHash, payload: &BlockPayload) -> Result<(), KVStoreError> {
        let path = self.path_for(hash)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }

        let bytes = bincode::serialize(payload).map_err(|e| KVStoreError::IOError {
            message: format!("cannot encode block {hash}: {e}"),
        })?;
        let tmp = path.with_extension("blk.tmp");
        fs::write(&tmp, &bytes).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;

        debug!(hash = %hash, bytes = payload.data.len(), "[transfer] block written");
        Ok(())
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<BlockPayload>, KVStoreError> {
        let path = self.path_for(hash)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| KVStoreError::CorruptionError {
                message: format!("block file {}: {e}", path.display()),
            })
    }
}

fn io_error(path: &Path, err: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("{}: {err}", path.display()),
    }
}
