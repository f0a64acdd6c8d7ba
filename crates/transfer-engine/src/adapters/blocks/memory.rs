use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BlockPayload, BlockRepository};
use parking_lot::RwLock;
use shared_types::BlockHash;
use std::collections::HashMap;

/// In-memory block repository for tests.
#[derive(Debug, Default)]
pub struct InMemoryBlockRepository {
    blocks: RwLock<HashMap<BlockHash, BlockPayload>>,
    /// Writes left before every further write fails. `None` never fails.
    writes_before_failure: RwLock<Option<usize>>,
}

impl InMemoryBlockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` more writes, then fail every write after that.
    pub fn fail_after(&self, count: usize) {
        *self.writes_before_failure.write() = Some(count);
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blocks.read().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockRepository for InMemoryBlockRepository {
    fn put_block(&self, hash: &BlockHash, payload: &BlockPayload) -> Result<(), KVStoreError> {
        {
            let mut budget = self.writes_before_failure.write();
            if let Some(left) = budget.as_mut() {
                if *left == 0 {
                    return Err(KVStoreError::IOError {
                        message: format!("block write refused for {hash}"),
                    });
                }
                *left -= 1;
            }
        }
        self.blocks.write().insert(hash.clone(), payload.clone());
        Ok(())
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<BlockPayload>, KVStoreError> {
        Ok(self.blocks.read().get(hash).cloned())
    }
}
