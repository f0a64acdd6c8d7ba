//! # Block Set Reconciliation
//!
//! Splits an incoming candidate hash list into positions the task already
//! holds and positions still missing.
//!
//! Membership is checked against a `HashSet` built once from the existing
//! hashes, so the cost is linear in `existing + candidates`. Both output
//! lists follow the candidate list's order.

use shared_types::BlockHash;
use std::collections::HashSet;

/// Candidate positions split by whether the task already records them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPartition {
    /// Positions into the candidate list already present in the task.
    pub held: Vec<usize>,
    /// Positions into the candidate list not yet recorded.
    pub missing: Vec<usize>,
}

impl BlockPartition {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Pick the candidate entries at the `held` positions.
    pub fn select_held<'a, T>(&self, candidates: &'a [T]) -> Vec<&'a T> {
        self.held.iter().filter_map(|&i| candidates.get(i)).collect()
    }

    /// Pick the candidate entries at the `missing` positions.
    pub fn select_missing<'a, T>(&self, candidates: &'a [T]) -> Vec<&'a T> {
        self.missing.iter().filter_map(|&i| candidates.get(i)).collect()
    }
}

/// Partition candidate positions into already-held and missing.
pub fn partition_blocks(existing: &[BlockHash], candidates: &[BlockHash]) -> BlockPartition {
    let known: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let mut partition = BlockPartition::default();

    for (position, hash) in candidates.iter().enumerate() {
        if known.contains(hash.as_str()) {
            partition.held.push(position);
        } else {
            partition.missing.push(position);
        }
    }
    partition
}
