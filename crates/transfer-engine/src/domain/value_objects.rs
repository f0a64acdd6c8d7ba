//! # Value Objects
//!
//! Configuration and computed results passed between the engine and its
//! callers.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, PaymentId, BLOCK_SIZE_BYTES};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Price unit: one ticket costs `hashes * block_size_bytes`.
    pub block_size_bytes: u64,
    /// Retries when a random task/payment id collides with a stored key.
    pub max_id_attempts: u32,
    /// Blocks to wait on top of the payment event's height. 0 disables.
    pub required_confirmations: u64,
    /// Upper bound on the confirmation wait.
    pub confirmation_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: BLOCK_SIZE_BYTES,
            max_id_attempts: 16,
            required_confirmations: 0,
            confirmation_timeout: Duration::from_secs(60),
        }
    }
}

impl TransferConfig {
    /// Config for tests: no confirmation wait, short timeout.
    pub fn for_testing() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

/// Result of matching requested hashes against a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorization {
    /// Positions into the requested list covered by the ticket.
    pub authorized_indexes: Vec<usize>,
    /// Requested hashes the ticket does not cover.
    pub unauthorized_hashes: Vec<BlockHash>,
}

impl Authorization {
    /// True when every requested hash is covered.
    pub fn is_complete(&self) -> bool {
        self.unauthorized_hashes.is_empty()
    }
}

/// Payment terms returned to a prospective downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub payment_id: PaymentId,
    pub amount_due: u64,
}

/// Canonically ordered block list of an upload, plus its file prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedManifest {
    pub hashes: Vec<BlockHash>,
    pub indexes: Vec<u64>,
    pub prefix: Vec<u8>,
}
