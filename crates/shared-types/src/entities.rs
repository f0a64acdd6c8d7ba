//! # Core Identifiers
//!
//! Type aliases and constants for the block-transfer domain.
//!
//! ## Clusters
//!
//! - **Content**: `BlockHash`, `FileHash`, `content_hash`
//! - **Peers**: `PeerAddress`
//! - **Sessions**: `DownloadTaskId`, `PaymentId`, `Timestamp`

use sha2::{Digest, Sha256};

use crate::errors::IdentifierError;

/// Lowercase hex SHA-256 of a block's bytes.
pub type BlockHash = String;

/// Content identifier of a whole file.
pub type FileHash = String;

/// Wallet-style address identifying a counterparty node.
pub type PeerAddress = String;

/// Random positive 31-bit id assigned to a download task.
pub type DownloadTaskId = u32;

/// Random positive 31-bit id assigned to a payment ticket.
pub type PaymentId = u32;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Fixed size of a file block in bytes. Payment is priced per block.
pub const BLOCK_SIZE_BYTES: u64 = 262_144;

/// Upper bound (inclusive) for randomly generated ids: they must stay
/// positive when read back as a signed 32-bit integer by peers.
pub const MAX_RANDOM_ID: u32 = i32::MAX as u32;

/// Length of a hex-encoded SHA-256 digest.
pub const CONTENT_HASH_HEX_LEN: usize = 64;

/// Compute the content hash of a block.
pub fn content_hash(data: &[u8]) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check that `hash` looks like a value produced by [`content_hash`].
pub fn validate_content_hash(hash: &str) -> Result<(), IdentifierError> {
    if hash.len() != CONTENT_HASH_HEX_LEN {
        return Err(IdentifierError::InvalidHashLength {
            expected: CONTENT_HASH_HEX_LEN,
            actual: hash.len(),
        });
    }
    if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(IdentifierError::InvalidHashEncoding(hash.to_string()));
    }
    Ok(())
}

/// Check that a peer address is usable as a key component.
///
/// Addresses are length-prefixed inside storage keys, so separator
/// characters are allowed; only empty and control-character addresses
/// are rejected.
pub fn validate_peer_address(address: &str) -> Result<(), IdentifierError> {
    if address.is_empty() {
        return Err(IdentifierError::EmptyPeerAddress);
    }
    if address.len() > u16::MAX as usize {
        return Err(IdentifierError::PeerAddressTooLong(address.len()));
    }
    if address.chars().any(char::is_control) {
        return Err(IdentifierError::InvalidPeerAddress(address.escape_debug().to_string()));
    }
    Ok(())
}
