//! # Domain Errors
//!
//! Error types for the block-transfer engine.
//!
//! ## Design Principles
//!
//! - Each variant maps to one failure class a caller can act on
//! - Port errors (`KVStoreError`, `SerializationError`, `ChainClientError`)
//!   convert into `TransferError` at the service boundary
//! - No panics on bad persisted data: decode failures become `CorruptRecord`

use shared_types::{BlockHash, IdentifierError, PaymentId};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Missing or invalid request field. Raised before storage is touched.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// No in-progress (or completed) record under the expected key.
    #[error("Task not found: {key}")]
    TaskNotFound { key: String },

    /// The underlying key-value store failed.
    #[error("Store I/O error: {message}")]
    StoreIo { message: String },

    /// Hash and index sequences disagree in length.
    #[error("Cannot sort blocks: {hashes} hashes but {indexes} indexes")]
    SortError { hashes: usize, indexes: usize },

    /// A requested hash is not covered by the ticket, or the on-chain
    /// event does not carry the expected payment id.
    #[error("Payment {payment_id} unauthorized: {reason}")]
    PaymentUnauthorized {
        payment_id: PaymentId,
        reason: String,
    },

    /// No ticket was ever issued under this id.
    #[error("Payment ticket not found: {0}")]
    TicketNotFound(PaymentId),

    /// A received block does not hash to the value it was sent under.
    #[error("Block integrity error: claimed {claimed}, computed {computed}")]
    BlockIntegrity {
        claimed: BlockHash,
        computed: BlockHash,
    },

    /// A block the peer paid for is not in the local block repository.
    #[error("Block unavailable: {0}")]
    BlockUnavailable(BlockHash),

    /// A persisted record could not be decoded.
    #[error("Corrupt record at {key}: {message}")]
    CorruptRecord { key: String, message: String },

    /// The blockchain client failed.
    #[error("Chain client error: {0}")]
    ChainError(String),

    /// Random id allocation kept colliding with existing keys.
    #[error("Could not allocate a free id after {attempts} attempts")]
    IdExhausted { attempts: u32 },
}

impl TransferError {
    /// Numeric status reported in API response bodies.
    pub fn status_code(&self) -> u32 {
        match self {
            TransferError::ParameterError(_) => 40001,
            TransferError::PaymentUnauthorized { .. } => 40003,
            TransferError::TicketNotFound(_) => 40003,
            TransferError::TaskNotFound { .. } => 40004,
            TransferError::BlockUnavailable(_) => 40004,
            TransferError::BlockIntegrity { .. } => 40009,
            TransferError::StoreIo { .. } => 50001,
            TransferError::SortError { .. } => 50002,
            TransferError::CorruptRecord { .. } => 50003,
            TransferError::ChainError(_) => 50004,
            TransferError::IdExhausted { .. } => 50005,
        }
    }

    /// Shorthand for a `ParameterError`.
    pub fn parameter(message: impl Into<String>) -> Self {
        TransferError::ParameterError(message.into())
    }
}

impl From<IdentifierError> for TransferError {
    fn from(err: IdentifierError) -> Self {
        TransferError::ParameterError(err.to_string())
    }
}

/// Key-value store errors.
#[derive(Debug, Clone)]
pub enum KVStoreError {
    /// I/O error during read/write.
    IOError { message: String },
    /// Data corruption in the store.
    CorruptionError { message: String },
    /// Key not found.
    NotFound,
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IOError { message } => write!(f, "KV store I/O error: {}", message),
            KVStoreError::CorruptionError { message } => {
                write!(f, "KV store corruption: {}", message)
            }
            KVStoreError::NotFound => write!(f, "Key not found in KV store"),
        }
    }
}

impl std::error::Error for KVStoreError {}

impl From<KVStoreError> for TransferError {
    fn from(err: KVStoreError) -> Self {
        TransferError::StoreIo {
            message: err.to_string(),
        }
    }
}

/// Serialization errors.
#[derive(Debug, Clone)]
pub struct SerializationError {
    pub message: String,
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serialization error: {}", self.message)
    }
}

impl std::error::Error for SerializationError {}

impl SerializationError {
    /// Attach the storage key the bytes were read from.
    pub fn at_key(self, key: impl fmt::Display) -> TransferError {
        TransferError::CorruptRecord {
            key: key.to_string(),
            message: self.message,
        }
    }
}

/// Blockchain client errors.
#[derive(Debug, Clone)]
pub struct ChainClientError {
    pub message: String,
}

impl ChainClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ChainClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chain client error: {}", self.message)
    }
}

impl std::error::Error for ChainClientError {}

impl From<ChainClientError> for TransferError {
    fn from(err: ChainClientError) -> Self {
        TransferError::ChainError(err.message)
    }
}
