//! # Error Types
//!
//! Validation errors for the shared identifiers.

use thiserror::Error;

/// An identifier supplied by a peer failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Peer address was empty.
    #[error("Peer address is empty")]
    EmptyPeerAddress,

    /// Peer address does not fit a length-prefixed key component.
    #[error("Peer address too long: {0} bytes")]
    PeerAddressTooLong(usize),

    /// Peer address contains control characters.
    #[error("Invalid peer address: {0}")]
    InvalidPeerAddress(String),

    /// Hash has the wrong number of hex digits.
    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    /// Hash is not lowercase hex.
    #[error("Invalid hash encoding: {0}")]
    InvalidHashEncoding(String),
}
