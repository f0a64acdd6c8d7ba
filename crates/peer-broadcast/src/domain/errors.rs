//! Broadcast error types.

use shared_types::PeerAddress;
use thiserror::Error;

/// Errors raised while contacting peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// Aggregated result of a fan-out in which at least one peer failed.
    #[error("broadcast failed for {failed} of {total} attempted peers")]
    BroadcastFailed { failed: usize, total: usize },

    /// The per-request deadline elapsed.
    #[error("request to {peer} timed out after {timeout_ms} ms")]
    Timeout { peer: PeerAddress, timeout_ms: u64 },

    #[error("cannot connect to {peer}: {reason}")]
    Connect { peer: PeerAddress, reason: String },

    #[error("transport error with {peer}: {reason}")]
    Transport { peer: PeerAddress, reason: String },

    #[error("no target peers given")]
    EmptyTargets,
}

impl BroadcastError {
    /// Only deadline expiry is worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn connect(peer: &str, reason: impl Into<String>) -> Self {
        Self::Connect {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transport(peer: &str, reason: impl Into<String>) -> Self {
        Self::Transport {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }
}
