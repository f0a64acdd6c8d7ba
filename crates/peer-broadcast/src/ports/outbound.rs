//! Outbound ports (SPI) for peer broadcast.

use crate::domain::BroadcastError;
use async_trait::async_trait;

/// Protocol-tagged message sent to a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkMessage {
    /// Protocol id the receiving peer dispatches on.
    pub protocol: String,
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    pub fn new(protocol: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            protocol: protocol.into(),
            payload,
        }
    }
}

/// Peer network interface.
///
/// Implementations own their connection table; the coordinator only asks
/// whether a peer is connected and connects when it is not. Deadlines are
/// applied by the caller.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    fn is_connected(&self, peer: &str) -> bool;

    async fn connect(&self, peer: &str) -> Result<(), BroadcastError>;

    /// Fire-and-forget send.
    async fn send(&self, peer: &str, message: &NetworkMessage) -> Result<(), BroadcastError>;

    /// Send and wait for the peer's reply.
    async fn request(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError>;
}
