//! In-process transport with scripted peers.

use crate::domain::BroadcastError;
use crate::ports::outbound::{NetworkMessage, PeerTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a scripted peer answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Accept sends and answer requests with these bytes.
    Reply(Vec<u8>),
    RefuseConnect,
    /// Connect, then fail every send or request.
    Fail(String),
    /// Connect, then never answer.
    Stall,
    /// Stall for the first `stalls` exchanges, then reply.
    StallThenReply { stalls: u32, reply: Vec<u8> },
}

const STALL: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct PeerLog {
    connect_attempts: usize,
    exchanges: usize,
    received: Vec<NetworkMessage>,
}

/// Transport whose peers follow a [`PeerBehavior`] script.
///
/// Unknown peers refuse connections.
#[derive(Default)]
pub struct InMemoryTransport {
    behaviors: Mutex<HashMap<String, PeerBehavior>>,
    connected: Mutex<HashSet<String>>,
    logs: Mutex<HashMap<String, PeerLog>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(self, peer: &str, behavior: PeerBehavior) -> Self {
        self.set_behavior(peer, behavior);
        self
    }

    pub fn set_behavior(&self, peer: &str, behavior: PeerBehavior) {
        self.behaviors.lock().insert(peer.to_string(), behavior);
    }

    /// Mark `peer` connected without going through `connect`.
    pub fn preconnect(&self, peer: &str) {
        self.connected.lock().insert(peer.to_string());
    }

    pub fn connect_attempts(&self, peer: &str) -> usize {
        self.logs.lock().get(peer).map_or(0, |log| log.connect_attempts)
    }

    /// Sends and requests started against `peer`, answered or not.
    pub fn exchanges(&self, peer: &str) -> usize {
        self.logs.lock().get(peer).map_or(0, |log| log.exchanges)
    }

    /// Messages `peer` accepted.
    pub fn received(&self, peer: &str) -> Vec<NetworkMessage> {
        self.logs
            .lock()
            .get(peer)
            .map(|log| log.received.clone())
            .unwrap_or_default()
    }

    /// Highest number of exchanges that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior(&self, peer: &str) -> PeerBehavior {
        self.behaviors
            .lock()
            .get(peer)
            .cloned()
            .unwrap_or(PeerBehavior::RefuseConnect)
    }

    fn begin(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn exchange(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError> {
        if !self.is_connected(peer) {
            return Err(BroadcastError::transport(peer, "not connected"));
        }
        let _guard = self.begin();
        let attempt = {
            let mut logs = self.logs.lock();
            let log = logs.entry(peer.to_string()).or_default();
            log.exchanges += 1;
            log.exchanges
        };

        // Yield so concurrent attempts overlap.
        tokio::task::yield_now().await;

        let reply = match self.behavior(peer) {
            PeerBehavior::Reply(reply) => reply,
            PeerBehavior::Fail(reason) => return Err(BroadcastError::transport(peer, reason)),
            PeerBehavior::RefuseConnect => return Err(BroadcastError::transport(peer, "connection closed")),
            PeerBehavior::Stall => {
                tokio::time::sleep(STALL).await;
                return Err(BroadcastError::transport(peer, "stalled peer woke up"));
            }
            PeerBehavior::StallThenReply { stalls, reply } => {
                if attempt <= stalls as usize {
                    tokio::time::sleep(STALL).await;
                }
                reply
            }
        };

        if let Some(log) = self.logs.lock().get_mut(peer) {
            log.received.push(message.clone());
        }
        Ok(reply)
    }
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    fn is_connected(&self, peer: &str) -> bool {
        self.connected.lock().contains(peer)
    }

    async fn connect(&self, peer: &str) -> Result<(), BroadcastError> {
        self.logs.lock().entry(peer.to_string()).or_default().connect_attempts += 1;
        match self.behavior(peer) {
            PeerBehavior::RefuseConnect => Err(BroadcastError::connect(peer, "connection refused")),
            _ => {
                self.connected.lock().insert(peer.to_string());
                Ok(())
            }
        }
    }

    async fn send(&self, peer: &str, message: &NetworkMessage) -> Result<(), BroadcastError> {
        self.exchange(peer, message).await.map(|_| ())
    }

    async fn request(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError> {
        self.exchange(peer, message).await
    }
}
