//! Per-peer outcomes of a fan-out.

use super::errors::BroadcastError;
use shared_types::PeerAddress;
use std::collections::BTreeMap;

/// Result of one peer's attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerOutcome {
    /// Sent successfully; `reply` is set when a response was requested.
    Delivered { reply: Option<Vec<u8>> },
    Failed(BroadcastError),
}

impl PeerOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Outcomes collected by the coordinator, keyed by peer.
///
/// Only the collecting loop writes here; attempts hand their results back
/// through their join handles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    outcomes: BTreeMap<PeerAddress, PeerOutcome>,
    batches_dispatched: usize,
    stopped_early: bool,
}

impl BroadcastReport {
    pub(crate) fn record(&mut self, peer: PeerAddress, outcome: PeerOutcome) {
        self.outcomes.insert(peer, outcome);
    }

    pub(crate) fn batch_dispatched(&mut self) {
        self.batches_dispatched += 1;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.stopped_early = true;
    }

    pub fn outcome(&self, peer: &str) -> Option<&PeerOutcome> {
        self.outcomes.get(peer)
    }

    pub fn was_attempted(&self, peer: &str) -> bool {
        self.outcomes.contains_key(peer)
    }

    /// Number of peers attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_delivered()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PeerAddress, &BroadcastError)> {
        self.outcomes.iter().filter_map(|(peer, outcome)| match outcome {
            PeerOutcome::Failed(err) => Some((peer, err)),
            PeerOutcome::Delivered { .. } => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.attempted() - self.delivered()
    }

    pub fn batches_dispatched(&self) -> usize {
        self.batches_dispatched
    }

    /// True when the stop predicate ended the fan-out before the last batch.
    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }
}
