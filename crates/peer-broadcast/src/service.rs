//! # Broadcast Coordinator
//!
//! Sends one message to many peers in sequential batches of at most
//! `max_concurrency` concurrent attempts.
//!
//! ## Batch Lifecycle
//!
//! ```text
//! targets ──chunks(batch_size)──→ JoinSet (connect? → send | timed request)
//!                                    │
//!                      on_result(reply, peer) per success, from the attempt
//!                                    │
//!                      collector loop ──→ BroadcastReport
//!                                    │
//!            should_stop()? ── yes ──→ Ok(report)
//!                 │ no
//!            FailFast && failures? ── yes ──→ stop dispatching
//! ```
//!
//! A batch already in flight always runs to completion before either check.
//! Attempts never write shared state; each hands its outcome back through
//! its join handle and only the collector loop updates the report.

use crate::domain::{BroadcastConfig, BroadcastError, BroadcastReport, FailurePolicy, PeerOutcome};
use crate::ports::outbound::{NetworkMessage, PeerTransport};
use shared_types::PeerAddress;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Callback invoked for each successful attempt, possibly from several
/// attempts at once.
pub type ResultCallback = Arc<dyn Fn(Option<Vec<u8>>, &str) + Send + Sync>;

pub struct BroadcastCoordinator<T: PeerTransport> {
    transport: Arc<T>,
    config: BroadcastConfig,
}

impl<T: PeerTransport> BroadcastCoordinator<T> {
    pub fn new(transport: Arc<T>, config: BroadcastConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Fan `message` out to `targets`.
    ///
    /// With `need_reply` each attempt waits for the peer's answer, bounded
    /// by `request_timeout`, and hands it to `on_result`. `should_stop` is
    /// checked after every batch; when it returns true no further batch is
    /// dispatched and the call succeeds. Otherwise any failed attempt turns
    /// the result into [`BroadcastError::BroadcastFailed`], after each
    /// failure has been logged.
    ///
    /// A peer listed more than once is contacted once, at its first
    /// position.
    ///
    /// Under the default [`FailurePolicy::ContinueOnError`] every batch is
    /// dispatched even after a failure, so one dead peer never hides the
    /// replies of live ones in later batches. [`FailurePolicy::FailFast`]
    /// stops at the first batch boundary after a failure and saves the
    /// remaining attempts when a partial fan-out is worthless.
    pub async fn broadcast<F>(
        &self,
        targets: &[PeerAddress],
        message: NetworkMessage,
        need_reply: bool,
        should_stop: F,
        on_result: ResultCallback,
    ) -> Result<BroadcastReport, BroadcastError>
    where
        F: Fn() -> bool,
    {
        if targets.is_empty() {
            return Err(BroadcastError::EmptyTargets);
        }
        let mut listed = HashSet::new();
        let targets: Vec<PeerAddress> = targets.iter().filter(|peer| listed.insert(*peer)).cloned().collect();

        let message = Arc::new(message);
        let batch_size = self.config.batch_size(targets.len());
        let batch_count = targets.len().div_ceil(batch_size);
        let mut report = BroadcastReport::default();

        debug!(
            protocol = %message.protocol,
            targets = targets.len(),
            batch_size,
            need_reply,
            "[broadcast] starting fan-out"
        );

        for (batch_no, batch) in targets.chunks(batch_size).enumerate() {
            self.run_batch(batch, &message, need_reply, &on_result, &mut report).await;
            report.batch_dispatched();

            let last = batch_no + 1 == batch_count;
            if should_stop() {
                if !last {
                    report.mark_stopped();
                }
                info!(
                    protocol = %message.protocol,
                    attempted = report.attempted(),
                    skipped = targets.len() - report.attempted(),
                    "[broadcast] stop condition met"
                );
                return Ok(report);
            }

            if !last && report.failure_count() > 0 && self.config.failure_policy == FailurePolicy::FailFast {
                warn!(
                    protocol = %message.protocol,
                    failed = report.failure_count(),
                    skipped = targets.len() - report.attempted(),
                    "[broadcast] halting after failed batch"
                );
                break;
            }
        }

        if report.failure_count() == 0 {
            debug!(protocol = %message.protocol, delivered = report.delivered(), "[broadcast] fan-out complete");
            return Ok(report);
        }

        for (peer, err) in report.failures() {
            warn!(peer = %peer, error = %err, protocol = %message.protocol, "[broadcast] ⚠️ peer attempt failed");
        }
        Err(BroadcastError::BroadcastFailed {
            failed: report.failure_count(),
            total: report.attempted(),
        })
    }

    /// One timed request, connecting first if needed.
    pub async fn request(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError> {
        ensure_connected(self.transport.as_ref(), peer, self.config.request_timeout).await?;
        timed_request(self.transport.as_ref(), peer, message, self.config.request_timeout).await
    }

    /// [`Self::request`], re-issued up to `retry_attempts` times in total
    /// while it keeps timing out. Any other error is returned at once.
    pub async fn request_with_retry(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.request(peer, message).await {
                Err(err) if err.is_timeout() && attempt < attempts => {
                    debug!(peer, attempt, attempts, "[broadcast] request timed out, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run_batch(
        &self,
        batch: &[PeerAddress],
        message: &Arc<NetworkMessage>,
        need_reply: bool,
        on_result: &ResultCallback,
        report: &mut BroadcastReport,
    ) {
        let mut in_flight = JoinSet::new();
        let mut pending: HashSet<&PeerAddress> = batch.iter().collect();

        for peer in batch {
            let transport = Arc::clone(&self.transport);
            let message = Arc::clone(message);
            let on_result = Arc::clone(on_result);
            let peer = peer.clone();
            let deadline = self.config.request_timeout;

            in_flight.spawn(async move {
                let outcome = attempt(transport.as_ref(), &peer, &message, need_reply, deadline).await;
                if let Ok(reply) = &outcome {
                    on_result(reply.clone(), &peer);
                }
                (peer, outcome)
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((peer, outcome)) => {
                    pending.remove(&peer);
                    let outcome = match outcome {
                        Ok(reply) => PeerOutcome::Delivered { reply },
                        Err(err) => PeerOutcome::Failed(err),
                    };
                    report.record(peer, outcome);
                }
                Err(join_err) => warn!(error = %join_err, "[broadcast] attempt task did not finish"),
            }
        }

        for peer in pending {
            report.record(
                peer.clone(),
                PeerOutcome::Failed(BroadcastError::transport(peer, "attempt aborted")),
            );
        }
    }
}

async fn attempt<T: PeerTransport>(
    transport: &T,
    peer: &str,
    message: &NetworkMessage,
    need_reply: bool,
    deadline: Duration,
) -> Result<Option<Vec<u8>>, BroadcastError> {
    ensure_connected(transport, peer, deadline).await?;
    if need_reply {
        timed_request(transport, peer, message, deadline).await.map(Some)
    } else {
        transport.send(peer, message).await.map(|()| None)
    }
}

async fn ensure_connected<T: PeerTransport>(transport: &T, peer: &str, deadline: Duration) -> Result<(), BroadcastError> {
    if transport.is_connected(peer) {
        return Ok(());
    }
    tokio::time::timeout(deadline, transport.connect(peer))
        .await
        .map_err(|_| timeout_error(peer, deadline))?
}

async fn timed_request<T: PeerTransport>(
    transport: &T,
    peer: &str,
    message: &NetworkMessage,
    deadline: Duration,
) -> Result<Vec<u8>, BroadcastError> {
    tokio::time::timeout(deadline, transport.request(peer, message))
        .await
        .map_err(|_| timeout_error(peer, deadline))?
}

fn timeout_error(peer: &str, deadline: Duration) -> BroadcastError {
    BroadcastError::Timeout {
        peer: peer.to_string(),
        timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryTransport, PeerBehavior};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peers(names: &[&str]) -> Vec<PeerAddress> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn message() -> NetworkMessage {
        NetworkMessage::new("/dfs/blocks/1.0.0", b"announce".to_vec())
    }

    fn coordinator(transport: InMemoryTransport, config: BroadcastConfig) -> BroadcastCoordinator<InMemoryTransport> {
        BroadcastCoordinator::new(Arc::new(transport), config)
    }

    fn batches_of(n: usize) -> BroadcastConfig {
        BroadcastConfig {
            max_concurrency: n,
            ..BroadcastConfig::for_testing()
        }
    }

    /// Records every callback under a lock.
    fn collecting() -> (ResultCallback, Arc<Mutex<Vec<(PeerAddress, Option<Vec<u8>>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ResultCallback = Arc::new(move |reply: Option<Vec<u8>>, peer: &str| {
            sink.lock().push((peer.to_string(), reply));
        });
        (callback, seen)
    }

    fn seen_peers(seen: &Mutex<Vec<(PeerAddress, Option<Vec<u8>>)>>) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = seen.lock().iter().map(|(p, _)| p.clone()).collect();
        peers.sort();
        peers
    }

    fn abc_with_b_refusing() -> InMemoryTransport {
        InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(b"ra".to_vec()))
            .with_peer("b", PeerBehavior::RefuseConnect)
            .with_peer("c", PeerBehavior::Reply(b"rc".to_vec()))
    }

    #[tokio::test]
    async fn test_all_peers_succeed() {
        let transport = InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(vec![]))
            .with_peer("b", PeerBehavior::Reply(vec![]));
        let coordinator = coordinator(transport, batches_of(10));
        let (on_result, seen) = collecting();

        let report = coordinator
            .broadcast(&peers(&["a", "b"]), message(), false, || false, on_result)
            .await
            .unwrap();

        assert_eq!(report.delivered(), 2);
        assert_eq!(report.batches_dispatched(), 1);
        assert_eq!(seen_peers(&seen), peers(&["a", "b"]));
        // Fire-and-forget: no reply handed to the callback.
        assert!(seen.lock().iter().all(|(_, reply)| reply.is_none()));
        assert_eq!(coordinator.transport().received("a"), vec![message()]);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_aggregate_after_all_batches() {
        let coordinator = coordinator(abc_with_b_refusing(), batches_of(2));
        let (on_result, seen) = collecting();

        let err = coordinator
            .broadcast(&peers(&["a", "b", "c"]), message(), true, || false, on_result)
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 3 });
        assert_eq!(seen_peers(&seen), peers(&["a", "c"]));
        let replies: Vec<_> = seen.lock().iter().filter_map(|(_, r)| r.clone()).collect();
        assert!(replies.contains(&b"ra".to_vec()) && replies.contains(&b"rc".to_vec()));
    }

    #[tokio::test]
    async fn test_stop_predicate_skips_remaining_batches() {
        let coordinator = coordinator(abc_with_b_refusing(), batches_of(2));
        let (on_result, seen) = collecting();

        let report = coordinator
            .broadcast(&peers(&["a", "b", "c"]), message(), true, || true, on_result)
            .await
            .unwrap();

        assert!(report.stopped_early());
        assert_eq!(report.batches_dispatched(), 1);
        assert!(!report.was_attempted("c"));
        assert_eq!(coordinator.transport().connect_attempts("c"), 0);
        assert_eq!(seen_peers(&seen), peers(&["a"]));
    }

    #[tokio::test]
    async fn test_stop_predicate_sees_results_of_finished_batch() {
        let transport = InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(vec![1]))
            .with_peer("b", PeerBehavior::Reply(vec![2]))
            .with_peer("c", PeerBehavior::Reply(vec![3]));
        let coordinator = coordinator(transport, batches_of(1));
        let replies = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&replies);
        let on_result: ResultCallback = Arc::new(move |_: Option<Vec<u8>>, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Stop once two replies are in.
        let report = coordinator
            .broadcast(&peers(&["a", "b", "c"]), message(), true, || replies.load(Ordering::SeqCst) >= 2, on_result)
            .await
            .unwrap();

        assert_eq!(report.attempted(), 2);
        assert!(!report.was_attempted("c"));
    }

    #[tokio::test]
    async fn test_fail_fast_halts_at_batch_boundary() {
        let config = BroadcastConfig {
            failure_policy: FailurePolicy::FailFast,
            ..batches_of(2)
        };
        let coordinator = coordinator(abc_with_b_refusing(), config);
        let (on_result, seen) = collecting();

        let err = coordinator
            .broadcast(&peers(&["a", "b", "c"]), message(), false, || false, on_result)
            .await
            .unwrap_err();

        // The batch holding b finished, a included; c was never dispatched.
        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 2 });
        assert_eq!(seen_peers(&seen), peers(&["a"]));
        assert_eq!(coordinator.transport().connect_attempts("c"), 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_batch_size() {
        let names: Vec<String> = (0..9).map(|i| format!("peer-{i}")).collect();
        let mut transport = InMemoryTransport::new();
        for name in &names {
            transport = transport.with_peer(name, PeerBehavior::Reply(vec![]));
        }
        let coordinator = coordinator(transport, batches_of(3));
        let (on_result, _) = collecting();

        let report = coordinator
            .broadcast(&names, message(), true, || false, on_result)
            .await
            .unwrap();

        assert_eq!(report.batches_dispatched(), 3);
        assert!(coordinator.transport().max_in_flight() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_peer_times_out_without_blocking_others() {
        let transport = InMemoryTransport::new()
            .with_peer("slow", PeerBehavior::Stall)
            .with_peer("fast", PeerBehavior::Reply(vec![7]));
        let coordinator = coordinator(transport, batches_of(2));
        let (on_result, seen) = collecting();

        let err = coordinator
            .broadcast(&peers(&["slow", "fast"]), message(), true, || false, on_result)
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 2 });
        assert_eq!(seen_peers(&seen), peers(&["fast"]));
    }

    #[tokio::test]
    async fn test_already_connected_peer_is_not_reconnected() {
        let transport = InMemoryTransport::new().with_peer("a", PeerBehavior::Reply(vec![]));
        transport.preconnect("a");
        let coordinator = coordinator(transport, batches_of(2));
        let (on_result, _) = collecting();

        coordinator
            .broadcast(&peers(&["a"]), message(), false, || false, on_result)
            .await
            .unwrap();

        assert_eq!(coordinator.transport().connect_attempts("a"), 0);
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let coordinator = coordinator(InMemoryTransport::new(), batches_of(2));
        let (on_result, _) = collecting();

        let err = coordinator
            .broadcast(&[], message(), false, || false, on_result)
            .await
            .unwrap_err();
        assert_eq!(err, BroadcastError::EmptyTargets);
    }

    /// Many concurrent attempts report back at once. Outcomes travel
    /// through join handles to a single collector, so every peer lands in
    /// the report exactly once; the callback shares state only through
    /// its own lock.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_results_are_all_collected() {
        let names: Vec<String> = (0..64).map(|i| format!("peer-{i:02}")).collect();
        let mut transport = InMemoryTransport::new();
        for (i, name) in names.iter().enumerate() {
            let behavior = if i % 8 == 0 {
                PeerBehavior::Fail("reset".into())
            } else {
                PeerBehavior::Reply(vec![i as u8])
            };
            transport = transport.with_peer(name, behavior);
        }
        let coordinator = coordinator(transport, batches_of(32));
        let (on_result, seen) = collecting();

        let err = coordinator
            .broadcast(&names, message(), true, || false, on_result)
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 8, total: 64 });
        assert_eq!(seen.lock().len(), 56);
        let mut unique = seen_peers(&seen);
        unique.dedup();
        assert_eq!(unique.len(), 56);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_target_is_attempted_once_and_keeps_its_failure() {
        let transport = InMemoryTransport::new().with_peer(
            "a",
            PeerBehavior::StallThenReply {
                stalls: 1,
                reply: b"late".to_vec(),
            },
        );
        let coordinator = coordinator(transport, batches_of(1));
        let (on_result, seen) = collecting();

        let err = coordinator
            .broadcast(&peers(&["a", "a"]), message(), true, || false, on_result)
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::BroadcastFailed { failed: 1, total: 1 });
        assert_eq!(coordinator.transport().exchanges("a"), 1);
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_targets_keep_first_position() {
        let transport = InMemoryTransport::new()
            .with_peer("a", PeerBehavior::Reply(vec![1]))
            .with_peer("b", PeerBehavior::Reply(vec![2]));
        let coordinator = coordinator(transport, batches_of(1));
        let (on_result, seen) = collecting();

        let report = coordinator
            .broadcast(&peers(&["b", "a", "b", "a"]), message(), true, || false, on_result)
            .await
            .unwrap();

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.batches_dispatched(), 2);
        let order: Vec<_> = seen.lock().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(order, peers(&["b", "a"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_with_retry_recovers_from_timeouts() {
        let transport = InMemoryTransport::new().with_peer(
            "a",
            PeerBehavior::StallThenReply {
                stalls: 2,
                reply: b"ok".to_vec(),
            },
        );
        let coordinator = coordinator(transport, batches_of(1));

        let reply = coordinator.request_with_retry("a", &message()).await.unwrap();

        assert_eq!(reply, b"ok".to_vec());
        assert_eq!(coordinator.transport().exchanges("a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_with_retry_gives_up_after_attempts() {
        let transport = InMemoryTransport::new().with_peer("a", PeerBehavior::Stall);
        let coordinator = coordinator(transport, batches_of(1));

        let err = coordinator.request_with_retry("a", &message()).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(coordinator.transport().exchanges("a"), 3);
    }

    #[tokio::test]
    async fn test_request_with_retry_does_not_retry_other_errors() {
        let transport = InMemoryTransport::new().with_peer("a", PeerBehavior::Fail("protocol mismatch".into()));
        let coordinator = coordinator(transport, batches_of(1));

        let err = coordinator.request_with_retry("a", &message()).await.unwrap_err();

        assert!(matches!(err, BroadcastError::Transport { .. }));
        assert_eq!(coordinator.transport().exchanges("a"), 1);
    }

    #[tokio::test]
    async fn test_request_with_retry_does_not_retry_refused_connection() {
        let transport = InMemoryTransport::new().with_peer("a", PeerBehavior::RefuseConnect);
        let coordinator = coordinator(transport, batches_of(1));

        let err = coordinator.request_with_retry("a", &message()).await.unwrap_err();

        assert!(matches!(err, BroadcastError::Connect { .. }));
        assert_eq!(coordinator.transport().connect_attempts("a"), 1);
    }
}
