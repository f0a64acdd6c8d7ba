//! Broadcast configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the coordinator does after a batch in which some peer failed.
///
/// Either way the broadcast ends in `BroadcastFailed` when any attempt
/// failed; the policy only decides whether later batches still go out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dispatch every batch, report the aggregated failure at the end.
    #[default]
    ContinueOnError,
    /// Dispatch no further batch once any attempt has failed.
    FailFast,
}

/// Broadcast configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Peers contacted concurrently within one batch.
    pub max_concurrency: usize,
    /// Deadline for connecting and for each request/reply exchange.
    pub request_timeout: Duration,
    /// Total attempts made by `request_with_retry`.
    pub retry_attempts: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            request_timeout: Duration::from_secs(15),
            retry_attempts: 3,
            failure_policy: FailurePolicy::ContinueOnError,
        }
    }
}

impl BroadcastConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Batch size for `targets` peers, never zero.
    pub fn batch_size(&self, targets: usize) -> usize {
        self.max_concurrency.min(targets).max(1)
    }

    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
