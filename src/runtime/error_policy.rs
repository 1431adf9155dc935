//! # Error Policy
//!
//! Retry handling for reconciliation results.
//!
//! Only transient errors reach the retry path: rejections and malformed
//! payloads come back from the reconciler as `Ok(Outcome::Skipped(..))`.

use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{Outcome, ReconcileError};
use crate::observability::metrics;
use std::fmt::Display;
use std::hash::Hash;
use std::time::Duration;
use tracing::{error, warn};

/// What happened to a key after it was processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconciled; failure count cleared
    Succeeded,
    /// Transient failure; queued again after `delay`
    RequeuedWithBackoff {
        delay: Duration,
        /// Requeue number since the last success, starting at 1
        attempt: u32,
    },
    /// Transient failure after `max_retries` requeues; key forgotten
    Dropped,
}

/// Apply the retry policy for `key`
///
/// - success: forget the failure count
/// - error with fewer than `max_retries` requeues: requeue with backoff
/// - otherwise: forget and drop, reported once at error level
pub fn handle_reconcile_result<K>(
    queue: &WorkQueue<K>,
    key: &K,
    result: &Result<Outcome, ReconcileError>,
    max_retries: u32,
) -> RetryDecision
where
    K: Clone + Eq + Hash + Display,
{
    let Err(error) = result else {
        queue.forget(key);
        return RetryDecision::Succeeded;
    };

    metrics::increment_reconciliation_errors();

    let requeues = queue.num_requeues(key);
    if requeues < max_retries {
        let delay = queue.add_rate_limited(key.clone());
        warn!(
            "Error syncing CSR {}: {} (retry {} of {} in {:?})",
            key,
            error,
            requeues + 1,
            max_retries,
            delay
        );
        metrics::increment_requeues();
        return RetryDecision::RequeuedWithBackoff {
            delay,
            attempt: requeues + 1,
        };
    }

    queue.forget(key);
    error!(
        csr.key = %key,
        error = %error,
        "Dropping CSR {} out of the queue after {} retries: {}",
        key,
        requeues,
        error
    );
    metrics::increment_dropped();
    RetryDecision::Dropped
}
