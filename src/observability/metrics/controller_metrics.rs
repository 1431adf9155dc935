//! # Controller Metrics
//!
//! Metrics for reconciliations, approval decisions and the work queue.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "node_csr_approver_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "node_csr_approver_reconciliation_errors_total",
        "Total number of reconciliations that failed with a transient error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "node_csr_approver_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Decision metrics
static APPROVALS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "node_csr_approver_approvals_total",
            "Total number of approved CSRs by validation mode",
        ),
        &["mode"],
    )
    .expect("Failed to create APPROVALS_TOTAL metric - this should never happen")
});

static SKIPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "node_csr_approver_skips_total",
            "Total number of CSRs left unapproved by reason",
        ),
        &["reason", "detail"],
    )
    .expect("Failed to create SKIPS_TOTAL metric - this should never happen")
});

// Work queue metrics
static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "node_csr_approver_requeues_total",
        "Total number of rate limited requeues",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static DROPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "node_csr_approver_dropped_total",
        "Total number of keys dropped after exhausting retries",
    )
    .expect("Failed to create DROPPED_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "node_csr_approver_queue_depth",
        "Number of keys ready for processing",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(APPROVALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SKIPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Count an approval, `degraded` when SANs were not checked
pub fn increment_approvals(degraded: bool) {
    let mode = if degraded { "degraded" } else { "validated" };
    APPROVALS_TOTAL.with_label_values(&[mode]).inc();
}

pub fn increment_skips(reason: &str, detail: &str) {
    SKIPS_TOTAL.with_label_values(&[reason, detail]).inc();
}

pub fn increment_requeues() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_dropped() {
    DROPPED_TOTAL.inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_increment_approvals_by_mode() {
        let before = APPROVALS_TOTAL.with_label_values(&["degraded"]).get();
        increment_approvals(true);
        assert_eq!(
            APPROVALS_TOTAL.with_label_values(&["degraded"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_increment_skips_by_reason() {
        let labels = ["rejected", "dns_name_mismatch"];
        let before = SKIPS_TOTAL.with_label_values(&labels).get();
        let other = SKIPS_TOTAL
            .with_label_values(&["rejected", "no_target_machine"])
            .get();
        increment_skips("rejected", "dns_name_mismatch");
        assert_eq!(SKIPS_TOTAL.with_label_values(&labels).get(), before + 1u64);
        assert_eq!(
            SKIPS_TOTAL
                .with_label_values(&["rejected", "no_target_machine"])
                .get(),
            other
        );
    }

    #[test]
    fn test_set_queue_depth() {
        set_queue_depth(3);
        assert_eq!(QUEUE_DEPTH.get(), 3);
        set_queue_depth(0);
        assert_eq!(QUEUE_DEPTH.get(), 0);
    }
}
