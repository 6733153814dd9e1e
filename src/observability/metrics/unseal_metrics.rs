//! # Unseal Metrics
//!
//! Metrics for unseal attempts, share submissions, key refreshes and full scans.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

static UNSEAL_ATTEMPTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autounseal_unseal_attempts_total",
            "Total number of unseal attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create UNSEAL_ATTEMPTS_TOTAL metric - this should never happen")
});

static SHARES_SUBMITTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autounseal_shares_submitted_total",
        "Total number of unseal shares accepted by vault members",
    )
    .expect("Failed to create SHARES_SUBMITTED_TOTAL metric - this should never happen")
});

static KEY_REFRESHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autounseal_key_refreshes_total",
            "Total number of unseal share refreshes by result",
        ),
        &["result"],
    )
    .expect("Failed to create KEY_REFRESHES_TOTAL metric - this should never happen")
});

static CACHED_SHARES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "autounseal_cached_shares",
        "Current number of unseal shares in the cache",
    )
    .expect("Failed to create CACHED_SHARES metric - this should never happen")
});

static FULL_SCAN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "autounseal_full_scan_duration_seconds",
            "Duration of full member scans in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create FULL_SCAN_DURATION metric - this should never happen")
});

/// Register unseal metrics with the registry
pub(crate) fn register_unseal_metrics() -> Result<()> {
    REGISTRY.register(Box::new(UNSEAL_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SHARES_SUBMITTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEY_REFRESHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHED_SHARES.clone()))?;
    REGISTRY.register(Box::new(FULL_SCAN_DURATION.clone()))?;
    Ok(())
}

// Public functions for unseal metrics

pub fn increment_unseal_attempts(outcome: &str) {
    UNSEAL_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_shares_submitted() {
    SHARES_SUBMITTED_TOTAL.inc();
}

pub fn increment_key_refreshes(result: &str) {
    KEY_REFRESHES_TOTAL.with_label_values(&[result]).inc();
}

pub fn set_cached_shares(count: usize) {
    CACHED_SHARES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn observe_full_scan_duration(duration: f64) {
    FULL_SCAN_DURATION.observe(duration);
}
