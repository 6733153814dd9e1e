//! # Watch Metrics
//!
//! Metrics for the pod watch and the unseal request queue.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec};
use std::sync::LazyLock;

static WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "autounseal_watch_events_total",
            "Total number of pod watch events by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_EVENTS_TOTAL metric - this should never happen")
});

static WATCH_DECODE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autounseal_watch_decode_errors_total",
        "Total number of pod watch events that could not be decoded",
    )
    .expect("Failed to create WATCH_DECODE_ERRORS_TOTAL metric - this should never happen")
});

static WATCH_RESTARTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autounseal_watch_restarts_total",
        "Total number of pod watch resubscriptions",
    )
    .expect("Failed to create WATCH_RESTARTS_TOTAL metric - this should never happen")
});

static DROPPED_UNSEAL_REQUESTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "autounseal_dropped_unseal_requests_total",
        "Total number of unseal requests dropped because the queue was full",
    )
    .expect("Failed to create DROPPED_UNSEAL_REQUESTS_TOTAL metric - this should never happen")
});

/// Register watch metrics with the registry
pub(crate) fn register_watch_metrics() -> Result<()> {
    REGISTRY.register(Box::new(WATCH_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_DECODE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_RESTARTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DROPPED_UNSEAL_REQUESTS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for watch metrics

pub fn increment_watch_events(kind: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_watch_decode_errors() {
    WATCH_DECODE_ERRORS_TOTAL.inc();
}

pub fn increment_watch_restarts() {
    WATCH_RESTARTS_TOTAL.inc();
}

pub fn increment_dropped_unseal_requests() {
    DROPPED_UNSEAL_REQUESTS_TOTAL.inc();
}
