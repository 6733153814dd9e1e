//! # Scheduler
//!
//! Periodic key refresh and full member scan. Both loops tick one period
//! after they start and stop as soon as the cancellation token fires.

use crate::observability::metrics;
use crate::unseal::UnsealCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Refresh the share cache once, logging the result; `true` on success
pub async fn refresh_once(coordinator: &UnsealCoordinator) -> bool {
    match coordinator
        .refresh_unseal_keys()
        .instrument(info_span!("scheduler.key_refresh"))
        .await
    {
        Ok(count) => {
            info!(shares = count, "unseal shares refreshed");
            true
        }
        Err(e) => {
            error!(error = %e, "failed to refresh unseal shares, keeping cached shares");
            false
        }
    }
}

/// Run one full member scan, logging the summary; `true` when the pods could be listed
pub async fn scan_once(coordinator: &UnsealCoordinator) -> bool {
    let started = std::time::Instant::now();
    let result = coordinator
        .unseal_all_members()
        .instrument(info_span!("scheduler.full_scan"))
        .await;
    metrics::observe_full_scan_duration(started.elapsed().as_secs_f64());
    match result {
        Ok(summary) => {
            info!(
                members = summary.members,
                skipped = summary.skipped,
                unsealed = summary.unsealed,
                already_unsealed = summary.already_unsealed,
                still_sealed = summary.still_sealed,
                uninitialized = summary.uninitialized,
                failed = summary.failed,
                "full scan complete"
            );
            true
        }
        Err(e) => {
            warn!(error = %e, "full scan failed to list vault server pods");
            false
        }
    }
}

/// Refresh the share cache every `period`
pub async fn run_key_refresh(
    coordinator: Arc<UnsealCoordinator>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!(period_secs = period.as_secs(), "key refresh loop started");
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = refresh_once(&coordinator) => {}
        }
    }
    info!("key refresh loop stopped");
}

/// Scan every member every `period`
pub async fn run_full_scan(
    coordinator: Arc<UnsealCoordinator>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!(period_secs = period.as_secs(), "full scan loop started");
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = scan_once(&coordinator) => {}
        }
    }
    info!("full scan loop stopped");
}
