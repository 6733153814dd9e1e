//! # Supervisor
//!
//! Runs the long-lived tasks until SIGINT/SIGTERM, then gives them a short
//! grace period before aborting what is left.

use super::initialization::InitializationResult;
use crate::constants::SHUTDOWN_GRACE_PERIOD_SECS;
use crate::controller::{refresh_once, run_full_scan, run_key_refresh, run_unseal_worker};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the controller until a termination signal arrives
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        config,
        coordinator,
        mut watcher,
        unseal_requests,
        server_state: _,
        server_handle,
        cancel,
    } = init;

    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        info!("termination signal received, shutting down");
        signal_cancel.cancel();
    });

    // The cache is filled once before any periodic loop starts
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        _ = refresh_once(&coordinator) => {}
    }

    let mut tasks = JoinSet::new();
    if !cancel.is_cancelled() {
        let token = cancel.clone();
        tasks.spawn(async move { watcher.start(&token).await });
        tasks.spawn(run_unseal_worker(
            Arc::clone(&coordinator),
            unseal_requests,
            cancel.clone(),
        ));
        tasks.spawn(run_key_refresh(
            Arc::clone(&coordinator),
            config.key_refresh_interval(),
            cancel.clone(),
        ));
        tasks.spawn(run_full_scan(
            Arc::clone(&coordinator),
            config.scan_interval(),
            cancel.clone(),
        ));
        info!(tasks = tasks.len(), "controller running");
    }

    let mut failure = None;
    tokio::select! {
        () = cancel.cancelled() => {}
        Some(joined) = tasks.join_next() => {
            error!(result = ?joined, "controller task exited before shutdown");
            failure = Some(anyhow::anyhow!("controller task exited unexpectedly"));
            cancel.cancel();
        }
    }

    signal_task.abort();
    shutdown(&mut tasks, server_handle, &cancel).await;

    match failure {
        Some(e) => Err(e),
        None => {
            info!("controller stopped");
            Ok(())
        }
    }
}

async fn shutdown(
    tasks: &mut JoinSet<()>,
    server_handle: tokio::task::JoinHandle<()>,
    cancel: &CancellationToken,
) {
    cancel.cancel();
    let grace = Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS);
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "controller task failed during shutdown");
            }
        }
        if let Err(e) = server_handle.await {
            warn!(error = %e, "HTTP server task failed during shutdown");
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            grace_secs = grace.as_secs(),
            remaining = tasks.len(),
            "tasks still running after the grace period, aborting"
        );
        tasks.abort_all();
    }
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
