//! # Unseal Queue
//!
//! Bounded hand-off from the pod watcher to a single unseal worker. The
//! watcher never blocks on it: a full queue drops the request, and the next
//! full scan picks the member up.

use crate::observability::metrics;
use crate::unseal::{log_attempt, UnsealCoordinator};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One request to unseal the member at `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealRequest {
    /// Pod IP of the member
    pub address: String,
    /// Watch event kind that produced the request
    pub trigger: &'static str,
}

/// Sending half of the unseal queue
#[derive(Debug, Clone)]
pub struct UnsealQueue {
    tx: mpsc::Sender<UnsealRequest>,
}

impl UnsealQueue {
    /// Create a queue holding at most `capacity` pending requests
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<UnsealRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting; `false` when the request was dropped
    pub fn try_submit(&self, address: &str, trigger: &'static str) -> bool {
        let request = UnsealRequest {
            address: address.to_string(),
            trigger,
        };
        match self.tx.try_send(request) {
            Ok(()) => {
                debug!(address, trigger, "queued unseal request");
                true
            }
            Err(TrySendError::Full(request)) => {
                warn!(
                    address = %request.address,
                    trigger,
                    "unseal queue full, dropping request until the next full scan"
                );
                metrics::increment_dropped_unseal_requests();
                false
            }
            Err(TrySendError::Closed(request)) => {
                debug!(address = %request.address, "unseal worker stopped, dropping request");
                false
            }
        }
    }
}

/// Drain the queue one request at a time until cancelled or every sender is gone
pub async fn run_unseal_worker(
    coordinator: Arc<UnsealCoordinator>,
    mut rx: mpsc::Receiver<UnsealRequest>,
    cancel: CancellationToken,
) {
    info!("unseal worker started");
    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        info!(address = %request.address, trigger = request.trigger, "unseal requested by pod watch");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = coordinator.unseal_member(&request.address) => {
                log_attempt(&request.address, &result);
            }
        }
    }
    info!("unseal worker stopped");
}
