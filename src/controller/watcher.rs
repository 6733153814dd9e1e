//! # Member Watcher
//!
//! Watches Vault server pods and turns Added/Modified events for running pods
//! into unseal requests. The stream is reopened every time the API server
//! closes it, until the cancellation token fires.

use super::backoff::{RestartPolicy, WatchRestartPolicy};
use super::queue::UnsealQueue;
use crate::cluster::{ClusterApi, ClusterError, MemberEvent};
use crate::observability::metrics;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why one watch session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The stream ended after delivering `events` events
    Closed { events: u64 },
    /// The watch request itself failed
    SubscribeFailed,
    /// The cancellation token fired
    Cancelled,
}

/// Pod watcher feeding the unseal queue
pub struct MemberWatcher {
    cluster: Arc<dyn ClusterApi>,
    queue: UnsealQueue,
    /// Delay before each resubscription
    policy: Box<dyn RestartPolicy>,
    /// Resubscriptions since start
    restarts: u64,
}

impl std::fmt::Debug for MemberWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberWatcher")
            .field("restarts", &self.restarts)
            .finish_non_exhaustive()
    }
}

impl MemberWatcher {
    /// Watcher using the default [`WatchRestartPolicy`]
    pub fn new(cluster: Arc<dyn ClusterApi>, queue: UnsealQueue) -> Self {
        Self {
            cluster,
            queue,
            policy: Box::new(WatchRestartPolicy::default()),
            restarts: 0,
        }
    }

    /// Replace the restart policy
    #[must_use]
    pub fn with_policy(mut self, policy: impl RestartPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Number of resubscriptions so far
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Run one watch session
    pub async fn watch(&self, cancel: &CancellationToken) -> WatchExit {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return WatchExit::Cancelled,
            opened = self.cluster.watch_members() => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to open pod watch");
                return WatchExit::SubscribeFailed;
            }
        };
        debug!("pod watch opened");

        let mut events = 0;
        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return WatchExit::Cancelled,
                item = stream.next() => item,
            };

            match item {
                None => {
                    debug!(events, "pod watch stream closed");
                    return WatchExit::Closed { events };
                }
                Some(Ok(MemberEvent::Expired)) => {
                    metrics::increment_watch_events(MemberEvent::Expired.kind());
                    info!("pod watch resource version expired, restarting from a fresh list");
                    return WatchExit::Closed { events };
                }
                Some(Ok(event)) => {
                    events += 1;
                    self.dispatch(&event);
                }
                Some(Err(ClusterError::Decode(message))) => {
                    error!(error = %message, "failed to decode pod watch event, skipping");
                    metrics::increment_watch_decode_errors();
                }
                Some(Err(e)) => {
                    warn!(error = %e, "pod watch stream error");
                    return WatchExit::Closed { events };
                }
            }
        }
    }

    /// Keep the watch open until cancelled
    ///
    /// Every closure is followed by exactly one resubscription, after the
    /// delay chosen by the restart policy.
    pub async fn start(&mut self, cancel: &CancellationToken) {
        info!("pod watcher started");
        loop {
            let exit = self.watch(cancel).await;
            if exit == WatchExit::Cancelled || cancel.is_cancelled() {
                break;
            }

            let delay = self.policy.next_delay(&exit);
            if !delay.is_zero() {
                debug!(?exit, delay_ms = delay.as_millis(), "waiting before reopening pod watch");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }

            self.restarts += 1;
            metrics::increment_watch_restarts();
            info!(?exit, restarts = self.restarts, "reopening pod watch");
        }
        info!(restarts = self.restarts, "pod watcher stopped");
    }

    /// Queue an unseal request for a running member; `true` when one was queued
    pub fn dispatch(&self, event: &MemberEvent) -> bool {
        metrics::increment_watch_events(event.kind());
        match event.unseal_candidate() {
            Some(address) => self.queue.try_submit(address, event.kind()),
            None => {
                if let MemberEvent::Added(member)
                | MemberEvent::Modified(member)
                | MemberEvent::Deleted(member) = event
                {
                    debug!(
                        kind = event.kind(),
                        member = %member.name,
                        phase = member.phase.as_deref().unwrap_or("unknown"),
                        "pod event does not need an unseal"
                    );
                }
                false
            }
        }
    }
}
