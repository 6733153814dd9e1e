//! # Backoff
//!
//! Fibonacci backoff and the policy deciding how soon a closed pod watch is
//! reopened.

use super::watcher::WatchExit;
use crate::constants::{WATCH_RESTART_MAX_BACKOFF_SECS, WATCH_RESTART_MIN_BACKOFF_SECS};
use std::time::Duration;

/// Fibonacci backoff: `min`, `min`, `2×min`, `3×min`, `5×min` ... capped at `max`
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    current: u32,
    next: u32,
}

impl FibonacciBackoff {
    /// Backoff starting at `min` and never exceeding `max`
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: 1,
            next: 1,
        }
    }

    /// Delay for the next retry; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.min.saturating_mul(self.current).min(self.max);
        if delay < self.max {
            let following = self.current.saturating_add(self.next);
            self.current = self.next;
            self.next = following;
        }
        delay
    }

    /// Start over from `min`
    pub fn reset(&mut self) {
        self.current = 1;
        self.next = 1;
    }
}

/// Decides the delay before the pod watch is reopened
pub trait RestartPolicy: Send + Sync {
    /// Delay after a session ended with `exit`; may update internal state
    fn next_delay(&mut self, exit: &WatchExit) -> Duration;
}

/// Restart immediately after a session that delivered events; back off after
/// subscribe failures and empty sessions
#[derive(Debug, Clone)]
pub struct WatchRestartPolicy {
    backoff: FibonacciBackoff,
}

impl WatchRestartPolicy {
    /// Policy backing off between `min` and `max`
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min, max),
        }
    }
}

impl Default for WatchRestartPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(WATCH_RESTART_MIN_BACKOFF_SECS),
            Duration::from_secs(WATCH_RESTART_MAX_BACKOFF_SECS),
        )
    }
}

impl RestartPolicy for WatchRestartPolicy {
    fn next_delay(&mut self, exit: &WatchExit) -> Duration {
        match exit {
            WatchExit::Closed { events } if *events > 0 => {
                self.backoff.reset();
                Duration::ZERO
            }
            WatchExit::Closed { .. } | WatchExit::SubscribeFailed => self.backoff.next_backoff(),
            WatchExit::Cancelled => Duration::ZERO,
        }
    }
}

/// Always restart without delay
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateRestart;

impl RestartPolicy for ImmediateRestart {
    fn next_delay(&mut self, _exit: &WatchExit) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_backoff().as_secs()).collect()
    }

    #[test]
    fn test_fibonacci_sequence_is_capped() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(secs(&mut backoff, 10), vec![1, 1, 2, 3, 5, 8, 13, 21, 30, 30]);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        secs(&mut backoff, 5);
        backoff.reset();
        assert_eq!(secs(&mut backoff, 3), vec![1, 1, 2]);
    }

    #[test]
    fn test_watch_policy_restarts_immediately_after_events() {
        let mut policy = WatchRestartPolicy::default();
        assert_eq!(policy.next_delay(&WatchExit::SubscribeFailed), Duration::from_secs(1));
        assert_eq!(policy.next_delay(&WatchExit::SubscribeFailed), Duration::from_secs(1));
        assert_eq!(policy.next_delay(&WatchExit::Closed { events: 0 }), Duration::from_secs(2));
        assert_eq!(policy.next_delay(&WatchExit::Closed { events: 4 }), Duration::ZERO);
        // Backoff was reset by the productive session
        assert_eq!(policy.next_delay(&WatchExit::SubscribeFailed), Duration::from_secs(1));
    }

    #[test]
    fn test_immediate_restart() {
        let mut policy = ImmediateRestart;
        assert_eq!(policy.next_delay(&WatchExit::SubscribeFailed), Duration::ZERO);
        assert_eq!(policy.next_delay(&WatchExit::Closed { events: 0 }), Duration::ZERO);
    }
}
