//! # Controller
//!
//! The long-running loops around the unseal coordinator.
//!
//! ## Sub-modules
//!
//! - `backoff` - Fibonacci backoff and the watch restart policy
//! - `queue` - Bounded queue and worker between the watcher and the coordinator
//! - `watcher` - Pod watch that feeds unseal requests into the queue
//! - `scheduler` - Periodic key refresh and full member scan
//! - `server` - HTTP server for metrics and probes

pub mod backoff;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod watcher;

pub use backoff::{FibonacciBackoff, ImmediateRestart, RestartPolicy, WatchRestartPolicy};
pub use queue::{run_unseal_worker, UnsealQueue, UnsealRequest};
pub use scheduler::{refresh_once, run_full_scan, run_key_refresh, scan_once};
pub use server::{start_server, ServerState};
pub use watcher::{MemberWatcher, WatchExit};
