//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `unseal_metrics` - Unseal attempts, submitted shares and the share cache
//! - `watch_metrics` - Pod watch events, restarts and the unseal queue

pub mod registry;
pub mod unseal_metrics;
pub mod watch_metrics;

pub use registry::*;
pub use unseal_metrics::*;
pub use watch_metrics::*;
