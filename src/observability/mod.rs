//! # Observability
//!
//! Logging setup and Prometheus metrics.
//!
//! ## Sub-modules
//!
//! - `logging` - `tracing` subscriber installation
//! - `metrics` - Prometheus registry and controller metrics

pub mod logging;
pub mod metrics;
