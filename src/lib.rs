//! # Vault Auto-Unseal Controller
//!
//! A Kubernetes controller that keeps HashiCorp Vault server pods unsealed.
//!
//! ## Overview
//!
//! 1. **Watching Vault pods** - Pod Added/Modified events for running members queue an unseal
//! 2. **Full scans** - Every interval all members are checked, as a fallback to the watch
//! 3. **Share refresh** - Unseal shares are read from a KV v2 secret on the active node
//! 4. **Unsealing** - Cached shares are submitted until the member reports unsealed
//!
//! ## Features
//!
//! - **Resilient watch**: The pod watch is reopened after every closure, with backoff
//! - **Serialized attempts**: One unseal attempt at a time across the whole process
//! - **Redacted secrets**: Share values and tokens never appear in logs
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod runtime;
pub mod unseal;
pub mod vault;
