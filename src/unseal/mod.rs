//! # Unseal
//!
//! The unseal coordinator: share cache, key refresh and per-member unseal
//! attempts.

mod coordinator;
mod keys;

pub use coordinator::{log_attempt, ScanSummary, UnsealCoordinator};
pub use keys::{redact_share, UnsealKeys};

use crate::cluster::ClusterError;
use crate::vault::VaultError;
use std::path::PathBuf;
use thiserror::Error;

/// Terminal state of one unseal attempt
///
/// None of these is an error: running out of shares is retried by the next
/// trigger with a possibly refreshed cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsealOutcome {
    /// Member reported `sealed == false` before any share was submitted
    AlreadyUnsealed,
    /// Member is not initialized; nothing to unseal
    Uninitialized,
    /// Member became unsealed after `submitted` submissions
    Unsealed { submitted: usize },
    /// All cached shares were tried and the member is still sealed
    StillSealed { submitted: usize },
}

impl UnsealOutcome {
    /// Label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            UnsealOutcome::AlreadyUnsealed => "already_unsealed",
            UnsealOutcome::Uninitialized => "uninitialized",
            UnsealOutcome::Unsealed { .. } => "unsealed",
            UnsealOutcome::StillSealed { .. } => "still_sealed",
        }
    }
}

/// Errors from key refresh and unseal attempts
#[derive(Debug, Error)]
pub enum UnsealError {
    /// No JWT available for the Vault Kubernetes auth method
    #[error("no vault login credential available: {0}")]
    Credential(String),

    #[error("failed to read service account token {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured Vault CA bundle could not be read
    #[error("failed to read vault CA certificate {path}: {source}")]
    CaCertFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vault login failed: {0}")]
    Login(#[source] VaultError),

    #[error("failed to read unseal shares: {0}")]
    ReadShares(#[source] VaultError),

    /// The share document exists but holds no string values
    #[error("unseal share document {mount}/{path} is empty")]
    EmptyShareDocument { mount: String, path: String },

    /// Vault at `address` could not be queried
    #[error("vault at {address}: {source}")]
    Vault {
        address: String,
        #[source]
        source: VaultError,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(UnsealOutcome::AlreadyUnsealed.as_str(), "already_unsealed");
        assert_eq!(UnsealOutcome::Uninitialized.as_str(), "uninitialized");
        assert_eq!(UnsealOutcome::Unsealed { submitted: 3 }.as_str(), "unsealed");
        assert_eq!(
            UnsealOutcome::StillSealed { submitted: 2 }.as_str(),
            "still_sealed"
        );
    }

    #[test]
    fn test_error_display() {
        let err = UnsealError::EmptyShareDocument {
            mount: "internal".into(),
            path: "unseal".into(),
        };
        assert_eq!(err.to_string(), "unseal share document internal/unseal is empty");
    }
}
