//! # Vault Client Errors

use thiserror::Error;

/// Errors returned by a [`SecretStore`](super::SecretStore)
#[derive(Debug, Error)]
pub enum VaultError {
    /// The HTTP client could not be built (bad CA certificate, TLS setup)
    #[error("failed to build vault client for {address}: {message}")]
    Build { address: String, message: String },

    /// Request never produced an HTTP response (connect, timeout, TLS)
    #[error("vault request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Vault answered with a non-success status
    #[error("vault returned {status} for {url}: {}", errors.join("; "))]
    Api {
        url: String,
        status: u16,
        errors: Vec<String>,
    },

    /// Vault answered but the body did not have the expected shape
    #[error("unexpected vault response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Login succeeded at the HTTP level but carried no auth block
    #[error("no auth info was returned after login")]
    MissingAuth,

    /// A token-protected call was made before `login`
    #[error("vault client is not authenticated")]
    NotAuthenticated,
}

impl VaultError {
    /// True when the store could not be reached at all
    ///
    /// Unseal attempts abort on these; API errors for a single share do not.
    pub fn is_transport(&self) -> bool {
        matches!(self, VaultError::Transport { .. } | VaultError::Build { .. })
    }
}
