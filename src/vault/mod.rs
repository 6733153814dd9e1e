//! # Vault
//!
//! Secret store client used by the unseal coordinator.
//!
//! The coordinator only talks to the [`SecretStore`] trait; [`VaultClient`]
//! implements it over the Vault HTTP API. A [`StoreConnector`] builds one
//! store per address so short-lived per-member clients can be swapped for
//! in-memory stores in tests.

mod client;
mod error;
mod types;

pub use client::{ClientSettings, VaultClient};
pub use error::VaultError;
pub use types::{AuthInfo, SealStatus};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Operations the controller needs from a secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Log in with the Kubernetes auth method; later calls use the returned token
    async fn login(&self, role: &str, jwt: &str) -> Result<AuthInfo, VaultError>;

    /// Read a KV v2 secret document as string values
    async fn read_secret(
        &self,
        mount: &str,
        path: &str,
    ) -> Result<HashMap<String, String>, VaultError>;

    /// Current seal status
    async fn seal_status(&self) -> Result<SealStatus, VaultError>;

    /// Submit one unseal share and return the resulting status
    async fn submit_unseal_share(&self, share: &str) -> Result<SealStatus, VaultError>;
}

/// Builds secret store clients for a given endpoint
pub trait StoreConnector: Send + Sync {
    fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn SecretStore>, VaultError>;
}

/// Connector producing real HTTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl StoreConnector for HttpConnector {
    fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn SecretStore>, VaultError> {
        Ok(Arc::new(VaultClient::new(settings)?))
    }
}
