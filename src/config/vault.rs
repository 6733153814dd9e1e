//! # Vault Location Settings
//!
//! Where the Vault pods and services live and how to reach them.

use super::{override_from, ConfigError};
use crate::constants::{
    DEFAULT_UNSEAL_MOUNT, DEFAULT_UNSEAL_PATH, DEFAULT_VAULT_ACTIVE_SERVICE,
    DEFAULT_VAULT_HEADLESS_SERVICE, DEFAULT_VAULT_NAMESPACE, DEFAULT_VAULT_PORT,
    DEFAULT_VAULT_ROLE, DEFAULT_VAULT_SCHEME, DEFAULT_VAULT_SERVER_POD_LABELS,
};
use serde::Deserialize;

/// Vault deployment settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultSettings {
    /// `http` or `https`
    #[serde(alias = "vaultSchema", alias = "vault_schema")]
    pub vault_scheme: String,
    #[serde(alias = "vaultPort")]
    pub vault_port: u16,
    /// Namespace of the Vault pods and services
    pub namespace: String,
    /// Kubernetes auth role used to read the unseal shares
    #[serde(alias = "vaultRole")]
    pub vault_role: String,
    /// Service that always points at the active Vault node
    #[serde(alias = "vaultActiveService")]
    pub vault_active_service: String,
    /// Headless service, logged at startup
    #[serde(alias = "vaultHeadlessService")]
    pub vault_headless_service: String,
    /// Label selector for Vault server pods
    #[serde(alias = "vaultServerPodLabels")]
    pub vault_server_pod_labels: String,
    /// KV v2 mount holding the unseal shares
    #[serde(alias = "unsealMount")]
    pub unseal_mount: String,
    /// Secret path of the unseal share document inside `unseal_mount`
    #[serde(alias = "unsealPath")]
    pub unseal_path: String,
    /// PEM bundle trusted for the active service, in addition to the cluster CA
    #[serde(alias = "vaultCacert")]
    pub vault_cacert: String,
    /// Skip certificate verification for the active service
    #[serde(alias = "vaultSkipVerify")]
    pub vault_skip_verify: bool,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            vault_scheme: DEFAULT_VAULT_SCHEME.to_string(),
            vault_port: DEFAULT_VAULT_PORT,
            namespace: DEFAULT_VAULT_NAMESPACE.to_string(),
            vault_role: DEFAULT_VAULT_ROLE.to_string(),
            vault_active_service: DEFAULT_VAULT_ACTIVE_SERVICE.to_string(),
            vault_headless_service: DEFAULT_VAULT_HEADLESS_SERVICE.to_string(),
            vault_server_pod_labels: DEFAULT_VAULT_SERVER_POD_LABELS.to_string(),
            unseal_mount: DEFAULT_UNSEAL_MOUNT.to_string(),
            unseal_path: DEFAULT_UNSEAL_PATH.to_string(),
            vault_cacert: String::new(),
            vault_skip_verify: false,
        }
    }
}

impl VaultSettings {
    pub(super) fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(lookup, "VAULT_SCHEMA", &mut self.vault_scheme)?;
        override_from(lookup, "VAULT_PORT", &mut self.vault_port)?;
        override_from(lookup, "VAULT_NAMESPACE", &mut self.namespace)?;
        override_from(lookup, "VAULT_ROLE", &mut self.vault_role)?;
        override_from(lookup, "VAULT_ACTIVE_SERVICE", &mut self.vault_active_service)?;
        override_from(lookup, "VAULT_HEADLESS_SERVICE", &mut self.vault_headless_service)?;
        override_from(lookup, "VAULT_SERVER_POD_LABELS", &mut self.vault_server_pod_labels)?;
        override_from(lookup, "VAULT_UNSEAL_MOUNT", &mut self.unseal_mount)?;
        override_from(lookup, "VAULT_UNSEAL_PATH", &mut self.unseal_path)?;
        override_from(lookup, "VAULT_CACERT", &mut self.vault_cacert)?;
        override_from(lookup, "VAULT_SKIP_VERIFY", &mut self.vault_skip_verify)?;
        Ok(())
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.vault_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "vault_scheme must be http or https, got {:?}",
                self.vault_scheme
            )));
        }
        if self.vault_server_pod_labels.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "vault_server_pod_labels must not be empty".into(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        Ok(())
    }
}
