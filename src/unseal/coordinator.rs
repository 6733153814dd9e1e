//! # Unseal Coordinator
//!
//! Owns the unseal share cache and applies shares to sealed members.
//!
//! Every attempt runs under the coordinator's mutex, which is held across the
//! whole sequence of Vault calls. Attempts triggered by the watcher and by the
//! full scan therefore never overlap, even for different members, and a key
//! refresh swaps the cache only between attempts.

use super::keys::{redact_share, UnsealKeys};
use super::{UnsealError, UnsealOutcome};
use crate::cluster::ClusterApi;
use crate::config::Config;
use crate::constants::{KEY_FETCH_TIMEOUT_SECS, UNSEAL_REQUEST_TIMEOUT_SECS};
use crate::observability::metrics;
use crate::vault::{ClientSettings, SecretStore, StoreConnector, VaultError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use zeroize::Zeroizing;

/// Per-pass counts from [`UnsealCoordinator::unseal_all_members`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Pods matched by the server label selector
    pub members: usize,
    /// Members without an IP yet
    pub skipped: usize,
    /// Members that went from sealed to unsealed during this pass
    pub unsealed: usize,
    /// Members that were already unsealed
    pub already_unsealed: usize,
    /// Members still sealed after every cached share was tried
    pub still_sealed: usize,
    /// Members reporting `initialized == false`
    pub uninitialized: usize,
    /// Attempts that ended in an error (unreachable member, bad response)
    pub failed: usize,
}

impl ScanSummary {
    fn record(&mut self, result: &Result<UnsealOutcome, UnsealError>) {
        match result {
            Ok(UnsealOutcome::Unsealed { .. }) => self.unsealed += 1,
            Ok(UnsealOutcome::AlreadyUnsealed) => self.already_unsealed += 1,
            Ok(UnsealOutcome::StillSealed { .. }) => self.still_sealed += 1,
            Ok(UnsealOutcome::Uninitialized) => self.uninitialized += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Log the result of one unseal attempt
pub fn log_attempt(address: &str, result: &Result<UnsealOutcome, UnsealError>) {
    match result {
        Ok(UnsealOutcome::Unsealed { submitted }) => {
            info!(address, submitted, "vault member unsealed");
        }
        Ok(UnsealOutcome::StillSealed { submitted }) => {
            warn!(
                address,
                submitted, "vault member still sealed after all cached shares, will retry"
            );
        }
        Ok(UnsealOutcome::AlreadyUnsealed) => debug!(address, "vault member already unsealed"),
        Ok(UnsealOutcome::Uninitialized) => {
            warn!(address, "vault member is not initialized, skipping unseal");
        }
        Err(e) => error!(address, error = %e, "unseal attempt failed"),
    }
}

/// Unseal coordinator
///
/// Shared as `Arc<UnsealCoordinator>` by the unseal worker, the key refresh
/// loop and the full scan loop.
pub struct UnsealCoordinator {
    config: Arc<Config>,
    cluster: Arc<dyn ClusterApi>,
    connector: Arc<dyn StoreConnector>,
    keys: Mutex<UnsealKeys>,
}

impl std::fmt::Debug for UnsealCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsealCoordinator")
            .field("namespace", &self.config.k8s.namespace)
            .finish_non_exhaustive()
    }
}

impl UnsealCoordinator {
    /// Create a coordinator with an empty share cache
    ///
    /// Nothing can be unsealed until the first successful
    /// [`refresh_unseal_keys`](Self::refresh_unseal_keys).
    pub fn new(
        config: Arc<Config>,
        cluster: Arc<dyn ClusterApi>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            config,
            cluster,
            connector,
            keys: Mutex::new(UnsealKeys::new()),
        }
    }

    /// Replace the share cache wholesale
    pub async fn set_unseal_keys(&self, keys: UnsealKeys) {
        let count = keys.len();
        *self.keys.lock().await = keys;
        metrics::set_cached_shares(count);
    }

    /// Sorted ids of the cached shares
    pub async fn cached_share_ids(&self) -> Vec<String> {
        self.keys
            .lock()
            .await
            .ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Fetch the unseal shares from the active Vault node and replace the cache
    ///
    /// Any failure leaves the previous cache untouched.
    pub async fn refresh_unseal_keys(&self) -> Result<usize, UnsealError> {
        let result = self.fetch_unseal_keys().await;
        metrics::increment_key_refreshes(if result.is_ok() { "success" } else { "failure" });
        let keys = result?;

        for (id, value) in &keys {
            info!(share = %id, value = %redact_share(value), "loaded unseal share");
        }
        let count = keys.len();
        self.set_unseal_keys(UnsealKeys::from(keys)).await;
        Ok(count)
    }

    async fn fetch_unseal_keys(
        &self,
    ) -> Result<std::collections::HashMap<String, String>, UnsealError> {
        let settings = &self.config.k8s;
        let jwt = self.login_jwt().await?;
        let client_settings = self.active_service_settings().await?;
        let address = client_settings.address();
        let store = self
            .connector
            .connect(&client_settings)
            .map_err(|source| UnsealError::Vault {
                address: address.clone(),
                source,
            })?;

        let auth = store
            .login(&settings.vault_role, &jwt)
            .await
            .map_err(UnsealError::Login)?;
        debug!(address = %address, auth = ?auth, "vault login succeeded");

        let document = store
            .read_secret(&settings.unseal_mount, &settings.unseal_path)
            .await
            .map_err(UnsealError::ReadShares)?;

        if document.is_empty() {
            return Err(UnsealError::EmptyShareDocument {
                mount: settings.unseal_mount.clone(),
                path: settings.unseal_path.clone(),
            });
        }
        Ok(document)
    }

    /// JWT for the Vault Kubernetes auth method
    ///
    /// In-cluster the projected token file is read on every login so rotated
    /// tokens are picked up; otherwise the configured token, then the
    /// kubeconfig user's token.
    async fn login_jwt(&self) -> Result<Zeroizing<String>, UnsealError> {
        if self.config.in_cluster {
            let path = &self.config.token_path;
            let raw = Zeroizing::new(tokio::fs::read_to_string(path).await.map_err(|source| {
                UnsealError::TokenFile {
                    path: path.clone(),
                    source,
                }
            })?);
            let token = raw.trim();
            if token.is_empty() {
                return Err(UnsealError::Credential(format!(
                    "token file {} is empty",
                    path.display()
                )));
            }
            return Ok(Zeroizing::new(token.to_string()));
        }

        if !self.config.token.is_empty() {
            return Ok(Zeroizing::new(self.config.token.expose().to_string()));
        }

        self.cluster.token().ok_or_else(|| {
            UnsealError::Credential(
                "set TOKEN or use a kubeconfig user with a bearer token".to_string(),
            )
        })
    }

    /// Settings for the active service client
    ///
    /// Trusts the cluster CA plus the optional `vault_cacert` PEM bundle, read
    /// on every refresh so a rotated bundle is picked up.
    async fn active_service_settings(&self) -> Result<ClientSettings, UnsealError> {
        let settings = &self.config.k8s;
        let https = settings.vault_scheme == "https";

        let ca_bundle = if https && !settings.vault_cacert.is_empty() {
            let path = PathBuf::from(&settings.vault_cacert);
            let pem = tokio::fs::read(&path)
                .await
                .map_err(|source| UnsealError::CaCertFile { path, source })?;
            Some(pem)
        } else {
            None
        };

        Ok(ClientSettings {
            scheme: settings.vault_scheme.clone(),
            host: settings.vault_active_service.clone(),
            port: settings.vault_port,
            timeout: Duration::from_secs(KEY_FETCH_TIMEOUT_SECS),
            tls_insecure: settings.vault_skip_verify,
            ca_cert: if https { self.cluster.ca_data() } else { None },
            ca_bundle,
        })
    }

    fn member_settings(&self, address: &str) -> ClientSettings {
        let settings = &self.config.k8s;
        // Pod IPs never match the certificate SANs
        ClientSettings {
            scheme: settings.vault_scheme.clone(),
            host: address.to_string(),
            port: settings.vault_port,
            timeout: Duration::from_secs(UNSEAL_REQUEST_TIMEOUT_SECS),
            tls_insecure: true,
            ca_cert: None,
            ca_bundle: None,
        }
    }

    /// Run one unseal attempt against the member at `address`
    ///
    /// Shares are submitted one at a time. After each accepted share the seal
    /// status is queried again; if the member is still sealed and its progress
    /// did not advance, the same share is submitted once more. The attempt ends
    /// as soon as the member reports unsealed or the cache is exhausted.
    ///
    /// # Errors
    ///
    /// Only when the member cannot be reached or answers with something that
    /// is not a seal status. Rejected shares are skipped.
    pub async fn unseal_member(&self, address: &str) -> Result<UnsealOutcome, UnsealError> {
        let span = info_span!("unseal.attempt", address = %address);
        let result = self.attempt(address).instrument(span).await;
        metrics::increment_unseal_attempts(match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        });
        result
    }

    async fn attempt(&self, address: &str) -> Result<UnsealOutcome, UnsealError> {
        let keys = self.keys.lock().await;

        let vault_err = |source: VaultError| UnsealError::Vault {
            address: address.to_string(),
            source,
        };
        let store = self
            .connector
            .connect(&self.member_settings(address))
            .map_err(vault_err)?;

        let status = store.seal_status().await.map_err(vault_err)?;
        info!(
            address,
            initialized = status.initialized,
            sealed = status.sealed,
            total = status.shares,
            threshold = status.threshold,
            "seal status"
        );

        if !status.needs_unseal() {
            return Ok(if status.initialized {
                UnsealOutcome::AlreadyUnsealed
            } else {
                UnsealOutcome::Uninitialized
            });
        }

        warn!(address, shares = keys.len(), "vault member is sealed, applying unseal shares");
        if keys.is_empty() {
            warn!(address, "no unseal shares cached yet");
        }

        let mut submitted = 0;
        let mut progress = status.progress;
        for (id, share) in keys.iter() {
            submitted += 1;
            match submit_share(store.as_ref(), address, id, share)
                .await
                .map_err(vault_err)?
            {
                Submission::Unsealed => return Ok(UnsealOutcome::Unsealed { submitted }),
                Submission::Rejected => continue,
                Submission::Pending { .. } => {}
            }

            let current = store.seal_status().await.map_err(vault_err)?;
            info!(
                address,
                initialized = current.initialized,
                sealed = current.sealed,
                progress = current.progress,
                threshold = current.threshold,
                "seal status"
            );
            if !current.sealed {
                return Ok(UnsealOutcome::Unsealed { submitted });
            }

            // Still sealed and progress did not advance: the share was not retained
            if current.progress <= progress {
                debug!(
                    address,
                    share = %id,
                    progress = current.progress,
                    "unseal progress did not advance, resubmitting share"
                );
                submitted += 1;
                match submit_share(store.as_ref(), address, id, share)
                    .await
                    .map_err(vault_err)?
                {
                    Submission::Unsealed => return Ok(UnsealOutcome::Unsealed { submitted }),
                    Submission::Pending { progress: after } => progress = after,
                    Submission::Rejected => progress = current.progress,
                }
            } else {
                progress = current.progress;
            }
        }

        Ok(UnsealOutcome::StillSealed { submitted })
    }

    /// List all members and run an unseal attempt for each one, in order
    pub async fn unseal_all_members(&self) -> Result<ScanSummary, UnsealError> {
        let members = self.cluster.list_members().await?;
        let mut summary = ScanSummary {
            members: members.len(),
            ..ScanSummary::default()
        };

        for member in &members {
            let Some(address) = member.address.as_deref() else {
                debug!(member = %member.name, "vault-server pod has no IP yet, skipping");
                summary.skipped += 1;
                continue;
            };
            info!(member = %member.name, address, "vault-server pod");
            let result = self.unseal_member(address).await;
            log_attempt(address, &result);
            summary.record(&result);
        }

        Ok(summary)
    }
}

/// What happened to one submitted share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    /// Accepted and the member is now unsealed
    Unsealed,
    /// Accepted, more shares needed; `progress` as reported after the submission
    Pending { progress: u32 },
    /// Vault refused the share
    Rejected,
}

/// Submit one share
///
/// Rejected shares are logged and skipped. Only transport failures abort the
/// attempt.
async fn submit_share(
    store: &dyn SecretStore,
    address: &str,
    id: &str,
    share: &str,
) -> Result<Submission, VaultError> {
    match store.submit_unseal_share(share).await {
        Ok(status) => {
            metrics::increment_shares_submitted();
            debug!(
                address,
                share = %id,
                value = %redact_share(share),
                progress = status.progress,
                sealed = status.sealed,
                "submitted unseal share"
            );
            Ok(if status.sealed {
                Submission::Pending {
                    progress: status.progress,
                }
            } else {
                Submission::Unsealed
            })
        }
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            warn!(address, share = %id, error = %e, "vault rejected unseal share");
            Ok(Submission::Rejected)
        }
    }
}
