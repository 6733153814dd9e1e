//! # Vault API Types
//!
//! Request and response bodies for the small slice of the Vault HTTP API the
//! controller uses.
//!
//! API Reference: https://developer.hashicorp.com/vault/api-docs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

/// Seal status as reported by `GET /v1/sys/seal-status` and `PUT /v1/sys/unseal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SealStatus {
    pub initialized: bool,
    pub sealed: bool,
    /// Total number of shares
    #[serde(rename = "n", default)]
    pub shares: u32,
    /// Number of shares required to unseal
    #[serde(rename = "t", default)]
    pub threshold: u32,
    /// Shares accepted so far in the current unseal flow
    #[serde(default)]
    pub progress: u32,
}

impl SealStatus {
    /// Initialized and sealed: the only state in which shares are submitted
    pub fn needs_unseal(&self) -> bool {
        self.initialized && self.sealed
    }
}

/// Result of a successful login
#[derive(Clone)]
pub struct AuthInfo {
    pub client_token: Zeroizing<String>,
    pub policies: Vec<String>,
    pub lease_duration: u64,
    pub renewable: bool,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("policies", &self.policies)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

/// Body for `POST /v1/auth/kubernetes/login`
#[derive(Serialize)]
pub(crate) struct KubernetesLoginRequest<'a> {
    pub role: &'a str,
    pub jwt: &'a str,
}

/// Body for `PUT /v1/sys/unseal`
#[derive(Serialize)]
pub(crate) struct UnsealRequest<'a> {
    pub key: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
pub(crate) struct LoginAuth {
    pub client_token: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// KV v2 read response: the document lives under `data.data`
#[derive(Deserialize)]
pub(crate) struct KvV2ReadResponse {
    pub data: Option<KvV2Data>,
}

#[derive(Deserialize)]
pub(crate) struct KvV2Data {
    #[serde(default)]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

/// Error body returned by Vault on non-2xx responses
#[derive(Deserialize, Default)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}
