//! # Vault HTTP Client
//!
//! `reqwest` client for the Vault HTTP API with rustls.

use super::error::VaultError;
use super::types::{
    AuthInfo, ErrorResponse, KubernetesLoginRequest, KvV2ReadResponse, LoginResponse,
    SealStatus, UnsealRequest,
};
use super::SecretStore;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Connection settings for one Vault endpoint
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub scheme: String,
    /// Host name or IP address (IPv6 without brackets)
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub tls_insecure: bool,
    /// Extra trusted root certificate (DER), typically the cluster CA
    pub ca_cert: Option<Vec<u8>>,
    /// Extra trusted PEM bundle, e.g. the CA that issued the Vault certificate
    pub ca_bundle: Option<Vec<u8>>,
}

impl ClientSettings {
    /// Base address, e.g. `https://10.0.0.5:8200`
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Vault client bound to a single address
#[derive(Debug)]
pub struct VaultClient {
    http: Client,
    address: String,
    token: RwLock<Option<Zeroizing<String>>>,
}

impl VaultClient {
    /// Create a client for the given settings
    pub fn new(settings: &ClientSettings) -> Result<Self, VaultError> {
        let address = settings.address();
        let mut builder = Client::builder().timeout(settings.timeout);

        if settings.tls_insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(der) = &settings.ca_cert {
            let cert = reqwest::Certificate::from_der(der).map_err(|e| VaultError::Build {
                address: address.clone(),
                message: format!("invalid CA certificate: {e}"),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(pem) = &settings.ca_bundle {
            let certs = reqwest::Certificate::from_pem_bundle(pem).map_err(|e| {
                VaultError::Build {
                    address: address.clone(),
                    message: format!("invalid CA bundle: {e}"),
                }
            })?;
            if certs.is_empty() {
                return Err(VaultError::Build {
                    address,
                    message: "CA bundle holds no certificates".to_string(),
                });
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder.build().map_err(|e| VaultError::Build {
            address: address.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            http,
            address,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, VaultError> {
        let response = request.send().await.map_err(|source| VaultError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Vault reports failures as {"errors": [...]}; tolerate anything else
        let body = response.text().await.unwrap_or_default();
        let errors = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.errors)
            .unwrap_or_default();
        let errors = if errors.is_empty() && !body.trim().is_empty() {
            vec![body.trim().to_string()]
        } else {
            errors
        };

        Err(VaultError::Api {
            url: url.to_string(),
            status: status.as_u16(),
            errors,
        })
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, VaultError> {
        response.json::<T>().await.map_err(|e| VaultError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder, VaultError> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(VaultError::NotAuthenticated)?;
        Ok(self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, token.as_str()))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn login(&self, role: &str, jwt: &str) -> Result<AuthInfo, VaultError> {
        let url = self.url("auth/kubernetes/login");
        let request = self
            .http
            .post(&url)
            .json(&KubernetesLoginRequest { role, jwt });
        let response = self.send(&url, request).await?;
        let body: LoginResponse = Self::decode(&url, response).await?;
        let auth = body.auth.ok_or(VaultError::MissingAuth)?;

        let info = AuthInfo {
            client_token: Zeroizing::new(auth.client_token),
            policies: auth.policies,
            lease_duration: auth.lease_duration,
            renewable: auth.renewable,
        };
        *self.token.write().await = Some(info.client_token.clone());
        debug!(address = %self.address, role, policies = ?info.policies, "logged in to vault");
        Ok(info)
    }

    async fn read_secret(
        &self,
        mount: &str,
        path: &str,
    ) -> Result<HashMap<String, String>, VaultError> {
        let url = self.url(&format!(
            "{}/data/{}",
            mount.trim_matches('/'),
            path.trim_matches('/')
        ));
        let request = self.authorized(Method::GET, &url).await?;
        let response = self.send(&url, request).await?;
        let body: KvV2ReadResponse = Self::decode(&url, response).await?;

        let document = body
            .data
            .and_then(|d| d.data)
            .ok_or_else(|| VaultError::Decode {
                url: url.clone(),
                message: "secret has no data (deleted or destroyed version?)".to_string(),
            })?;

        let mut values = HashMap::with_capacity(document.len());
        for (key, value) in document {
            match value {
                serde_json::Value::String(s) => {
                    values.insert(key, s);
                }
                other => {
                    warn!(
                        key = %key,
                        kind = json_kind(&other),
                        "ignoring non-string value in secret {}/{}",
                        mount,
                        path
                    );
                }
            }
        }
        Ok(values)
    }

    async fn seal_status(&self) -> Result<SealStatus, VaultError> {
        let url = self.url("sys/seal-status");
        let response = self.send(&url, self.http.get(&url)).await?;
        Self::decode(&url, response).await
    }

    async fn submit_unseal_share(&self, share: &str) -> Result<SealStatus, VaultError> {
        let url = self.url("sys/unseal");
        let request = self.http.put(&url).json(&UnsealRequest { key: share });
        let response = self.send(&url, request).await?;
        Self::decode(&url, response).await
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host: &str) -> ClientSettings {
        ClientSettings {
            scheme: "https".into(),
            host: host.into(),
            port: 8200,
            timeout: Duration::from_secs(20),
            tls_insecure: true,
            ca_cert: None,
            ca_bundle: None,
        }
    }

    #[test]
    fn test_address_ipv4() {
        assert_eq!(settings("10.0.0.5").address(), "https://10.0.0.5:8200");
    }

    #[test]
    fn test_address_ipv6_is_bracketed() {
        assert_eq!(settings("fd00::5").address(), "https://[fd00::5]:8200");
        assert_eq!(settings("[fd00::5]").address(), "https://[fd00::5]:8200");
    }

    #[test]
    fn test_url_joins_api_path() {
        let client = VaultClient::new(&settings("vault-active")).unwrap();
        assert_eq!(
            client.url("/sys/seal-status"),
            "https://vault-active:8200/v1/sys/seal-status"
        );
    }

    #[test]
    fn test_invalid_ca_is_build_error() {
        let mut s = settings("vault-active");
        s.ca_cert = Some(b"not a certificate".to_vec());
        let err = VaultClient::new(&s).unwrap_err();
        assert!(matches!(err, VaultError::Build { .. }));
    }

    #[test]
    fn test_empty_ca_bundle_is_build_error() {
        let mut s = settings("vault-active");
        s.ca_bundle = Some(b"# no certificates here\n".to_vec());
        let err = VaultClient::new(&s).unwrap_err();
        assert!(matches!(err, VaultError::Build { message, .. } if message.contains("no certificates")));
    }

    #[tokio::test]
    async fn test_read_secret_requires_login() {
        let client = VaultClient::new(&settings("vault-active")).unwrap();
        let err = client.read_secret("internal", "unseal").await.unwrap_err();
        assert!(matches!(err, VaultError::NotAuthenticated));
    }
}
