//! # Controller Configuration
//!
//! Process configuration, built once at startup and handed to every component
//! as `Arc<Config>`.
//!
//! Values are layered in this order, later layers winning:
//!
//! 1. Built-in defaults
//! 2. Optional YAML file (`--config`, default `config.yaml`)
//! 3. Environment variables
//!
//! A missing YAML file is not an error; a malformed one is.

mod server;
mod vault;

pub use server::HttpSettings;
pub use vault::VaultSettings;

use crate::constants::{
    DEFAULT_INTERVAL_SECS, DEFAULT_TOKEN_PATH, DEFAULT_UNSEAL_QUEUE_CAPACITY,
    KEY_REFRESH_MULTIPLIER,
};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// String that never shows up in logs or `Debug` output
///
/// Empty values render as `""` so an unset token is still visible as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"XXX\"")
        }
    }
}

impl<'de> Deserialize<'de> for Redacted {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Top-level controller configuration
///
/// Keys are snake_case; the camelCase spellings of older config files are
/// accepted as aliases. Unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log level used when `RUST_LOG` is not set
    #[serde(alias = "logLevel")]
    pub log_level: String,
    /// Run with the in-cluster service account instead of a kubeconfig
    #[serde(alias = "inCluster")]
    pub in_cluster: bool,
    /// Service account token file used for Vault login in-cluster
    #[serde(alias = "tokenPath")]
    pub token_path: PathBuf,
    /// Explicit service account token used for Vault login out of cluster
    pub token: Redacted,
    /// Kubeconfig path used out of cluster (empty means default discovery)
    pub kubeconfig: String,
    /// Full scan interval in seconds
    pub interval: u64,
    /// Capacity of the watch-to-unseal queue
    #[serde(alias = "queueCapacity")]
    pub queue_capacity: usize,
    /// Vault and Kubernetes location settings
    #[serde(alias = "K8S")]
    pub k8s: VaultSettings,
    /// Liveness/metrics HTTP server settings
    #[serde(alias = "HTTP")]
    pub http: HttpSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            in_cluster: true,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            token: Redacted::default(),
            kubeconfig: String::new(),
            interval: DEFAULT_INTERVAL_SECS,
            queue_capacity: DEFAULT_UNSEAL_QUEUE_CAPACITY,
            k8s: VaultSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the YAML file (if present) and the process environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load configuration using a custom environment lookup
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(lookup, "LOG_LEVEL", &mut self.log_level)?;
        override_from(lookup, "IN_CLUSTER", &mut self.in_cluster)?;
        override_from(lookup, "TOKEN_PATH", &mut self.token_path)?;
        if let Some(token) = lookup("TOKEN") {
            self.token = Redacted::new(token);
        }
        override_from(lookup, "KUBECONFIG", &mut self.kubeconfig)?;
        override_from(lookup, "INTERVAL", &mut self.interval)?;
        override_from(lookup, "UNSEAL_QUEUE_CAPACITY", &mut self.queue_capacity)?;
        self.k8s.apply_env(lookup)?;
        self.http.apply_env(lookup)?;
        Ok(())
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be greater than 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        self.k8s.validate()
    }

    /// Full member scan period
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Unseal share refresh period
    pub fn key_refresh_interval(&self) -> Duration {
        self.scan_interval() * KEY_REFRESH_MULTIPLIER
    }
}

/// Overwrite `target` with the parsed value of `key` when the variable is set
pub(crate) fn override_from<F, T>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_parse_err| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}
