//! # Cluster
//!
//! Kubernetes access for member discovery.
//!
//! The controller consumes the [`ClusterApi`] trait; [`KubeCluster`] implements
//! it with `kube` for the labelled Vault server pods in one namespace.

mod client;
mod member;

pub use client::KubeCluster;
pub use member::{Member, MemberEvent};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors from the Kubernetes adapter
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubeconfig / in-cluster config could not be resolved
    #[error("failed to load kubernetes configuration: {0}")]
    Config(String),

    /// Kubernetes API request failed
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    /// Watch event payload could not be decoded
    #[error("failed to decode watch event: {0}")]
    Decode(String),

    /// API server sent an error event on the watch stream
    #[error("watch error event ({code}): {message}")]
    WatchStatus { code: u16, message: String },
}

/// Stream of member events from one watch subscription
pub type MemberEventStream = BoxStream<'static, Result<MemberEvent, ClusterError>>;

/// Summary of a Kubernetes service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub cluster_ip: Option<String>,
    pub ports: Vec<u16>,
}

/// Kubernetes operations the controller needs
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List all members matching the configured selector
    async fn list_members(&self) -> Result<Vec<Member>, ClusterError>;

    /// Fetch a service in the Vault namespace
    async fn get_service(&self, name: &str) -> Result<ServiceInfo, ClusterError>;

    /// Open a watch subscription from the last seen resource version
    async fn watch_members(&self) -> Result<MemberEventStream, ClusterError>;

    /// Bearer token of the Kubernetes client, if it uses one
    fn token(&self) -> Option<Zeroizing<String>>;

    /// Cluster CA certificate (DER), if known
    fn ca_data(&self) -> Option<Vec<u8>>;
}
