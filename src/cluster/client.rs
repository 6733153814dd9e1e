//! # Kubernetes Cluster Client
//!
//! `kube` implementation of [`ClusterApi`] for Vault server pods.

use super::{ClusterApi, ClusterError, Member, MemberEvent, MemberEventStream, ServiceInfo};
use crate::config::Config;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Server-side watch timeout; the API server closes the stream after this
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Resource version meaning "any version", used before the first list
const INITIAL_RESOURCE_VERSION: &str = "0";

/// Kubernetes access scoped to the Vault namespace and server pod selector
pub struct KubeCluster {
    pods: Api<Pod>,
    services: Api<Service>,
    selector: String,
    token: Option<SecretString>,
    ca_data: Option<Vec<u8>>,
    /// Last seen pod resource version; never held across an await
    resource_version: Arc<Mutex<String>>,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("selector", &self.selector)
            .field("resource_version", &self.resource_version())
            .finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Build the Kubernetes client from the controller configuration
    ///
    /// In-cluster mode uses the pod service account; otherwise the configured
    /// kubeconfig, or default kubeconfig discovery when none is set.
    pub async fn connect(config: &Config) -> Result<Self, ClusterError> {
        let kube_config = load_kube_config(config).await?;
        let token = kube_config.auth_info.token.clone();
        let ca_data = kube_config
            .root_cert
            .as_ref()
            .and_then(|certs| certs.first().cloned());

        info!(
            cluster_url = %kube_config.cluster_url,
            in_cluster = config.in_cluster,
            "Kubernetes client configured"
        );

        let client = Client::try_from(kube_config)?;
        let mut cluster = Self::new(
            client,
            &config.k8s.namespace,
            &config.k8s.vault_server_pod_labels,
        );
        cluster.token = token;
        cluster.ca_data = ca_data;
        Ok(cluster)
    }

    /// Wrap an existing client
    pub fn new(client: Client, namespace: &str, selector: &str) -> Self {
        Self {
            pods: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client, namespace),
            selector: selector.to_string(),
            token: None,
            ca_data: None,
            resource_version: Arc::new(Mutex::new(INITIAL_RESOURCE_VERSION.to_string())),
        }
    }

    /// Current watch cursor
    pub fn resource_version(&self) -> String {
        self.resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn load_kube_config(config: &Config) -> Result<kube::Config, ClusterError> {
    if config.in_cluster {
        return kube::Config::incluster().map_err(|e| ClusterError::Config(e.to_string()));
    }

    let options = KubeConfigOptions::default();
    if config.kubeconfig.is_empty() {
        return kube::Config::from_kubeconfig(&options)
            .await
            .map_err(|e| ClusterError::Config(e.to_string()));
    }

    let kubeconfig = Kubeconfig::read_from(&config.kubeconfig).map_err(|e| {
        ClusterError::Config(format!("failed to read {}: {e}", config.kubeconfig))
    })?;
    kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| ClusterError::Config(e.to_string()))
}

fn set_cursor(cursor: &Mutex<String>, version: &str) {
    let mut guard = cursor.lock().unwrap_or_else(PoisonError::into_inner);
    if *guard != version {
        *guard = version.to_string();
    }
}

fn record_pod_version(cursor: &Mutex<String>, pod: &Pod) {
    if let Some(version) = pod.metadata.resource_version.as_deref() {
        set_cursor(cursor, version);
    }
}

/// Translate a raw watch item, keeping the cursor current
fn translate(
    cursor: &Mutex<String>,
    item: Result<WatchEvent<Pod>, kube::Error>,
) -> Result<MemberEvent, ClusterError> {
    match item {
        Ok(WatchEvent::Added(pod)) => {
            record_pod_version(cursor, &pod);
            Ok(MemberEvent::Added(Member::from_pod(&pod)))
        }
        Ok(WatchEvent::Modified(pod)) => {
            record_pod_version(cursor, &pod);
            Ok(MemberEvent::Modified(Member::from_pod(&pod)))
        }
        Ok(WatchEvent::Deleted(pod)) => {
            record_pod_version(cursor, &pod);
            Ok(MemberEvent::Deleted(Member::from_pod(&pod)))
        }
        Ok(WatchEvent::Bookmark(bookmark)) => {
            set_cursor(cursor, &bookmark.metadata.resource_version);
            Ok(MemberEvent::Bookmark)
        }
        Ok(WatchEvent::Error(status)) if status.code == 410 => {
            // Too old resource version: start over from any version
            set_cursor(cursor, INITIAL_RESOURCE_VERSION);
            Ok(MemberEvent::Expired)
        }
        Ok(WatchEvent::Error(status)) => Err(ClusterError::WatchStatus {
            code: status.code,
            message: status.message.clone(),
        }),
        Err(kube::Error::SerdeError(e)) => Err(ClusterError::Decode(e.to_string())),
        Err(e) => Err(ClusterError::Api(e)),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_members(&self) -> Result<Vec<Member>, ClusterError> {
        let params = ListParams::default().labels(&self.selector);
        let list = self.pods.list(&params).await?;
        if let Some(version) = list.metadata.resource_version.as_deref() {
            set_cursor(&self.resource_version, version);
        }
        debug!(count = list.items.len(), selector = %self.selector, "listed vault server pods");
        Ok(list.items.iter().map(Member::from_pod).collect())
    }

    async fn get_service(&self, name: &str) -> Result<ServiceInfo, ClusterError> {
        let service = self.services.get(name).await?;
        let spec = service.spec.as_ref();
        Ok(ServiceInfo {
            name: service.metadata.name.clone().unwrap_or_else(|| name.to_string()),
            cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
            ports: spec
                .and_then(|s| s.ports.as_ref())
                .map(|ports| {
                    ports
                        .iter()
                        .filter_map(|p| u16::try_from(p.port).ok())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    async fn watch_members(&self) -> Result<MemberEventStream, ClusterError> {
        let version = self.resource_version();
        let params = WatchParams::default()
            .labels(&self.selector)
            .timeout(WATCH_TIMEOUT_SECS);
        debug!(resource_version = %version, selector = %self.selector, "opening pod watch");

        let stream = self.pods.watch(&params, &version).await?;
        let cursor = Arc::clone(&self.resource_version);
        Ok(stream.map(move |item| translate(&cursor, item)).boxed())
    }

    fn token(&self) -> Option<Zeroizing<String>> {
        self.token
            .as_ref()
            .map(|t| Zeroizing::new(t.expose_secret().to_string()))
    }

    fn ca_data(&self) -> Option<Vec<u8>> {
        self.ca_data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::watch::Bookmark;
    use kube::core::ErrorResponse;

    fn pod(version: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("vault-1".into()),
                resource_version: Some(version.into()),
                ..ObjectMeta::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".into()),
                pod_ip: Some("10.0.0.6".into()),
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn test_translate_added_updates_cursor() {
        let cursor = Mutex::new("0".to_string());
        let event = translate(&cursor, Ok(WatchEvent::Added(pod("1042")))).unwrap();
        assert_eq!(event.unseal_candidate(), Some("10.0.0.6"));
        assert_eq!(*cursor.lock().unwrap(), "1042");
    }

    #[test]
    fn test_translate_modified_and_deleted() {
        let cursor = Mutex::new("0".to_string());
        let modified = translate(&cursor, Ok(WatchEvent::Modified(pod("7")))).unwrap();
        assert_eq!(modified.kind(), "modified");
        let deleted = translate(&cursor, Ok(WatchEvent::Deleted(pod("8")))).unwrap();
        assert_eq!(deleted.kind(), "deleted");
        assert_eq!(*cursor.lock().unwrap(), "8");
    }

    #[test]
    fn test_translate_decode_error() {
        let cursor = Mutex::new("55".to_string());
        let serde_err = serde_json::from_str::<Pod>("{not json").unwrap_err();
        let result = translate(&cursor, Err(kube::Error::SerdeError(serde_err)));
        assert!(matches!(result, Err(ClusterError::Decode(_))));
        // Cursor untouched by failures
        assert_eq!(*cursor.lock().unwrap(), "55");
    }

    fn watch_error(code: u16, reason: &str) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".into(),
            message: format!("watch failed: {reason}"),
            reason: reason.into(),
            code,
        }
    }

    #[test]
    fn test_translate_gone_resets_cursor() {
        let cursor = Mutex::new("1042".to_string());
        let event = translate(&cursor, Ok(WatchEvent::Error(watch_error(410, "Expired")))).unwrap();
        assert!(matches!(event, MemberEvent::Expired));
        assert_eq!(*cursor.lock().unwrap(), INITIAL_RESOURCE_VERSION);
    }

    #[test]
    fn test_translate_bookmark_advances_cursor() {
        let cursor = Mutex::new("1042".to_string());
        let bookmark: Bookmark = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "resourceVersion": "2001" }
        }))
        .unwrap();
        let event = translate(&cursor, Ok(WatchEvent::Bookmark(bookmark))).unwrap();
        assert!(matches!(event, MemberEvent::Bookmark));
        assert_eq!(*cursor.lock().unwrap(), "2001");
    }

    #[test]
    fn test_translate_other_status_is_an_error() {
        let cursor = Mutex::new("1042".to_string());
        let result = translate(&cursor, Ok(WatchEvent::Error(watch_error(500, "InternalError"))));
        match result {
            Err(ClusterError::WatchStatus { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "watch failed: InternalError");
            }
            other => panic!("expected WatchStatus, got {other:?}"),
        }
        assert_eq!(*cursor.lock().unwrap(), "1042");
    }
}
