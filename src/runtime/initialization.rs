//! # Initialization
//!
//! Controller initialization: rustls setup, configuration, tracing, metrics,
//! server startup, Kubernetes client setup and component composition.

use crate::cluster::{ClusterApi, KubeCluster};
use crate::config::Config;
use crate::constants;
use crate::controller::queue::UnsealRequest;
use crate::controller::server::{start_server, ServerState};
use crate::controller::{MemberWatcher, UnsealQueue};
use crate::observability;
use crate::unseal::UnsealCoordinator;
use crate::vault::HttpConnector;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Initialization result containing all necessary components for the controller
#[derive(Debug)]
pub struct InitializationResult {
    pub config: Arc<Config>,
    pub coordinator: Arc<UnsealCoordinator>,
    pub watcher: MemberWatcher,
    /// Receiving half of the watcher's unseal queue
    pub unseal_requests: mpsc::Receiver<UnsealRequest>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub server_handle: JoinHandle<()>,
    /// Process-wide shutdown token
    pub cancel: CancellationToken,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Configuration loading
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Coordinator, queue and watcher composition
pub async fn initialize(config_path: &Path) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    let provider_preinstalled = rustls::crypto::ring::default_provider()
        .install_default()
        .is_err();

    let config = Arc::new(
        Config::load(config_path)
            .with_context(|| format!("failed to load configuration from {}", config_path.display()))?,
    );

    observability::logging::init_tracing(&config.log_level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %chrono::Utc::now().to_rfc3339(),
        "Starting Vault auto-unseal controller"
    );
    if provider_preinstalled {
        debug!("rustls crypto provider was already installed");
    }
    debug!(config = ?config, "effective configuration");

    observability::metrics::register_metrics()?;

    let cancel = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());
    let addr = config.http.socket_addr()?;
    let route_prefix = config.http.normalized_prefix();
    let server_handle = {
        let state = Arc::clone(&server_state);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(addr, route_prefix, state, cancel).await {
                error!(error = %e, "HTTP server error");
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle).await?;

    let cluster: Arc<dyn ClusterApi> = Arc::new(
        KubeCluster::connect(&config)
            .await
            .context("failed to create Kubernetes client")?,
    );
    log_vault_services(cluster.as_ref(), &config).await;

    let coordinator = Arc::new(UnsealCoordinator::new(
        Arc::clone(&config),
        Arc::clone(&cluster),
        Arc::new(HttpConnector),
    ));
    let (queue, unseal_requests) = UnsealQueue::new(config.queue_capacity);
    let watcher = MemberWatcher::new(cluster, queue);

    info!(
        namespace = %config.k8s.namespace,
        selector = %config.k8s.vault_server_pod_labels,
        interval_secs = config.interval,
        "Controller initialized"
    );

    Ok(InitializationResult {
        config,
        coordinator,
        watcher,
        unseal_requests,
        server_state,
        server_handle,
        cancel,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
) -> Result<()> {
    let startup_timeout =
        std::time::Duration::from_secs(constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval =
        std::time::Duration::from_millis(constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log the active and headless services the controller talks to
async fn log_vault_services(cluster: &dyn ClusterApi, config: &Config) {
    let settings = &config.k8s;
    for (role, name) in [
        ("active", &settings.vault_active_service),
        ("headless", &settings.vault_headless_service),
    ] {
        match cluster.get_service(name).await {
            Ok(service) => info!(
                role,
                service = %service.name,
                cluster_ip = service.cluster_ip.as_deref().unwrap_or("None"),
                ports = ?service.ports,
                "vault service"
            ),
            Err(e) => warn!(role, service = %name, error = %e, "failed to look up vault service"),
        }
    }
}
