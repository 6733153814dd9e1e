//! # Constants
//!
//! Default values shared across the controller.

/// Default reconciliation interval (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Key refresh runs every `KEY_REFRESH_MULTIPLIER` reconciliation intervals
pub const KEY_REFRESH_MULTIPLIER: u32 = 12;

/// Request timeout for the client that fetches unseal shares from the active service
pub const KEY_FETCH_TIMEOUT_SECS: u64 = 60;

/// Request timeout for the per-member unseal client
pub const UNSEAL_REQUEST_TIMEOUT_SECS: u64 = 20;

/// How long in-flight tasks get to finish after a termination signal
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Capacity of the queue between the member watcher and the unseal worker
pub const DEFAULT_UNSEAL_QUEUE_CAPACITY: usize = 64;

/// Watch restart backoff bounds (seconds)
pub const WATCH_RESTART_MIN_BACKOFF_SECS: u64 = 1;
pub const WATCH_RESTART_MAX_BACKOFF_SECS: u64 = 30;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Service account token mounted into every pod
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Vault defaults
pub const DEFAULT_VAULT_SCHEME: &str = "https";
pub const DEFAULT_VAULT_PORT: u16 = 8200;
pub const DEFAULT_VAULT_NAMESPACE: &str = "vault";
pub const DEFAULT_VAULT_ROLE: &str = "internal";
pub const DEFAULT_VAULT_ACTIVE_SERVICE: &str = "vault-active";
pub const DEFAULT_VAULT_HEADLESS_SERVICE: &str = "vault-internal";
pub const DEFAULT_VAULT_SERVER_POD_LABELS: &str =
    "app.kubernetes.io/instance=vault,component=server";
pub const DEFAULT_UNSEAL_MOUNT: &str = "internal";
pub const DEFAULT_UNSEAL_PATH: &str = "unseal";

/// HTTP server defaults
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Pod phase that makes a member eligible for unsealing from a watch event
pub const POD_PHASE_RUNNING: &str = "Running";
