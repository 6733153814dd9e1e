//! Shared test doubles: an in-memory cluster and Vault, and a connector that
//! hands out the Vault for a given host.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use autounseal::cluster::{
    ClusterApi, ClusterError, Member, MemberEvent, MemberEventStream, ServiceInfo,
};
use autounseal::config::{Config, Redacted};
use autounseal::vault::{AuthInfo, ClientSettings, SealStatus, SecretStore, StoreConnector, VaultError};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zeroize::Zeroizing;

pub const ACTIVE_SERVICE: &str = "vault-active";

/// Controller config for tests: out-of-cluster with an explicit token
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.in_cluster = false;
    config.token = Redacted::new("test-jwt");
    config.k8s.vault_scheme = "http".to_string();
    config.k8s.vault_active_service = ACTIVE_SERVICE.to_string();
    config
}

pub fn running(name: &str, ip: &str) -> Member {
    Member {
        name: name.to_string(),
        address: Some(ip.to_string()),
        phase: Some("Running".to_string()),
    }
}

pub fn pending(name: &str, ip: Option<&str>) -> Member {
    Member {
        name: name.to_string(),
        address: ip.map(str::to_string),
        phase: Some("Pending".to_string()),
    }
}

pub fn shares(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Call log shared between stores, entries are `<host> <operation>`
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct VaultState {
    initialized: bool,
    sealed: bool,
    shares: u32,
    threshold: u32,
    accepted: HashSet<String>,
    /// Shares Vault accepts; `None` accepts anything
    valid: Option<HashSet<String>>,
    /// Number of upcoming submissions that are silently dropped
    forget_next: usize,
    /// 1-based index of a single submission that is silently dropped
    drop_nth: Option<usize>,
    submissions: Vec<String>,
}

impl VaultState {
    fn status(&self) -> SealStatus {
        SealStatus {
            initialized: self.initialized,
            sealed: self.sealed,
            shares: self.shares,
            threshold: self.threshold,
            progress: u32::try_from(self.accepted.len()).unwrap(),
        }
    }
}

/// In-memory Vault member with Shamir-like progress
#[derive(Debug)]
pub struct MockVault {
    host: String,
    state: Mutex<VaultState>,
    log: CallLog,
    delay: Duration,
    document: Mutex<Result<HashMap<String, String>, u16>>,
    login_status: Mutex<Option<u16>>,
    unreachable: Mutex<bool>,
    logins: AtomicUsize,
}

impl MockVault {
    pub fn sealed(host: &str, shares: u32, threshold: u32) -> Self {
        Self {
            host: host.to_string(),
            state: Mutex::new(VaultState {
                initialized: true,
                sealed: true,
                shares,
                threshold,
                accepted: HashSet::new(),
                valid: None,
                forget_next: 0,
                drop_nth: None,
                submissions: Vec::new(),
            }),
            log: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            document: Mutex::new(Ok(HashMap::new())),
            login_status: Mutex::new(None),
            unreachable: Mutex::new(false),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn unsealed(host: &str) -> Self {
        let vault = Self::sealed(host, 5, 3);
        vault.state.lock().unwrap().sealed = false;
        vault
    }

    pub fn uninitialized(host: &str) -> Self {
        let vault = Self::sealed(host, 0, 0);
        vault.state.lock().unwrap().initialized = false;
        vault
    }

    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Sleep this long inside every call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_valid_shares(self, valid: &[&str]) -> Self {
        self.state.lock().unwrap().valid = Some(valid.iter().map(|s| (*s).to_string()).collect());
        self
    }

    /// Drop the next `count` submissions without recording progress
    #[must_use]
    pub fn forgetting(self, count: usize) -> Self {
        self.state.lock().unwrap().forget_next = count;
        self
    }

    /// Drop only the `nth` submission (1-based) without recording progress
    #[must_use]
    pub fn dropping_submission(self, nth: usize) -> Self {
        self.state.lock().unwrap().drop_nth = Some(nth);
        self
    }

    /// Serve this KV document on the active node
    #[must_use]
    pub fn with_document(self, document: HashMap<String, String>) -> Self {
        *self.document.lock().unwrap() = Ok(document);
        self
    }

    pub fn fail_reads(&self, status: u16) {
        *self.document.lock().unwrap() = Err(status);
    }

    pub fn fail_logins(&self, status: u16) {
        *self.login_status.lock().unwrap() = Some(status);
    }

    /// Every call fails as if the member were unreachable
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().unwrap().sealed
    }

    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    async fn enter(&self, operation: &str) -> Result<(), VaultError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {operation}", self.host));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if *self.unreachable.lock().unwrap() {
            return Err(VaultError::Build {
                address: self.host.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn api_error(&self, path: &str, status: u16, message: &str) -> VaultError {
        VaultError::Api {
            url: format!("http://{}:8200/v1/{path}", self.host),
            status,
            errors: vec![message.to_string()],
        }
    }
}

#[async_trait]
impl SecretStore for MockVault {
    async fn login(&self, role: &str, jwt: &str) -> Result<AuthInfo, VaultError> {
        self.enter("login").await?;
        self.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.login_status.lock().unwrap() {
            return Err(self.api_error("auth/kubernetes/login", status, "permission denied"));
        }
        assert!(!jwt.is_empty(), "login without a jwt");
        Ok(AuthInfo {
            client_token: Zeroizing::new(format!("s.{role}")),
            policies: vec!["unseal".to_string()],
            lease_duration: 3600,
            renewable: true,
        })
    }

    async fn read_secret(
        &self,
        mount: &str,
        path: &str,
    ) -> Result<HashMap<String, String>, VaultError> {
        self.enter("read_secret").await?;
        let document = self.document.lock().unwrap().clone();
        document.map_err(|status| {
            self.api_error(&format!("{mount}/data/{path}"), status, "permission denied")
        })
    }

    async fn seal_status(&self) -> Result<SealStatus, VaultError> {
        self.enter("seal_status").await?;
        Ok(self.state.lock().unwrap().status())
    }

    async fn submit_unseal_share(&self, share: &str) -> Result<SealStatus, VaultError> {
        self.enter("submit").await?;
        let mut state = self.state.lock().unwrap();
        state.submissions.push(share.to_string());
        if !state.sealed {
            return Ok(state.status());
        }
        if let Some(valid) = &state.valid {
            if !valid.contains(share) {
                return Err(self.api_error("sys/unseal", 400, "invalid key"));
            }
        }
        if state.forget_next > 0 {
            state.forget_next -= 1;
            return Ok(state.status());
        }
        if state.drop_nth == Some(state.submissions.len()) {
            return Ok(state.status());
        }
        state.accepted.insert(share.to_string());
        if state.accepted.len() >= state.threshold as usize {
            state.sealed = false;
            state.accepted.clear();
        }
        Ok(state.status())
    }
}

/// Hands out the mock Vault registered for the requested host
#[derive(Debug, Default)]
pub struct MockConnector {
    stores: Mutex<HashMap<String, Arc<MockVault>>>,
    connections: Mutex<Vec<ClientSettings>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, vault: &Arc<MockVault>) {
        self.stores
            .lock()
            .unwrap()
            .insert(vault.host.clone(), Arc::clone(vault));
    }

    pub fn connections(&self) -> Vec<ClientSettings> {
        self.connections.lock().unwrap().clone()
    }
}

impl StoreConnector for MockConnector {
    fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn SecretStore>, VaultError> {
        self.connections.lock().unwrap().push(settings.clone());
        match self.stores.lock().unwrap().get(&settings.host) {
            Some(vault) => Ok(Arc::clone(vault) as Arc<dyn SecretStore>),
            None => Err(VaultError::Build {
                address: settings.address(),
                message: "no such host".to_string(),
            }),
        }
    }
}

/// One scripted watch subscription
pub type WatchSession = Result<Vec<Result<MemberEvent, ClusterError>>, ClusterError>;

/// In-memory cluster with scripted watch sessions
///
/// Once the scripted sessions run out, `watch_members` returns a stream that
/// never yields.
#[derive(Default)]
pub struct MockCluster {
    members: Mutex<Vec<Member>>,
    sessions: Mutex<VecDeque<WatchSession>>,
    watch_calls: AtomicUsize,
    list_calls: AtomicUsize,
    token: Option<String>,
}

impl std::fmt::Debug for MockCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCluster").finish_non_exhaustive()
    }
}

impl MockCluster {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members: Mutex::new(members),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sessions(self, sessions: Vec<WatchSession>) -> Self {
        *self.sessions.lock().unwrap() = sessions.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_members(&self) -> Result<Vec<Member>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.lock().unwrap().clone())
    }

    async fn get_service(&self, name: &str) -> Result<ServiceInfo, ClusterError> {
        Ok(ServiceInfo {
            name: name.to_string(),
            cluster_ip: Some("10.96.0.10".to_string()),
            ports: vec![8200, 8201],
        })
    }

    async fn watch_members(&self) -> Result<MemberEventStream, ClusterError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(Ok(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(Err(e)) => Err(e),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    fn token(&self) -> Option<Zeroizing<String>> {
        self.token.clone().map(Zeroizing::new)
    }

    fn ca_data(&self) -> Option<Vec<u8>> {
        None
    }
}
