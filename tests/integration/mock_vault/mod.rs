//! Mock Vault server
//!
//! A lightweight Axum-based HTTP server implementing the parts of the Vault
//! API the controller uses: Kubernetes login, KV v2 reads, seal status and
//! unseal.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const ROLE: &str = "internal";
pub const JWT: &str = "test-jwt";
pub const CLIENT_TOKEN: &str = "s.mock-client-token";

#[derive(Debug)]
pub struct MockVaultState {
    pub initialized: bool,
    pub sealed: bool,
    pub shares: u32,
    pub threshold: u32,
    pub accepted: HashSet<String>,
    pub valid_shares: HashSet<String>,
    /// KV v2 documents keyed by `<mount>/<path>`
    pub documents: HashMap<String, serde_json::Value>,
    pub unseal_requests: usize,
}

pub type SharedState = Arc<Mutex<MockVaultState>>;

impl MockVaultState {
    pub fn sealed(threshold: u32, valid_shares: &[&str]) -> Self {
        Self {
            initialized: true,
            sealed: true,
            shares: u32::try_from(valid_shares.len()).unwrap(),
            threshold,
            accepted: HashSet::new(),
            valid_shares: valid_shares.iter().map(|s| (*s).to_string()).collect(),
            documents: HashMap::new(),
            unseal_requests: 0,
        }
    }

    fn status_body(&self) -> serde_json::Value {
        json!({
            "type": "shamir",
            "initialized": self.initialized,
            "sealed": self.sealed,
            "t": self.threshold,
            "n": self.shares,
            "progress": self.accepted.len(),
            "nonce": "",
            "version": "1.15.2",
            "storage_type": "raft"
        })
    }
}

fn vault_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errors": [message] }))).into_response()
}

#[derive(Deserialize)]
struct LoginRequest {
    role: String,
    jwt: String,
}

#[derive(Deserialize)]
struct UnsealRequest {
    key: String,
}

async fn login(Json(request): Json<LoginRequest>) -> Response {
    if request.role != ROLE || request.jwt != JWT {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    Json(json!({
        "request_id": "6ad4fd5a",
        "auth": {
            "client_token": CLIENT_TOKEN,
            "policies": ["default", "unseal"],
            "lease_duration": 3600,
            "renewable": true
        }
    }))
    .into_response()
}

async fn read_kv(
    State(state): State<SharedState>,
    Path((mount, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let token = headers.get("X-Vault-Token").and_then(|v| v.to_str().ok());
    if token != Some(CLIENT_TOKEN) {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    let state = state.lock().unwrap();
    match state.documents.get(&format!("{mount}/{path}")) {
        Some(document) => Json(json!({
            "data": {
                "data": document,
                "metadata": { "version": 1, "destroyed": false }
            }
        }))
        .into_response(),
        None => vault_error(StatusCode::NOT_FOUND, ""),
    }
}

async fn seal_status(State(state): State<SharedState>) -> Response {
    Json(state.lock().unwrap().status_body()).into_response()
}

async fn unseal(State(state): State<SharedState>, Json(request): Json<UnsealRequest>) -> Response {
    let mut state = state.lock().unwrap();
    state.unseal_requests += 1;
    if !state.sealed {
        return Json(state.status_body()).into_response();
    }
    if !state.valid_shares.contains(&request.key) {
        return vault_error(
            StatusCode::BAD_REQUEST,
            "'key' must be a valid hex or base64 string",
        );
    }
    state.accepted.insert(request.key);
    if state.accepted.len() >= state.threshold as usize {
        state.sealed = false;
        state.accepted.clear();
    }
    Json(state.status_body()).into_response()
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/auth/kubernetes/login", post(login))
        .route("/v1/{mount}/data/{path}", get(read_kv))
        .route("/v1/sys/seal-status", get(seal_status))
        .route("/v1/sys/unseal", put(unseal))
        .with_state(state)
}

/// Start the mock on an ephemeral localhost port
pub async fn start(state: MockVaultState) -> (SocketAddr, SharedState) {
    let shared = Arc::new(Mutex::new(state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::clone(&shared));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, shared)
}
