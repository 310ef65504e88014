//! In-memory backend for exercising the refresh pipeline deterministically.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dispatch::{ApiRequest, ApiResponse, Dispatcher, StatusCode};
use serde_json::json;
use session_auth::{CredentialStore, IDENTITY_PATH, REFRESH_PATH, StoredTokens};
use tokio::sync::Notify;

use crate::client::ApiClient;
use crate::navigator::RecordingNavigator;

/// What the refresh endpoint answers.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    Issue {
        access: String,
        refresh: Option<String>,
    },
    Status(StatusCode),
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Scripted backend: protected paths accept only bearer tokens in `accepted`,
/// the refresh endpoint answers with `reply`, optionally held behind a gate
/// until the test releases it.
pub struct ScriptedBackend {
    accepted: Mutex<HashSet<String>>,
    reply: Mutex<RefreshReply>,
    gate: Option<Notify>,
    identity_status: Option<StatusCode>,
    refresh_calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            accepted: Mutex::new(HashSet::new()),
            reply: Mutex::new(RefreshReply::Status(StatusCode::UNAUTHORIZED)),
            gate: None,
            identity_status: None,
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn accept(self, token: &str) -> Self {
        self.accepted.lock().unwrap().insert(token.to_string());
        self
    }

    pub fn refresh_issues(self, access: &str, refresh: Option<&str>) -> Self {
        self.set_reply(RefreshReply::Issue {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
        });
        self
    }

    pub fn refresh_fails(self, status: StatusCode) -> Self {
        self.set_reply(RefreshReply::Status(status));
        self
    }

    /// Hold every refresh response until `release_refresh` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    /// Answer authorized identity lookups with `status` instead of a user.
    pub fn identity_fails(mut self, status: StatusCode) -> Self {
        self.identity_status = Some(status);
        self
    }

    pub fn set_reply(&self, reply: RefreshReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn revoke_all(&self) {
        self.accepted.lock().unwrap().clear();
    }

    pub fn allow(&self, token: &str) {
        self.accepted.lock().unwrap().insert(token.to_string());
    }

    pub fn release_refresh(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.seen()
            .into_iter()
            .filter(|s| s.path == REFRESH_PATH)
            .filter_map(|s| s.body)
            .collect()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Paths of non-refresh requests sent with the given bearer token, in order.
    pub fn paths_sent_with(&self, token: &str) -> Vec<String> {
        let expected = format!("Bearer {token}");
        self.seen()
            .into_iter()
            .filter(|s| s.path != REFRESH_PATH && s.authorization.as_deref() == Some(&expected))
            .map(|s| s.path)
            .collect()
    }

    fn record(&self, request: &ApiRequest) {
        let authorization = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(Seen {
            path: request.path.clone(),
            authorization,
            body: request.body.clone(),
        });
    }

    fn protected(&self, request: &ApiRequest) -> ApiResponse {
        let token = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        let allowed = token
            .as_ref()
            .is_some_and(|t| self.accepted.lock().unwrap().contains(t));
        if !allowed {
            return ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({"error": "invalid or expired token"}),
            );
        }
        if request.path == IDENTITY_PATH {
            if let Some(status) = self.identity_status {
                return ApiResponse::new(status, "identity lookup failed");
            }
            return ApiResponse::json_body(StatusCode::OK, &json!({"id": "u_1", "username": "ada"}));
        }
        if request.path == "/broken" {
            return ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        }
        ApiResponse::json_body(StatusCode::OK, &json!({"path": request.path}))
    }

    fn refresh_response(&self) -> ApiResponse {
        match self.reply.lock().unwrap().clone() {
            RefreshReply::Issue { access, refresh } => {
                let mut body = json!({"accessToken": access});
                if let Some(refresh) = refresh {
                    body["refreshToken"] = json!(refresh);
                }
                ApiResponse::json_body(StatusCode::OK, &body)
            }
            RefreshReply::Status(status) => ApiResponse::json_body(
                status,
                &json!({"error": "refresh rejected"}),
            ),
        }
    }
}

impl Dispatcher for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn dispatch<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = dispatch::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.record(request);
            if request.path != REFRESH_PATH {
                return Ok(self.protected(request));
            }
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.refresh_response())
        })
    }
}

/// Client over `backend` with an ephemeral store seeded with the given pair.
pub fn client_with(
    backend: Arc<ScriptedBackend>,
    access: Option<&str>,
    refresh: Option<&str>,
) -> (Arc<ApiClient>, Arc<RecordingNavigator>) {
    let store = Arc::new(CredentialStore::ephemeral(StoredTokens {
        access: access.map(str::to_string),
        refresh: refresh.map(str::to_string),
    }));
    let navigator = Arc::new(RecordingNavigator::new());
    let client = ApiClient::new(backend, store, navigator.clone(), "/login");
    (Arc::new(client), navigator)
}

/// Yield until `n` callers are parked behind the in-flight refresh.
pub async fn wait_for_waiters(client: &ApiClient, n: usize) {
    for _ in 0..10_000 {
        if client.coordinator().waiting() == n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {n} waiters, found {}",
        client.coordinator().waiting()
    );
}
