//! API client: the attach -> dispatch -> route -> recover -> replay loop

use std::sync::Arc;

use common::Secret;
use dispatch::{ApiRequest, ApiResponse, Dispatcher};
use serde::de::DeserializeOwned;
use session_auth::CredentialStore;
use tracing::{debug, instrument, warn};

use crate::attach::{attach, stamp};
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::navigator::Navigator;
use crate::pending::{CallOptions, PendingRequest};
use crate::router::{RejectReason, Route, route};

/// Generate a request ID for log correlation.
fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

/// Bearer-authenticated client shared by every caller in the process.
///
/// Construct once and share via `Arc`; the refresh coordinator inside only
/// deduplicates refreshes among calls made through the same instance.
pub struct ApiClient {
    dispatcher: Arc<dyn Dispatcher>,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(store.clone(), dispatcher.clone(), navigator, login_path);
        Self {
            dispatcher,
            store,
            coordinator,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send a request through the full pipeline.
    ///
    /// Any non-401 response (including other error statuses) is returned
    /// as-is. A 401 is recovered through the coordinator at most once per
    /// call; exempt calls and rejected replays surface as `Unauthorized`.
    /// A rejected replay also ends the session.
    #[instrument(
        name = "api_call",
        skip_all,
        fields(
            request_id = %request_id(),
            dispatcher = self.dispatcher.id(),
            method = %request.method,
            path = %request.path,
        )
    )]
    pub async fn send(&self, request: ApiRequest, options: CallOptions) -> Result<ApiResponse> {
        let mut pending = PendingRequest::new(request, options);
        let mut replay_token: Option<Secret<String>> = None;

        loop {
            let mut attempt = pending.request().clone();
            let authenticated = match &replay_token {
                Some(token) => stamp(&mut attempt.headers, token),
                None => attach(&self.store, &mut attempt.headers),
            };

            let response = self.dispatcher.dispatch(&attempt).await?;
            debug!(
                status = response.status.as_u16(),
                authenticated,
                replay = pending.has_retried(),
                "call completed"
            );

            match route(&response, &mut pending) {
                Route::Deliver => return Ok(response),
                Route::Reject(reason) => {
                    warn!(?reason, "authorization failure not recoverable");
                    if let (RejectReason::AlreadyRetried, Some(token)) = (reason, &replay_token) {
                        self.coordinator.terminate(token).await;
                    }
                    let request = pending.request();
                    return Err(Error::Unauthorized {
                        method: request.method.clone(),
                        path: request.path.clone(),
                    });
                }
                Route::Refresh => {
                    let token = self.coordinator.recover(!pending.is_exempt()).await?;
                    metrics::counter!("auth_replays_total").increment(1);
                    replay_token = Some(token);
                }
            }
        }
    }

    pub async fn get(&self, path: &str, options: CallOptions) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path), options).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        options: CallOptions,
    ) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path, body), options).await
    }

    /// GET a path and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, options: CallOptions) -> Result<T> {
        let response = self.get(path, options).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                body: response.text(),
            });
        }
        response.json().map_err(|e| Error::Decode(e.to_string()))
    }
}
