//! Single-flight refresh coordinator
//!
//! States: `Idle` and `Refreshing`. The first caller to report a 401 while
//! idle becomes the leader of a refresh episode and performs the one refresh
//! call; every caller that arrives while the episode is in flight is parked
//! on a oneshot channel in FIFO order. When the refresh settles, the waiting
//! list is drained and the flag reset in a single critical section, so no
//! caller can observe `Idle` with parked waiters or join an episode that has
//! already released its queue.
//!
//! The runtime is multi-threaded, so the Idle -> Refreshing check-and-set is
//! guarded by a mutex. The mutex is synchronous and never held across an
//! `.await`.
//!
//! Outcomes:
//! - refresh succeeds: new tokens stored, every caller gets the new access token
//! - refresh fails or no refresh credential: store cleared, every caller gets
//!   the error, the navigator is signalled once (unless the leader is exempt)
//! - leader dropped mid-refresh: every waiter gets `RefreshAbandoned`,
//!   credentials untouched
//!
//! A replay that is rejected even with the refreshed token ends the session
//! through `terminate`, so the coordinator remains the only writer that
//! clears credentials on an authorization failure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use dispatch::Dispatcher;
use session_auth::CredentialStore;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::navigator::Navigator;

/// Cloneable outcome handed to every caller of an episode.
#[derive(Debug, Clone)]
enum RefreshFailure {
    NoRefreshCredential,
    Rejected(String),
    Abandoned,
}

impl RefreshFailure {
    fn label(&self) -> &'static str {
        match self {
            RefreshFailure::NoRefreshCredential => "no_refresh_credential",
            RefreshFailure::Rejected(_) => "failure",
            RefreshFailure::Abandoned => "abandoned",
        }
    }
}

impl From<RefreshFailure> for Error {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoRefreshCredential => Error::NoRefreshCredential,
            RefreshFailure::Rejected(msg) => Error::RefreshFailed(msg),
            RefreshFailure::Abandoned => Error::RefreshAbandoned,
        }
    }
}

type Outcome = std::result::Result<Secret<String>, RefreshFailure>;

/// Flag plus waiting list. `waiters` is only non-empty while `refreshing`.
#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

/// Coordinates token refresh across every call made through one client.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    dispatcher: Arc<dyn Dispatcher>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        dispatcher: Arc<dyn Dispatcher>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            navigator,
            login_path: login_path.into(),
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Recover from an authorization failure.
    ///
    /// Returns the access token to replay with. Joins the in-flight episode if
    /// there is one, otherwise leads a new one. `redirect_on_failure` is the
    /// caller's answer to "may a failure navigate to the login page"; only the
    /// leader's answer matters since only the leader navigates.
    pub async fn recover(&self, redirect_on_failure: bool) -> Result<Secret<String>> {
        let parked = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                debug!(position = state.waiters.len(), "refresh in flight, waiting");
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = parked {
            return match rx.await {
                Ok(outcome) => outcome.map_err(Error::from),
                Err(_) => Err(Error::RefreshAbandoned),
            };
        }

        let mut episode = Episode {
            coordinator: self,
            settled: false,
        };
        let outcome = self.run_refresh().await;
        episode.settle(outcome.clone());

        if let Err(failure) = &outcome {
            if redirect_on_failure {
                self.navigator.navigate(&self.login_path);
            } else {
                debug!(reason = failure.label(), "refresh failed for exempt caller, not redirecting");
            }
        }
        outcome.map_err(Error::from)
    }

    /// Whether a refresh episode is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Number of callers parked behind the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// End the session after a replay carrying `rejected` was refused again.
    ///
    /// Clears the store and navigates to the login page, unless the store
    /// has already moved on from `rejected` (another call ended the session
    /// first, or a later episode issued a newer token).
    pub async fn terminate(&self, rejected: &Secret<String>) {
        let ended = match self.store.clear_if_access(rejected.expose()).await {
            Ok(ended) => ended,
            Err(e) => {
                warn!(error = %e, "failed to persist cleared credentials");
                true
            }
        };
        if ended {
            warn!("refreshed access token rejected, ending session");
            metrics::counter!("auth_sessions_ended_total").increment(1);
            self.navigator.navigate(&self.login_path);
        } else {
            debug!("rejected token already replaced, leaving session as is");
        }
    }

    /// The leader's half of an episode: exactly one refresh call.
    async fn run_refresh(&self) -> Outcome {
        let Some(refresh) = self.store.refresh_token() else {
            warn!("no refresh credential, ending session");
            self.clear_credentials().await;
            return Err(RefreshFailure::NoRefreshCredential);
        };

        info!("access token rejected, refreshing");
        match session_auth::refresh_tokens(self.dispatcher.as_ref(), refresh.expose()).await {
            Ok(tokens) => {
                if let Err(e) = self
                    .store
                    .update_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
                    .await
                {
                    warn!(error = %e, "failed to persist refreshed tokens");
                }
                info!(
                    rotated_refresh = tokens.refresh_token.is_some(),
                    "token refresh succeeded"
                );
                Ok(Secret::new(tokens.access_token))
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                self.clear_credentials().await;
                Err(RefreshFailure::Rejected(e.to_string()))
            }
        }
    }

    async fn clear_credentials(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to persist cleared credentials");
        }
    }

    /// Drain the waiting list and return to `Idle` in one critical section.
    fn release(&self, outcome: Outcome) {
        let mut state = self.lock_state();
        let waiters = std::mem::take(&mut state.waiters);
        let released = waiters.len();
        for waiter in waiters {
            // Receiver is gone only if that caller's task was dropped
            let _ = waiter.send(outcome.clone());
        }
        state.refreshing = false;
        drop(state);

        let label = match &outcome {
            Ok(_) => "success",
            Err(failure) => failure.label(),
        };
        metrics::counter!("auth_refresh_total", "outcome" => label).increment(1);
        metrics::histogram!("auth_refresh_waiters").record(released as f64);
        debug!(released, outcome = label, "refresh episode settled");
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard owned by the episode leader. Dropping it unsettled (the leader's
/// future was cancelled) releases the waiters with `Abandoned`.
struct Episode<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Episode<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for Episode<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh leader dropped before completion, releasing waiters");
            self.coordinator.release(Err(RefreshFailure::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::RecordingNavigator;
    use crate::test_support::ScriptedBackend;
    use dispatch::StatusCode;
    use session_auth::StoredTokens;

    fn coordinator(
        backend: Arc<ScriptedBackend>,
        access: Option<&str>,
        refresh: Option<&str>,
    ) -> (Arc<RefreshCoordinator>, Arc<CredentialStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(CredentialStore::ephemeral(StoredTokens {
            access: access.map(str::to_string),
            refresh: refresh.map(str::to_string),
        }));
        let navigator = Arc::new(RecordingNavigator::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            backend,
            navigator.clone(),
            "/login",
        ));
        (coordinator, store, navigator)
    }

    async fn wait_for(coordinator: &RefreshCoordinator, n: usize) {
        for _ in 0..10_000 {
            if coordinator.waiting() == n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} waiters, found {}", coordinator.waiting());
    }

    #[tokio::test]
    async fn success_stores_tokens_and_returns_new_access() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", Some("R1")));
        let (coordinator, store, navigator) = coordinator(backend.clone(), Some("A0"), Some("R0"));

        let token = coordinator.recover(true).await.unwrap();

        assert_eq!(token.expose(), "A1");
        assert_eq!(store.access_token().unwrap().expose(), "A1");
        assert_eq!(store.refresh_token().unwrap().expose(), "R1");
        assert_eq!(backend.refresh_calls(), 1);
        assert!(navigator.visits().is_empty());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn missing_refresh_credential_clears_and_redirects_without_calling() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", None));
        let (coordinator, store, navigator) = coordinator(backend.clone(), Some("A0"), None);

        let err = coordinator.recover(true).await.unwrap_err();

        assert!(matches!(err, Error::NoRefreshCredential), "got: {err:?}");
        assert_eq!(backend.refresh_calls(), 0);
        assert!(!store.has_credentials());
        assert_eq!(navigator.visits(), vec!["/login"]);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn exempt_leader_failure_does_not_redirect() {
        let backend = Arc::new(ScriptedBackend::new().refresh_fails(StatusCode::UNAUTHORIZED));
        let (coordinator, store, navigator) = coordinator(backend, Some("A0"), Some("R0"));

        let err = coordinator.recover(false).await.unwrap_err();

        assert!(matches!(err, Error::RefreshFailed(_)), "got: {err:?}");
        assert!(!store.has_credentials());
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn waiters_are_released_in_enqueue_order() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", None).gated());
        let (coordinator, _store, _navigator) = coordinator(backend.clone(), Some("A0"), Some("R0"));
        let order = Arc::new(Mutex::new(Vec::new()));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(true).await })
        };
        let mut waiters = Vec::new();
        for i in 0..3 {
            let c = coordinator.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let token = c.recover(true).await;
                order.lock().unwrap().push(i);
                token
            }));
            wait_for(&coordinator, i + 1).await;
        }

        backend.release_refresh();
        assert_eq!(leader.await.unwrap().unwrap().expose(), "A1");
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap().expose(), "A1");
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(coordinator.waiting(), 0);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn failure_rejects_every_waiter_and_redirects_once() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .refresh_fails(StatusCode::UNAUTHORIZED)
                .gated(),
        );
        let (coordinator, store, navigator) = coordinator(backend.clone(), Some("A0"), Some("R0"));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move { coordinator.recover(true).await }));
        }
        wait_for(&coordinator, 2).await;
        backend.release_refresh();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::RefreshFailed(_)), "got: {err:?}");
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!store.has_credentials());
        assert_eq!(navigator.visits(), vec!["/login"]);
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters_with_abandoned() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", None).gated());
        let (coordinator, store, navigator) = coordinator(backend.clone(), Some("A0"), Some("R0"));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(true).await })
        };
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(true).await })
        };
        wait_for(&coordinator, 1).await;

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RefreshAbandoned), "got: {err:?}");
        assert!(!coordinator.is_refreshing());
        assert_eq!(store.access_token().unwrap().expose(), "A0");
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn settled_episode_lets_next_failure_start_a_new_one() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", None));
        let (coordinator, store, _navigator) = coordinator(backend.clone(), Some("A0"), Some("R0"));

        coordinator.recover(true).await.unwrap();
        backend.set_reply(crate::test_support::RefreshReply::Issue {
            access: "A2".into(),
            refresh: None,
        });
        let token = coordinator.recover(true).await.unwrap();

        assert_eq!(token.expose(), "A2");
        assert_eq!(store.access_token().unwrap().expose(), "A2");
        assert_eq!(backend.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn failed_persist_still_resolves_with_new_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");
        let store = Arc::new(CredentialStore::load(path.clone()).await.unwrap());
        store.replace("A0", Some("R0")).await.unwrap();
        // Pull the directory out from under the store so the next write fails
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();

        let backend = Arc::new(ScriptedBackend::new().refresh_issues("A1", None));
        let navigator = Arc::new(RecordingNavigator::new());
        let coordinator =
            RefreshCoordinator::new(store.clone(), backend, navigator.clone(), "/login");

        let token = coordinator.recover(true).await.unwrap();
        assert_eq!(token.expose(), "A1");
        assert_eq!(store.access_token().unwrap().expose(), "A1");
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn terminate_clears_and_redirects_for_current_token() {
        let backend = Arc::new(ScriptedBackend::new());
        let (coordinator, store, navigator) = coordinator(backend, Some("A1"), Some("R0"));

        coordinator.terminate(&Secret::from("A1")).await;
        coordinator.terminate(&Secret::from("A1")).await;

        assert!(!store.has_credentials());
        assert_eq!(navigator.visits(), vec!["/login"]);
    }

    #[tokio::test]
    async fn terminate_with_superseded_token_keeps_session() {
        let backend = Arc::new(ScriptedBackend::new());
        let (coordinator, store, navigator) = coordinator(backend, Some("A2"), Some("R0"));

        coordinator.terminate(&Secret::from("A1")).await;

        assert_eq!(store.access_token().unwrap().expose(), "A2");
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn padded_refresh_token_is_returned_as_stored() {
        let backend = Arc::new(ScriptedBackend::new().refresh_issues(" A1\n", None));
        let (coordinator, store, _navigator) = coordinator(backend, Some("A0"), Some("R0"));

        let token = coordinator.recover(true).await.unwrap();

        assert_eq!(token.expose(), "A1");
        assert_eq!(store.access_token().unwrap(), token);
    }
}
