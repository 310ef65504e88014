//! Session bootstrapper
//!
//! Resolves "who is signed in" once at startup. The identity lookup goes
//! through the regular client pipeline, so an expired access token is
//! refreshed like on any other call. Whatever happens, the session ends up
//! bootstrapped: either holding an identity or logged out with an empty
//! credential store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use session_auth::{IDENTITY_PATH, Identity};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::Result;
use crate::pending::CallOptions;

pub struct Session {
    client: Arc<ApiClient>,
    identity: RwLock<Option<Identity>>,
    bootstrapped: AtomicBool,
}

impl Session {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            identity: RwLock::new(None),
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Look up the current identity if an access credential is stored.
    ///
    /// Any failure (including an unrecoverable 401) clears the stored
    /// credentials and leaves the session logged out.
    pub async fn bootstrap(&self) -> Option<Identity> {
        if self.client.store().access_token().is_none() {
            info!("no access credential, starting logged out");
            self.set_identity(None);
            self.bootstrapped.store(true, Ordering::Release);
            return None;
        }
        self.resolve().await.ok()
    }

    /// Import a freshly issued credential pair and resolve its identity.
    pub async fn login(&self, access: &str, refresh: Option<&str>) -> Result<Identity> {
        self.client.store().replace(access, refresh).await?;
        self.resolve().await
    }

    /// Forget the identity and both credentials.
    pub async fn logout(&self) -> Result<()> {
        self.set_identity(None);
        self.client.store().clear().await?;
        info!("logged out");
        Ok(())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    async fn resolve(&self) -> Result<Identity> {
        let result = self
            .client
            .get_json::<serde_json::Value>(IDENTITY_PATH, CallOptions::default())
            .await
            .map(Identity::from_response);

        match &result {
            Ok(identity) => {
                info!(
                    user_id = identity.id().as_deref().unwrap_or("unknown"),
                    user = identity.display_name().unwrap_or("unknown"),
                    "session resolved"
                );
                self.set_identity(Some(identity.clone()));
            }
            Err(e) => {
                warn!(error = %e, "identity lookup failed, clearing session");
                self.set_identity(None);
                if let Err(e) = self.client.store().clear().await {
                    warn!(error = %e, "failed to persist cleared credentials");
                }
            }
        }
        self.bootstrapped.store(true, Ordering::Release);
        result
    }

    fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }
}
