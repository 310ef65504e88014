//! Credential attacher: stamps the bearer header on outbound requests

use common::Secret;
use dispatch::{AUTHORIZATION, HeaderMap, HeaderValue};
use session_auth::CredentialStore;
use tracing::warn;

/// Stamp the store's current access credential, if any.
///
/// Returns whether the request ended up authenticated. Without a credential
/// any `Authorization` header is removed so the call goes out anonymous.
pub fn attach(store: &CredentialStore, headers: &mut HeaderMap) -> bool {
    match store.access_token() {
        Some(token) => stamp(headers, &token),
        None => {
            headers.remove(AUTHORIZATION);
            false
        }
    }
}

/// Stamp an explicit access credential (used when replaying after a refresh).
pub fn stamp(headers: &mut HeaderMap, token: &Secret<String>) -> bool {
    match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            true
        }
        Err(_) => {
            warn!("access token is not a valid header value, sending unauthenticated");
            headers.remove(AUTHORIZATION);
            false
        }
    }
}
