//! Token refresh wire contract
//!
//! `POST /api/auth/refresh` with `{ "refreshToken": ... }`. The backend answers
//! with a new access token and, depending on its rotation policy, a new
//! refresh token. Any non-2xx status is a refresh failure.
//!
//! The call goes straight to the dispatcher: it must never pick up a bearer
//! header or be routed back into the refresh coordinator.

use dispatch::{ApiRequest, Dispatcher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::REFRESH_PATH;
use crate::error::{Error, Result};

/// Request body for the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Successful refresh response.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    /// Present only when the backend rotates refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Exchange a refresh credential for a new access credential.
pub async fn refresh_tokens(dispatcher: &dyn Dispatcher, refresh: &str) -> Result<RefreshResponse> {
    let body = serde_json::to_value(RefreshRequest {
        refresh_token: refresh,
    })
    .map_err(|e| Error::InvalidResponse(format!("encoding refresh request: {e}")))?;
    let request = ApiRequest::post(REFRESH_PATH, body);

    let response = dispatcher
        .dispatch(&request)
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status;
    if !status.is_success() {
        let body = response.text();
        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }
        return Err(Error::RefreshFailed(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let mut tokens: RefreshResponse = response
        .json()
        .map_err(|e| Error::InvalidResponse(e.to_string()))?;
    // Normalize here so callers replay exactly what the store keeps
    tokens.access_token = tokens.access_token.trim().to_string();
    tokens.refresh_token = tokens
        .refresh_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if tokens.access_token.is_empty() {
        return Err(Error::InvalidResponse(
            "refresh response carried an empty accessToken".into(),
        ));
    }

    debug!(
        rotated_refresh = tokens.refresh_token.is_some(),
        "refresh endpoint issued new tokens"
    );
    Ok(tokens)
}
