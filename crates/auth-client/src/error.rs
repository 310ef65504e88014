//! Errors surfaced to callers of the API client

use dispatch::{Method, StatusCode};

/// Why a call failed.
///
/// Authorization outcomes are split by cause: `Unauthorized` is a 401 that
/// was not (or could no longer be) recovered, the `Refresh*` variants and
/// `NoRefreshCredential` mean the session itself is gone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unauthorized: {method} {path}")]
    Unauthorized { method: Method, path: String },

    #[error("no refresh credential available")]
    NoRefreshCredential,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token refresh abandoned before it completed")]
    RefreshAbandoned,

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Dispatch(#[from] dispatch::Error),

    #[error("credential store error: {0}")]
    Credential(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Whether this failure means the caller is not (or no longer) signed in.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized { .. }
                | Error::NoRefreshCredential
                | Error::RefreshFailed(_)
                | Error::RefreshAbandoned
        )
    }
}

impl From<session_auth::Error> for Error {
    fn from(err: session_auth::Error) -> Self {
        Error::Credential(err.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
