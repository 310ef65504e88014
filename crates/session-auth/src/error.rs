//! Error types for credential storage and token endpoint calls

/// Errors from credential persistence and the auth wire contracts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("refresh credential rejected: {0}")]
    InvalidCredentials(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session auth operations.
pub type Result<T> = std::result::Result<T, Error>;
