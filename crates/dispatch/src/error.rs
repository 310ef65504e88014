//! Transport error types

/// Errors from a single dispatched call.
///
/// HTTP error statuses are not errors at this layer: a 401 or 500 comes back
/// as an [`ApiResponse`](crate::ApiResponse) and is routed by the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
