//! Per-call state carried through the refresh pipeline

use dispatch::ApiRequest;

/// Per-call options set by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Opt out of both retry-after-refresh and the login redirect.
    ///
    /// Used by speculative or background calls that should fail silently.
    pub skip_auth_redirect: bool,
}

impl CallOptions {
    pub fn skip_auth_redirect() -> Self {
        Self {
            skip_auth_redirect: true,
        }
    }
}

/// Snapshot of an in-flight call plus its one-shot retry marker.
///
/// The snapshot is taken before any credential is stamped, so a replay starts
/// from the caller's original headers and picks up the new token afresh.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    request: ApiRequest,
    options: CallOptions,
    retried: bool,
}

impl PendingRequest {
    pub fn new(request: ApiRequest, options: CallOptions) -> Self {
        Self {
            request,
            options,
            retried: false,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn is_exempt(&self) -> bool {
        self.options.skip_auth_redirect
    }

    pub fn has_retried(&self) -> bool {
        self.retried
    }

    /// Set the retry marker. Returns `false` if it was already set.
    pub(crate) fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }
}
