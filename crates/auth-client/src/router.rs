//! Failure router: decides what happens to a dispatched call's response

use dispatch::ApiResponse;

use crate::pending::PendingRequest;

/// Routing decision for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not an authorization failure: hand the response to the caller unchanged
    Deliver,
    /// First 401 on a non-exempt call: recover through the refresh coordinator
    Refresh,
    /// 401 that must be surfaced to the caller as-is
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The caller opted out of retry and redirect
    Exempt,
    /// The replay with a fresh credential was rejected too
    AlreadyRetried,
}

/// Route a response. A `Refresh` decision sets the call's retry marker, so a
/// call can be handed to the coordinator at most once.
pub fn route(response: &ApiResponse, pending: &mut PendingRequest) -> Route {
    if !response.is_unauthorized() {
        return Route::Deliver;
    }
    if pending.is_exempt() {
        return Route::Reject(RejectReason::Exempt);
    }
    if pending.mark_retried() {
        Route::Refresh
    } else {
        Route::Reject(RejectReason::AlreadyRetried)
    }
}
