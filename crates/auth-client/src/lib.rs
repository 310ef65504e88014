//! Bearer-authenticated API client with single-flight token refresh
//!
//! Every call flows through the same pipeline:
//! 1. `attach` stamps `Authorization: Bearer <access>` from the credential store
//! 2. The `Dispatcher` performs the call
//! 3. `router` inspects the outcome; anything but a 401 is delivered as-is
//! 4. A first 401 on a non-exempt call is handed to the `RefreshCoordinator`,
//!    which runs at most one refresh per episode and parks every other caller
//! 5. Released callers replay their request once with the new access token
//!
//! Unrecoverable failures clear the credential store and signal the
//! `Navigator` to send the user to the login page, once per episode, unless
//! the triggering call opted out with `CallOptions::skip_auth_redirect`.

pub mod attach;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod navigator;
pub mod pending;
pub mod router;
pub mod session;

#[cfg(test)]
mod test_support;

pub use client::ApiClient;
pub use coordinator::RefreshCoordinator;
pub use error::{Error, Result};
pub use navigator::{Navigator, RecordingNavigator};
pub use pending::{CallOptions, PendingRequest};
pub use router::{RejectReason, Route, route};
pub use session::Session;
