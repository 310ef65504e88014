//! Bearer session credentials
//!
//! Persistent storage for the access/refresh credential pair and the two auth
//! wire contracts the client relies on: token refresh and identity lookup.
//! Coordination (single-flight refresh, replay) lives in `auth-client`; this
//! crate only knows how to read, write and exchange tokens.
//!
//! Credential flow:
//! 1. A login stores the pair via `CredentialStore::replace()`
//! 2. Every call reads `CredentialStore::access_token()`
//! 3. On 401 the coordinator calls `token::refresh_tokens()` once
//! 4. The new pair is saved via `CredentialStore::update_tokens()`
//! 5. Unrecoverable failures call `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialStore, StoredTokens};
pub use error::{Error, Result};
pub use identity::Identity;
pub use token::{RefreshResponse, refresh_tokens};
