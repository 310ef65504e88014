//! Session wire constants
//!
//! Fixed backend paths and storage keys shared by the client and the
//! credential store.

/// Token refresh endpoint (`POST`, body `{ refreshToken }`)
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Identity lookup endpoint (`GET`, bearer authenticated)
pub const IDENTITY_PATH: &str = "/api/auth/me";

/// Where the user is sent when the session cannot be recovered
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Storage key for the access credential
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
