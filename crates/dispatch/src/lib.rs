//! Request dispatch abstraction
//!
//! Defines the `Dispatcher` trait that performs exactly one outbound call for a
//! method, path and body. Dispatchers know nothing about credentials, refresh
//! or retries: the auth client stamps headers before handing a request over
//! and inspects the response afterwards. `HttpDispatcher` is the reqwest-backed
//! implementation; tests substitute scripted in-memory dispatchers.

pub mod error;
pub mod http;

pub use error::{Error, Result};
pub use http::HttpDispatcher;

pub use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// One outbound call: method, API path (relative to the base URL), headers
/// and an optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Response returned by a dispatcher, with the body fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Build a response carrying a serialized JSON body.
    pub fn json_body(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// The authorization failure signal: HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Decode(format!("invalid JSON body ({}): {e}", self.status)))
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs a single outbound call. No coordination logic.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Dispatcher>`).
pub trait Dispatcher: Send + Sync {
    /// Identifier for logging (e.g. "http", "scripted")
    fn id(&self) -> &str;

    /// Send `request` and return whatever status the server answered with.
    ///
    /// Only transport failures (connect errors, timeouts, unreadable bodies)
    /// are returned as `Err`.
    fn dispatch<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
