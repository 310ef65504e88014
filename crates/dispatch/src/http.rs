//! reqwest-backed dispatcher
//!
//! Joins the request path onto the configured base URL, forwards headers and
//! the JSON body, and buffers the response. Every status code (including 401)
//! is returned as a response; only transport failures become errors.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{ApiRequest, ApiResponse, Dispatcher, Error, Result};

/// Dispatcher that sends requests over HTTP with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// Absolute URL for an API path. Paths must be rooted (`/api/...`).
    pub fn url_for(&self, path: &str) -> Result<String> {
        if !path.starts_with('/') {
            return Err(Error::InvalidRequest(format!(
                "path must start with '/', got: {path}"
            )));
        }
        Ok(format!("{}{}", self.base_url, path))
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(method = %request.method, path = %request.path, "request timed out");
                Error::Timeout(self.timeout.as_secs())
            } else {
                Error::Http(format!("{} {} failed: {e}", request.method, request.path))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;

        debug!(method = %request.method, path = %request.path, status = status.as_u16(), "dispatched");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Dispatcher for HttpDispatcher {
    fn id(&self) -> &str {
        "http"
    }

    fn dispatch<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(self.send(request))
    }
}
