//! The connector client context.
//!
//! A `ConnectorClient` bundles the connector base URL, a transport and the
//! read delay. It is passed explicitly to every operation, so several
//! independent provisioning runs (against different hosts) can coexist in
//! one process.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConnectorError, Result};
use crate::handle::RawHandle;
use crate::transport::{ApiRequest, ApiResponse, ConnectorSettings, HttpTransport, Transport};

/// Authenticated session against one connector.
#[derive(Clone)]
pub struct ConnectorClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    read_delay: Duration,
}

impl ConnectorClient {
    /// Create a client over an arbitrary transport.
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        ConnectorClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            read_delay: Duration::ZERO,
        }
    }

    /// Create a client that talks HTTPS to a remote connector.
    pub fn connect(settings: &ConnectorSettings) -> Self {
        let transport = Arc::new(HttpTransport::new(settings));
        ConnectorClient::new(&settings.base_url, transport).with_read_delay(settings.read_delay)
    }

    /// Pause for `delay` before each read request.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Connector base URL (scheme, host, port).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/api/catalogs`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and require a success status.
    pub fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        tracing::debug!(method = ?request.method, url = %request.url, "sending request");
        let response = self.transport.send(request)?;
        if response.is_success() {
            tracing::debug!(url = %request.url, status = response.status, "request succeeded");
            return Ok(response);
        }

        let body = response.text();
        let message = server_message(&response.body);
        tracing::warn!(
            url = %request.url,
            status = response.status,
            message = message.as_deref().unwrap_or(""),
            "request failed"
        );
        Err(ConnectorError::Request {
            url: request.url.clone(),
            status: response.status,
            message,
            body,
        })
    }

    /// POST a JSON body and return the handle from the `Location` header.
    pub fn post_for_handle(&self, url: &str, body: serde_json::Value) -> Result<RawHandle> {
        let response = self.execute(&ApiRequest::post(url, Some(body)))?;
        let location = response
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ConnectorError::ResponseFormat {
                url: url.to_string(),
                detail: "missing Location header".to_string(),
            })?;

        RawHandle::parse(location).map_err(|e| ConnectorError::ResponseFormat {
            url: url.to_string(),
            detail: format!("Location header is not an entity handle: {e}"),
        })
    }

    /// POST a JSON body and return the raw response.
    pub fn post_json(&self, url: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.execute(&ApiRequest::post(url, Some(body)))
    }

    /// GET a URL, honoring the read delay.
    pub fn get(&self, url: &str) -> Result<ApiResponse> {
        if !self.read_delay.is_zero() {
            tracing::debug!(delay_ms = self.read_delay.as_millis() as u64, "waiting before read");
            std::thread::sleep(self.read_delay);
        }
        self.execute(&ApiRequest::get(url))
    }
}

impl std::fmt::Debug for ConnectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorClient")
            .field("base_url", &self.base_url)
            .field("read_delay", &self.read_delay)
            .finish_non_exhaustive()
    }
}

/// Extract a human-readable message from a JSON error body.
fn server_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
