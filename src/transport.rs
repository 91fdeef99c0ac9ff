//! Delivery of payloads to the collection endpoint.
//!
//! Each call to [`Transport::send`] is exactly one attempt:
//!
//! ```text
//! POST {domain}/api/capture
//! X-DEBUGMATE-TOKEN: <token>
//! Content-Type: application/json
//! Accept: application/json
//!
//! <payload JSON>
//! ```
//!
//! Failures are returned to the caller and never retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::error::TransportError;
use crate::payload::Payload;

/// Path appended to the configured domain.
pub const CAPTURE_PATH: &str = "/api/capture";

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "X-DEBUGMATE-TOKEN";

const JSON: &str = "application/json";

/// Builds the capture URL for `domain`, tolerating a trailing slash.
pub fn capture_url(domain: &str) -> String {
    format!("{}{}", domain.trim_end_matches('/'), CAPTURE_PATH)
}

/// A single-attempt payload delivery mechanism.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, payload: &Payload, domain: &str, token: &str) -> Result<(), TransportError>;
}

/// Delivers payloads over HTTP with `reqwest`.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport with a fresh client and no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, timeout: None }
    }

    /// Bounds each delivery attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &Payload, domain: &str, token: &str) -> Result<(), TransportError> {
        let url = capture_url(domain);
        let body = payload.to_json()?;

        let mut request = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, token)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .body(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %url, status = status.as_u16(), "Payload delivered");
        Ok(())
    }
}
