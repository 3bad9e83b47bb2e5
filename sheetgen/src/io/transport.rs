//! Outbound HTTP seam for the model client.
//!
//! The [`Transport`] trait decouples the client's retry logic from the actual
//! HTTP stack. Tests use scripted transports that replay canned responses
//! without touching the network.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::resolve::mask_credential;

/// Per-request wall-clock limit for the completion call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// JSON POST with a bearer credential.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub bearer: String,
    pub body: Value,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("bearer", &mask_credential(&self.bearer))
            .field("body", &self.body)
            .finish()
    }
}

/// Status code and raw body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any HTTP status was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {0}s.")]
    Timeout(u64),

    #[error("Could not connect to {0}.")]
    Connect(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Abstraction over the HTTP stack.
pub trait Transport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(url = %request.url, "posting completion request");
        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.bearer)
            .json(&request.body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout(self.timeout.as_secs())
                } else if err.is_connect() {
                    TransportError::Connect(request.url.clone())
                } else {
                    TransportError::Client(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(self.timeout.as_secs())
            } else {
                TransportError::Client(err.to_string())
            }
        })?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn debug_output_masks_the_bearer() {
        let request = HttpRequest {
            url: "https://example.test".to_string(),
            bearer: "sk-secret-9876".to_string(),
            body: json!({}),
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("9876"));
    }

    #[test]
    fn success_range_is_2xx() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let not_ok = HttpResponse {
            status: 302,
            body: String::new(),
        };
        assert!(!not_ok.is_success());
    }
}
