//! The injected network seam: `post(endpoint, payload, headers) -> JSON`.
//!
//! Everything above this module works on parsed [`serde_json::Value`]s and
//! never touches HTTP directly, so the whole pipeline can be driven by an
//! in-memory transport in tests. [`HttpTransport`] is the production
//! implementation over `reqwest`.
//!
//! ## Body handling
//!
//! Providers are sloppy about what they put in a response body:
//!
//! - some streaming-capable gateways return several JSON objects back to
//!   back even when `stream: false` was requested: the first complete
//!   value wins;
//! - error responses carry the useful message in one of several fields
//!   (`error.message`, `error.code`, `error`, `message`), or only as raw
//!   text;
//! - an unparseable 2xx body is treated as `{}` so that the caller reports
//!   "no usable content" rather than a JSON syntax error.

use crate::error::{preview, ComicError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// POST a JSON payload and return the parsed JSON response.
///
/// Implementations must parse the body of non-2xx responses for a provider
/// error message before failing, and must classify credential failures as
/// [`ComicError::AuthError`] (see [`ComicError::from_provider_failure`]).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &[(String, String)],
    ) -> Result<Value, ComicError>;
}

/// [`Transport`] over HTTPS using a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ComicError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ComicError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS, …).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &[(String, String)],
    ) -> Result<Value, ComicError> {
        let mut request = self.client.post(endpoint).json(payload);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ComicError::transport(format!("request to {endpoint} timed out"))
            } else {
                ComicError::transport(format!("request to {endpoint} failed: {e}"))
            }
        })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ComicError::transport(format!("reading body from {endpoint}: {e}")))?;
        debug!(
            "POST {} → {} ({} bytes)",
            endpoint,
            status.as_u16(),
            raw.len()
        );

        let body = parse_body(&raw);
        if status.is_success() {
            return Ok(body);
        }

        let message = provider_error_message(&body)
            .or_else(|| {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| preview(trimmed, 500))
            })
            .unwrap_or_else(|| format!("request failed ({})", status.as_u16()));

        Err(ComicError::from_provider_failure(
            host_of(endpoint),
            Some(status.as_u16()),
            message,
        ))
    }
}

/// Parse the first complete JSON value in `raw`, or `{}` if there is none.
pub fn parse_body(raw: &str) -> Value {
    let mut values = serde_json::Deserializer::from_str(raw).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => value,
        _ => Value::Object(Map::new()),
    }
}

/// The provider's own error message, if the body carries one.
pub fn provider_error_message(body: &Value) -> Option<String> {
    let error = body.get("error");
    [
        error.and_then(|e| e.get("message")),
        error.and_then(|e| e.get("code")),
        error,
        body.get("message"),
    ]
    .into_iter()
    .flatten()
    .find_map(stringify_if_needed)
}

fn stringify_if_needed(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

fn host_of(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    rest.split('/').next().unwrap_or(rest)
}
