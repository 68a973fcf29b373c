//! Status fetcher for a custom status endpoint.
//!
//! The initial webhook response names a status URL (or URL template).
//! [`EndpointFetcher`] resolves it for the operation id and performs a
//! single GET per check, expecting:
//!
//! ```json
//! { "status": "running", "progress": 0.4 }
//! { "status": "complete", "result": { ... } }
//! { "status": "error", "error": "node X failed" }
//! ```

use async_trait::async_trait;
use hooktrack_core::status::{normalize_progress, RunState, StatusRecord, DEFAULT_REMOTE_ERROR};
use hooktrack_core::types::OperationHandle;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::fetcher::{ensure_success, FetchError, StatusFetcher};

/// Literal placeholder substituted with the operation id.
pub const OPERATION_ID_PLACEHOLDER: &str = "{operationId}";

/// Query parameter used when the template has no placeholder.
pub const OPERATION_ID_QUERY_PARAM: &str = "operationId";

/// Body of a custom status endpoint response.
#[derive(Debug, Deserialize)]
struct EndpointStatus {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Polls the status URL carried on the handle.
pub struct EndpointFetcher {
    client: reqwest::Client,
    /// Used when a handle carries no status location of its own.
    fallback_template: Option<String>,
}

impl EndpointFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            fallback_template: None,
        }
    }

    /// Configure a template for handles that carry no status location.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.fallback_template = Some(template.into()).filter(|t| !t.trim().is_empty());
        self
    }

    /// Resolve the concrete status URL for `handle`.
    pub fn status_url(&self, handle: &OperationHandle) -> Result<Url, FetchError> {
        let template = handle
            .status_location
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.fallback_template.as_deref())
            .ok_or_else(|| {
                FetchError::MissingWiring(format!(
                    "no status location for operation {}",
                    handle.id
                ))
            })?;
        resolve_status_url(template, &handle.id)
    }
}

impl Default for EndpointFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusFetcher for EndpointFetcher {
    fn check_wiring(&self, handle: &OperationHandle) -> Result<(), FetchError> {
        self.status_url(handle).map(|_| ())
    }

    async fn fetch(&self, handle: &OperationHandle) -> Result<StatusRecord, FetchError> {
        let url = self.status_url(handle)?;
        let response = self.client.get(url).send().await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        parse_status_body(&body)
    }
}

/// Build the status URL for `operation_id` from `template`.
///
/// Every `{operationId}` placeholder is replaced with the percent-encoded
/// id; without a placeholder the id is appended as the `operationId`
/// query parameter.
pub fn resolve_status_url(template: &str, operation_id: &str) -> Result<Url, FetchError> {
    if template.contains(OPERATION_ID_PLACEHOLDER) {
        let resolved = template.replace(OPERATION_ID_PLACEHOLDER, &encode_id(operation_id));
        return Url::parse(&resolved).map_err(|e| {
            FetchError::MissingWiring(format!("invalid status location '{resolved}': {e}"))
        });
    }

    let mut url = Url::parse(template).map_err(|e| {
        FetchError::MissingWiring(format!("invalid status location '{template}': {e}"))
    })?;
    url.query_pairs_mut()
        .append_pair(OPERATION_ID_QUERY_PARAM, operation_id);
    Ok(url)
}

/// Encode everything outside the RFC 3986 unreserved set so the id reads
/// as one opaque value in both path and query position.
fn encode_id(operation_id: &str) -> String {
    let mut encoded = String::with_capacity(operation_id.len());
    for byte in operation_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Parse a status endpoint body into a [`StatusRecord`].
pub fn parse_status_body(body: &str) -> Result<StatusRecord, FetchError> {
    let parsed: EndpointStatus =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let state = RunState::parse(&parsed.status)
        .ok_or_else(|| FetchError::Decode(format!("unknown status '{}'", parsed.status)))?;

    let record = match state {
        RunState::Running => {
            StatusRecord::running(parsed.progress.and_then(normalize_progress))
        }
        RunState::Complete => StatusRecord::complete(parsed.result.unwrap_or(Value::Null)),
        RunState::Error => StatusRecord::error(
            parsed
                .error
                .as_ref()
                .and_then(error_text)
                .unwrap_or_else(|| DEFAULT_REMOTE_ERROR.to_string()),
        ),
    };
    Ok(record)
}

/// Accept both `"error": "msg"` and `"error": { "message": "msg" }`.
fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
