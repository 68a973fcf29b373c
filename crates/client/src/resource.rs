//! Status fetcher backed by an authenticated execution API.
//!
//! Looks up `GET {api_url}/executions/{id}?includeData=true` with an API
//! key header and normalizes the execution resource through
//! [`hooktrack_core::execution`].

use async_trait::async_trait;
use hooktrack_core::execution::normalize_execution;
use hooktrack_core::status::StatusRecord;
use hooktrack_core::types::OperationHandle;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::Value;

use crate::fetcher::{ensure_success, FetchError, StatusFetcher};

/// Header the API key is sent in unless configured otherwise.
pub const DEFAULT_API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Polls a durable execution resource by id.
pub struct ExecutionFetcher {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    api_key_header: String,
}

impl ExecutionFetcher {
    /// * `api_url` - Base URL of the public API, e.g. `https://host/api/v1`.
    /// * `api_key` - Credential; polling is refused while this is `None`.
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }

    /// Send the API key in a different header.
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// Base URL with `executions/{id}` pushed as encoded path segments.
    fn execution_url(&self, operation_id: &str) -> Result<Url, FetchError> {
        if self.api_url.is_empty() {
            return Err(FetchError::MissingWiring(
                "no execution API URL configured".into(),
            ));
        }
        let invalid = |reason: String| {
            FetchError::MissingWiring(format!(
                "invalid execution API URL '{}': {reason}",
                self.api_url
            ))
        };

        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        url.path_segments_mut()
            .map_err(|_| invalid("cannot carry a path".into()))?
            .pop_if_empty()
            .push("executions")
            .push(operation_id);
        Ok(url)
    }

    /// Everything a lookup needs, validated before any request is built.
    fn request_parts(
        &self,
        operation_id: &str,
    ) -> Result<(Url, HeaderName, HeaderValue), FetchError> {
        let url = self.execution_url(operation_id)?;
        let header = HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|_| {
            FetchError::MissingWiring(format!(
                "invalid API key header name '{}'",
                self.api_key_header
            ))
        })?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::MissingWiring("no execution API key configured".into()))?;
        let value = HeaderValue::from_str(api_key).map_err(|_| {
            FetchError::MissingWiring("execution API key is not a valid header value".into())
        })?;
        Ok((url, header, value))
    }
}

#[async_trait]
impl StatusFetcher for ExecutionFetcher {
    fn check_wiring(&self, handle: &OperationHandle) -> Result<(), FetchError> {
        self.request_parts(&handle.id).map(|_| ())
    }

    async fn fetch(&self, handle: &OperationHandle) -> Result<StatusRecord, FetchError> {
        let (url, header, api_key) = self.request_parts(&handle.id)?;

        let response = self
            .client
            .get(url)
            .query(&[("includeData", "true")])
            .header(header, api_key)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.text().await?;
        let resource: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        tracing::trace!(
            operation_id = %handle.id,
            status = ?resource.get("status"),
            finished = ?resource.get("finished"),
            "Fetched execution resource",
        );

        Ok(normalize_execution(&resource))
    }
}
