//! The status fetcher contract shared by both fetcher variants.

use async_trait::async_trait;
use hooktrack_core::status::StatusRecord;
use hooktrack_core::types::OperationHandle;

/// Errors from a single status check.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The status API returned a non-2xx status code.
    #[error("Status API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be understood.
    #[error("Malformed status response: {0}")]
    Decode(String),

    /// No status location or credential is available to poll with.
    #[error("Missing wiring: {0}")]
    MissingWiring(String),
}

impl FetchError {
    /// Whether the poll loop should log the error and try again on the
    /// next cycle.
    ///
    /// Network failures, malformed bodies, 5xx, 408 and 429 are
    /// transient. Requests that could not even be built, other HTTP
    /// statuses and missing wiring are fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => !e.is_builder(),
            FetchError::Decode(_) => true,
            FetchError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::MissingWiring(_) => false,
        }
    }
}

/// Performs one status check for an operation handle.
///
/// Implementations make exactly one network call per [`fetch`](Self::fetch)
/// and never retry internally; retry policy belongs to the poll loop.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Verify that everything needed to poll `handle` is configured.
    ///
    /// Called once before a session starts so that missing wiring fails
    /// fast instead of surfacing on the first poll.
    fn check_wiring(&self, handle: &OperationHandle) -> Result<(), FetchError>;

    async fn fetch(&self, handle: &OperationHandle) -> Result<StatusRecord, FetchError>;
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`FetchError::Http`] containing the status
/// and body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(FetchError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
