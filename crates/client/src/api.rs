//! HTTP client for the webhook entry point.
//!
//! [`WebhookApi`] issues the single request that starts a remote
//! operation and classifies the answer into an explicit
//! [`Invocation`]: either the final result or a handle to poll.

use hooktrack_core::error::PollError;
use hooktrack_core::invocation::{classify_body, Invocation};
use reqwest::header::LOCATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

/// Header carrying a per-invocation correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// A binary file sent alongside the payload.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Multipart field name.
    pub field: String,
    pub file_name: String,
    /// MIME type; `application/octet-stream` when absent.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// The payload of one webhook invocation.
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub payload: Value,
    pub attachments: Vec<Attachment>,
}

impl OperationRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// HTTP client for a single webhook URL.
#[derive(Clone)]
pub struct WebhookApi {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookApi {
    /// Create a new API client for a webhook.
    ///
    /// * `webhook_url` - Full URL the payload is POSTed to.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (shares the connection pool with the status fetchers).
    pub fn with_client(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Trigger the remote operation.
    ///
    /// Sends the payload as JSON, or as `multipart/form-data` when the
    /// request carries attachments. Performs exactly one network call;
    /// there is no retry at this layer.
    pub async fn invoke(&self, request: &OperationRequest) -> Result<Invocation, PollError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        let builder = self
            .client
            .post(&self.webhook_url)
            .header(REQUEST_ID_HEADER, &request_id);

        let builder = if request.attachments.is_empty() {
            builder.json(&request.payload)
        } else {
            builder.multipart(build_form(request)?)
        };

        let response = builder.send().await.map_err(transport_error)?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                "Webhook rejected invocation",
            );
            return Err(PollError::Remote {
                operation_id: None,
                message: format!("webhook returned HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }

        let invocation = classify_body(&body, location.as_deref());
        match &invocation {
            Invocation::Pending { handle, .. } => tracing::info!(
                request_id = %request_id,
                operation_id = %handle.id,
                status_location = ?handle.status_location,
                "Webhook accepted long-running operation",
            ),
            Invocation::Immediate(_) => tracing::info!(
                request_id = %request_id,
                "Webhook answered synchronously",
            ),
        }

        Ok(invocation)
    }
}

/// Build a multipart form: every top-level payload field becomes a text
/// part, every attachment a file part.
fn build_form(request: &OperationRequest) -> Result<Form, PollError> {
    let mut form = Form::new();

    match &request.payload {
        Value::Object(fields) => {
            for (name, value) in fields {
                form = form.text(name.clone(), text_value(value));
            }
        }
        Value::Null => {}
        other => {
            form = form.text("payload", other.to_string());
        }
    }

    for attachment in &request.attachments {
        let content_type = attachment
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(content_type)
            .map_err(|e| PollError::InvalidRequest {
                message: format!(
                    "invalid content type '{content_type}' for attachment '{}': {e}",
                    attachment.field
                ),
            })?;
        form = form.part(attachment.field.clone(), part);
    }

    Ok(form)
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn transport_error(e: reqwest::Error) -> PollError {
    PollError::Transport {
        operation_id: None,
        message: e.to_string(),
    }
}
