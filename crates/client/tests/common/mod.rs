//! Shared fixtures for the client integration tests.
//!
//! Mock servers stand in for the webhook, the custom status endpoint and
//! the execution API.

#![allow(dead_code)]

use std::time::Duration;

use hooktrack_core::polling::PollingConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";

/// Short intervals so tests against a real mock server finish quickly.
pub fn fast_config() -> PollingConfig {
    PollingConfig::default()
        .with_base_interval(Duration::from_millis(20))
        .with_timeout(Duration::from_secs(10))
}

/// A webhook acknowledgement for a long-running operation.
pub fn accepted(operation_id: &str, status_url: Option<&str>) -> Value {
    let mut body = json!({ "executionId": operation_id, "status": "running" });
    if let Some(url) = status_url {
        body["statusUrl"] = json!(url);
    }
    body
}

/// An execution resource still in progress.
pub fn execution_running(id: &str) -> Value {
    json!({
        "id": id,
        "finished": false,
        "status": "running",
        "data": { "resultData": { "runData": {} } }
    })
}

/// A successful execution whose last step emitted a single item.
pub fn execution_succeeded(id: &str, output: Value) -> Value {
    json!({
        "id": id,
        "finished": true,
        "status": "success",
        "data": {
            "resultData": {
                "lastNodeExecuted": "Respond",
                "runData": {
                    "Webhook": [ { "data": { "main": [ [ { "json": { "received": true } } ] ] } } ],
                    "Respond": [ { "data": { "main": [ [ { "json": output } ] ] } } ]
                }
            }
        }
    })
}

/// A failed execution with an error message in its trace.
pub fn execution_failed(id: &str, message: &str) -> Value {
    json!({
        "id": id,
        "finished": false,
        "status": "error",
        "data": { "resultData": { "error": { "message": message } } }
    })
}

/// Answer `GET path` with each body in turn; the last one repeats.
pub async fn mock_status_sequence(server: &MockServer, at: &str, bodies: Vec<Value>) {
    let count = bodies.len();
    for (i, body) in bodies.into_iter().enumerate() {
        let mock = Mock::given(method("GET"))
            .and(path(at.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        let mock = if i + 1 < count { mock.up_to_n_times(1) } else { mock };
        mock.mount(server).await;
    }
}

/// Answer `POST path` with a JSON body.
pub async fn mock_webhook(server: &MockServer, at: &str, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(at.to_string()))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
