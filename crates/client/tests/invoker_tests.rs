//! Integration tests for the webhook invoker.

mod common;

use assert_matches::assert_matches;
use hooktrack_client::api::{Attachment, OperationRequest, WebhookApi, REQUEST_ID_HEADER};
use hooktrack_core::error::PollError;
use hooktrack_core::invocation::Invocation;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header_exists, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn posts_payload_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/render"))
        .and(body_json(json!({ "prompt": "a red fox" })))
        .and(header_exists(REQUEST_ID_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "https://cdn/fox.png" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = WebhookApi::new(format!("{}/webhook/render", server.uri()));
    let invocation = api
        .invoke(&OperationRequest::new(json!({ "prompt": "a red fox" })))
        .await
        .unwrap();

    assert_eq!(invocation, Invocation::Immediate(json!({ "url": "https://cdn/fox.png" })));
}

#[tokio::test]
async fn sends_multipart_when_attachments_present() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/upscale"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"scale\""))
        .and(body_string_contains("filename=\"input.png\""))
        .and(body_string_contains("PNGDATA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let request = OperationRequest::new(json!({ "scale": 2 })).with_attachment(Attachment {
        field: "image".into(),
        file_name: "input.png".into(),
        content_type: Some("image/png".into()),
        bytes: b"PNGDATA".to_vec(),
    });
    let api = WebhookApi::new(format!("{}/webhook/upscale", server.uri()));

    let invocation = api.invoke(&request).await.unwrap();
    assert_eq!(invocation, Invocation::Immediate(json!({ "ok": true })));
}

#[tokio::test]
async fn every_invocation_gets_a_fresh_request_id() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/x", 200, json!({ "ok": true })).await;
    let api = WebhookApi::new(format!("{}/webhook/x", server.uri()));

    api.invoke(&OperationRequest::new(json!({}))).await.unwrap();
    api.invoke(&OperationRequest::new(json!({}))).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let ids: Vec<_> = requests
        .iter()
        .map(|r| r.headers.get(REQUEST_ID_HEADER).unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_acknowledgement_becomes_pending_handle() {
    let server = MockServer::start().await;
    mock_webhook(
        &server,
        "/webhook/render",
        200,
        accepted("exec-9", Some("https://hooks.example/status/{operationId}")),
    )
    .await;

    let api = WebhookApi::new(format!("{}/webhook/render", server.uri()));
    let invocation = api.invoke(&OperationRequest::new(json!({}))).await.unwrap();

    assert_matches!(invocation, Invocation::Pending { handle, .. } => {
        assert_eq!(handle.id, "exec-9");
        assert_eq!(
            handle.status_location.as_deref(),
            Some("https://hooks.example/status/{operationId}")
        );
    });
}

#[tokio::test]
async fn location_header_supplies_missing_status_location() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/render"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Location", "https://hooks.example/ops/77")
                .set_body_json(accepted("77", None)),
        )
        .mount(&server)
        .await;

    let api = WebhookApi::new(format!("{}/webhook/render", server.uri()));
    let invocation = api.invoke(&OperationRequest::new(json!({}))).await.unwrap();

    assert_matches!(invocation, Invocation::Pending { handle, .. } => {
        assert_eq!(handle.status_location.as_deref(), Some("https://hooks.example/ops/77"));
    });
}

#[tokio::test]
async fn id_without_running_indicator_is_a_final_result() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/x", 200, json!({ "id": "abc", "status": "done" })).await;

    let api = WebhookApi::new(format!("{}/webhook/x", server.uri()));
    let invocation = api.invoke(&OperationRequest::new(json!({}))).await.unwrap();

    assert!(!invocation.is_pending());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_success_status_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook/x"))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow not active"))
        .mount(&server)
        .await;

    let api = WebhookApi::new(format!("{}/webhook/x", server.uri()));
    let result = api.invoke(&OperationRequest::new(json!({}))).await;

    assert_matches!(result, Err(PollError::Remote { operation_id: None, message }) => {
        assert!(message.contains("500"));
        assert!(message.contains("workflow not active"));
    });
}

#[tokio::test]
async fn unreachable_webhook_is_transport_error() {
    // Nothing listens on port 1.
    let result = WebhookApi::new("http://127.0.0.1:1/webhook/x")
        .invoke(&OperationRequest::new(json!({})))
        .await;

    assert_matches!(result, Err(PollError::Transport { operation_id: None, .. }));
}
