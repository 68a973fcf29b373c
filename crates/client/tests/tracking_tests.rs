//! End-to-end tests: invoke a mock webhook, then track the operation
//! through a mock status source until it resolves.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use hooktrack_client::api::{OperationRequest, WebhookApi};
use hooktrack_client::endpoint::EndpointFetcher;
use hooktrack_client::events::TrackerEvent;
use hooktrack_client::resource::ExecutionFetcher;
use hooktrack_client::store::{FileHandleStore, HandleStore};
use hooktrack_client::tracker::Tracker;
use hooktrack_core::error::{PollError, PollErrorKind};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

fn endpoint_tracker(server: &MockServer) -> Tracker {
    Tracker::new(
        WebhookApi::new(format!("{}/webhook/job", server.uri())),
        Arc::new(EndpointFetcher::new()),
        fast_config(),
    )
    .unwrap()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn immediate_result_skips_polling() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/job", 200, json!({ "answer": 42 })).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = endpoint_tracker(&server)
        .trigger(&OperationRequest::new(json!({})))
        .await;

    assert_eq!(result.unwrap(), json!({ "answer": 42 }));
}

#[tokio::test]
async fn endpoint_operation_runs_to_completion() {
    let server = MockServer::start().await;
    let status_url = format!("{}/status/{{operationId}}", server.uri());
    mock_webhook(&server, "/webhook/job", 200, accepted("op-1", Some(&status_url))).await;
    mock_status_sequence(
        &server,
        "/status/op-1",
        vec![
            json!({ "status": "running", "progress": 0.3 }),
            json!({ "status": "running", "progress": 0.8 }),
            json!({ "status": "complete", "result": { "url": "https://cdn/out.png" } }),
        ],
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileHandleStore::new(dir.path().join("handles.json")));
    let tracker = endpoint_tracker(&server).with_store(store.clone());
    let mut rx = tracker.subscribe();

    let result = tracker.trigger(&OperationRequest::new(json!({ "prompt": "x" }))).await;

    assert_eq!(result.unwrap(), json!({ "url": "https://cdn/out.png" }));
    assert!(store.pending().await.unwrap().is_empty());
    assert!(tracker.active_operations().await.is_empty());

    let events = drain(&mut rx);
    assert_matches!(events.first(), Some(TrackerEvent::Invoked { operation_id }) if operation_id == "op-1");
    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions, [0.3, 0.8]);
    assert_matches!(events.last(), Some(TrackerEvent::Completed { attempts: 3, .. }));
}

#[tokio::test]
async fn execution_operation_runs_to_completion() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/job", 200, accepted("1042", None)).await;
    mock_status_sequence(
        &server,
        "/api/v1/executions/1042",
        vec![
            execution_running("1042"),
            execution_succeeded("1042", json!({ "summary": "done" })),
        ],
    )
    .await;

    let fetcher = ExecutionFetcher::new(format!("{}/api/v1", server.uri()), Some(API_KEY.into()));
    let tracker = Tracker::new(
        WebhookApi::new(format!("{}/webhook/job", server.uri())),
        Arc::new(fetcher),
        fast_config(),
    )
    .unwrap();

    let result = tracker.trigger(&OperationRequest::new(json!({}))).await;
    assert_eq!(result.unwrap(), json!({ "summary": "done" }));
}

#[tokio::test]
async fn schemeless_execution_api_url_fails_fast() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/job", 200, accepted("1042", None)).await;

    let fetcher = ExecutionFetcher::new("n8n.local/api/v1", Some(API_KEY.into()));
    let tracker = Tracker::new(
        WebhookApi::new(format!("{}/webhook/job", server.uri())),
        Arc::new(fetcher),
        fast_config().with_timeout(Duration::from_secs(30)),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let result = tracker.trigger(&OperationRequest::new(json!({}))).await;

    assert_matches!(
        result,
        Err(PollError::MissingWiring { operation_id: Some(id), reason })
            if id == "1042" && reason.contains("n8n.local/api/v1")
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn remote_failure_is_reported_and_cleared() {
    let server = MockServer::start().await;
    let status_url = format!("{}/status/{{operationId}}", server.uri());
    mock_webhook(&server, "/webhook/job", 200, accepted("op-2", Some(&status_url))).await;
    mock_status_sequence(
        &server,
        "/status/op-2",
        vec![json!({ "status": "error", "error": "node X failed" })],
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileHandleStore::new(dir.path().join("handles.json")));
    let tracker = endpoint_tracker(&server).with_store(store.clone());
    let mut rx = tracker.subscribe();

    let result = tracker.trigger(&OperationRequest::new(json!({}))).await;

    assert_matches!(result, Err(PollError::Remote { operation_id, message }) => {
        assert_eq!(operation_id.as_deref(), Some("op-2"));
        assert_eq!(message, "node X failed");
    });
    assert!(store.pending().await.unwrap().is_empty());
    assert_matches!(
        drain(&mut rx).last(),
        Some(TrackerEvent::Failed { kind: PollErrorKind::Remote, .. })
    );
}

#[tokio::test]
async fn missing_status_location_fails_without_polling() {
    let server = MockServer::start().await;
    mock_webhook(&server, "/webhook/job", 200, accepted("op-3", None)).await;

    let result = endpoint_tracker(&server)
        .trigger(&OperationRequest::new(json!({})))
        .await;

    assert_matches!(result, Err(PollError::MissingWiring { operation_id: Some(id), .. }) if id == "op-3");
}

#[tokio::test]
async fn timed_out_operation_can_be_resumed_later() {
    let server = MockServer::start().await;
    let status_url = format!("{}/status/{{operationId}}", server.uri());
    mock_webhook(&server, "/webhook/job", 200, accepted("op-4", Some(&status_url))).await;
    Mock::given(method("GET"))
        .and(path("/status/op-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .up_to_n_times(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("handles.json");

    // First run gives up quickly.
    let tracker = Tracker::new(
        WebhookApi::new(format!("{}/webhook/job", server.uri())),
        Arc::new(EndpointFetcher::new()),
        fast_config().with_timeout(Duration::from_millis(50)),
    )
    .unwrap()
    .with_store(Arc::new(FileHandleStore::new(&store_path)));

    let result = tracker.trigger(&OperationRequest::new(json!({}))).await;
    assert_matches!(result, Err(ref e) if e.is_retryable());

    // The remote side finishes meanwhile; a new process resumes.
    Mock::given(method("GET"))
        .and(path("/status/op-4"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "complete", "result": "late" })),
        )
        .mount(&server)
        .await;

    let store = Arc::new(FileHandleStore::new(&store_path));
    let resumed = Tracker::new(
        WebhookApi::new(format!("{}/webhook/job", server.uri())),
        Arc::new(EndpointFetcher::new()),
        fast_config(),
    )
    .unwrap()
    .with_store(store.clone());

    let outcomes = resumed.resume_all().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, "op-4");
    assert_eq!(outcomes[0].1.as_ref().unwrap(), &json!("late"));
    assert!(store.pending().await.unwrap().is_empty());
}
