//! Integration tests for the planner and worker HTTP clients
//!
//! Validates the wire behavior against mock backends: payload shape, error
//! mapping, and the worker fetch's bounded transparent retry.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use foreman_engine::config::{PlannerConfig, WorkerConfig};
use foreman_engine::planner::{ChatPlanner, Planner, PlannerError};
use foreman_engine::worker::{HttpWorker, Worker, WorkerError};
use sdk::types::TranscriptEntry;

fn planner_for(server: &MockServer) -> ChatPlanner {
    ChatPlanner::new(PlannerConfig {
        base_url: server.uri(),
        ..PlannerConfig::default()
    })
    .with_api_key("test-key")
}

fn worker_for(server: &MockServer) -> HttpWorker {
    HttpWorker::new(WorkerConfig {
        base_url: server.uri(),
        ..WorkerConfig::default()
    })
}

#[tokio::test]
async fn test_planner_maps_roles_and_returns_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "messages": [
                { "role": "system", "content": "directive" },
                { "role": "user", "content": "build X" },
                { "role": "assistant", "content": "start with the schema" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "now add tests" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let planner = planner_for(&server);
    let reply = planner
        .send(&[
            TranscriptEntry::system("directive"),
            TranscriptEntry::worker("build X"),
            TranscriptEntry::planner("start with the schema"),
        ])
        .await
        .unwrap();

    assert_eq!(reply, "now add tests");
}

#[tokio::test]
async fn test_planner_surfaces_upstream_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let planner = planner_for(&server);
    let err = planner
        .send(&[TranscriptEntry::worker("hi")])
        .await
        .unwrap_err();

    match err {
        PlannerError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model overloaded");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_planner_malformed_payload_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let planner = planner_for(&server);
    let err = planner
        .send(&[TranscriptEntry::worker("hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, PlannerError::Malformed(_)));
}

#[tokio::test]
async fn test_worker_create_session_merges_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversations"))
        .and(body_partial_json(json!({
            "initial_user_msg": "start here",
            "repository": "octo/eta"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "conversation_id": "sess-42" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    let session_id = worker
        .create_session("start here", &json!({ "repository": "octo/eta" }))
        .await
        .unwrap();

    assert_eq!(session_id, "sess-42");
}

// Scenario D: two transient 503s, then success. The client retries
// transparently and the caller observes a success.
#[tokio::test]
async fn test_worker_fetch_retries_transient_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/conversations/sess-1/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("gateway hiccup"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/conversations/sess-1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 3, "content": "compiled cleanly" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    let event = worker.fetch_latest_event("sess-1").await.unwrap().unwrap();

    assert_eq!(event.id, 3);
    assert_eq!(event.content, "compiled cleanly");
}

#[tokio::test]
async fn test_worker_fetch_gives_up_after_bounded_retries() {
    let server = MockServer::start().await;

    // 2 retries means 3 attempts total, then the failure surfaces.
    Mock::given(method("GET"))
        .and(path("/api/conversations/sess-1/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("still down"))
        .expect(3)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    let err = worker.fetch_latest_event("sess-1").await.unwrap_err();

    assert!(matches!(err, WorkerError::FetchEvent(_)));
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_worker_fetch_does_not_retry_other_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/conversations/sess-1/events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("hard failure"))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    let err = worker.fetch_latest_event("sess-1").await.unwrap_err();

    assert!(matches!(err, WorkerError::FetchEvent(_)));
}

#[tokio::test]
async fn test_worker_fetch_empty_session_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/conversations/sess-1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    assert_eq!(worker.fetch_latest_event("sess-1").await.unwrap(), None);
}

#[tokio::test]
async fn test_worker_push_message_posts_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversations/sess-1/messages"))
        .and(body_partial_json(json!({ "content": "run the tests" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    worker.push_message("sess-1", "run the tests").await.unwrap();
}

#[tokio::test]
async fn test_worker_raw_call_hits_arbitrary_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversations/sess-1/pause"))
        .and(body_partial_json(json!({ "reason": "supervisor request" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "paused": true })))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker_for(&server);
    let result = worker
        .raw_call(
            "POST",
            "/api/conversations/sess-1/pause",
            Some(json!({ "reason": "supervisor request" })),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({ "paused": true }));
}
