//! HTTP surface tests
//!
//! Exercises the API through the sdk client against a server on an
//! ephemeral port. The planner and worker are never contacted: creation
//! must return immediately after persisting state, and the read/stop paths
//! are backend-free by design.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use foreman_engine::config::{PlannerConfig, WorkerConfig};
use foreman_engine::db::Database;
use foreman_engine::orchestrator::{Orchestrator, SettlementPolicy, Timing};
use foreman_engine::planner::ChatPlanner;
use foreman_engine::runtime::Runtime;
use foreman_engine::scheduler::WakeScheduler;
use foreman_engine::server;
use foreman_engine::worker::HttpWorker;
use sdk::client::{ClientError, ForemanClient};
use sdk::types::{ConversationState, ConversationStatus, CreateConversationRequest};

/// Server with no wake driver: conversations stay in INIT, and any
/// accidental upstream call would hit an unroutable address.
async fn start_server() -> (TempDir, ForemanClient) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();

    let planner = Arc::new(ChatPlanner::new(PlannerConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..PlannerConfig::default()
    }));
    let worker = Arc::new(HttpWorker::new(WorkerConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..WorkerConfig::default()
    }));

    let orchestrator = Orchestrator::new(
        planner,
        worker.clone(),
        SettlementPolicy {
            cooldown_ms: 10_000,
            max_cooldown_wait_ms: 30_000,
        },
        Timing {
            first_poll: Duration::from_secs(1),
            active_poll: Duration::from_secs(2),
            idle_poll: Duration::from_secs(5),
        },
    );

    let (scheduler, _wake_rx) = WakeScheduler::new();
    let runtime = Runtime::new(db.conversations(), orchestrator, worker, scheduler, 10);

    let (addr, _handle) = server::start(runtime, "127.0.0.1:0").await.unwrap();
    let client = ForemanClient::new(format!("http://{}", addr));

    (temp_dir, client)
}

fn request(first_message: &str) -> CreateConversationRequest {
    CreateConversationRequest {
        task_context: "keep it simple".to_string(),
        first_message: first_message.to_string(),
        max_iterations: Some(5),
        metadata: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn test_health_probe() {
    let (_tmp, client) = start_server().await;
    client.health().await.unwrap();
}

#[tokio::test]
async fn test_create_then_status_round_trip() {
    let (_tmp, client) = start_server().await;

    let created = client.create(&request("build X")).await.unwrap();
    assert!(!created.conversation_id.is_empty());

    let snapshot = client.status(&created.conversation_id).await.unwrap();
    assert_eq!(snapshot.id, created.conversation_id);
    assert_eq!(snapshot.state, ConversationState::Init);
    assert_eq!(snapshot.status, ConversationStatus::Active);
    assert_eq!(snapshot.max_iterations, 5);
    assert_eq!(snapshot.iteration, 0);
}

#[tokio::test]
async fn test_create_rejects_empty_first_message() {
    let (_tmp, client) = start_server().await;

    let err = client.create(&request("  ")).await.unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("first_message"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_status_of_unknown_conversation_is_404() {
    let (_tmp, client) = start_server().await;

    let err = client.status("does-not-exist").await.unwrap_err();
    match err {
        ClientError::Api { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_force_stop_via_api() {
    let (_tmp, client) = start_server().await;

    let created = client.create(&request("build X")).await.unwrap();
    let stopped = client.stop(&created.conversation_id).await.unwrap();

    assert_eq!(stopped.conversation_id, created.conversation_id);
    assert_eq!(stopped.status, ConversationStatus::Stopped);
    assert_eq!(stopped.stop_reason, "stopped_by_request");

    let snapshot = client.status(&created.conversation_id).await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Done);
    assert_eq!(snapshot.status, ConversationStatus::Stopped);
}

#[tokio::test]
async fn test_stop_unknown_conversation_is_404() {
    let (_tmp, client) = start_server().await;

    let err = client.stop("does-not-exist").await.unwrap_err();
    match err {
        ClientError::Api { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {:?}", other),
    }
}
