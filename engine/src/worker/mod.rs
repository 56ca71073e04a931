//! Worker client
//!
//! The worker is the agent backend that executes instructions and emits
//! progress events into a session. Three operations cover everything the
//! orchestrator needs: create a session seeded with a message, fetch the
//! single most recent event, and push a follow-up message.
//!
//! The latest-event fetch is intentionally bounded: polling cost stays
//! constant no matter how long the session history grows. That endpoint is
//! also the one the backend intermittently fails, so it carries a small
//! bounded retry; the other operations surface failures immediately.

use async_trait::async_trait;

pub mod http;

pub use http::HttpWorker;

/// Result type for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// A single progress event emitted by the worker
///
/// `id` increases monotonically within a session; the orchestrator uses it
/// as the dedup boundary. `content` is the extracted text, which may be
/// empty when the raw event carries no recognized text field.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEvent {
    pub id: i64,
    pub content: String,
}

/// Transport-level failure detail shared by all worker operations
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("network error: {0}")]
    Network(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timeout")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors from the worker client, tagged by operation
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("session create failed: {0}")]
    CreateSession(CallError),

    #[error("event fetch failed: {0}")]
    FetchEvent(CallError),

    #[error("message push failed: {0}")]
    PushMessage(CallError),

    #[error("api call failed ({method} {path}): {source}")]
    RawCall {
        method: String,
        path: String,
        source: CallError,
    },
}

/// Worker abstraction consumed by the orchestrator and directive dispatch
#[async_trait]
pub trait Worker: Send + Sync {
    /// Start a new session seeded with an initial message.
    ///
    /// `task_metadata` is forwarded verbatim alongside the seed (repository,
    /// branch, and similar backend-specific hints).
    async fn create_session(
        &self,
        initial_message: &str,
        task_metadata: &serde_json::Value,
    ) -> Result<String>;

    /// Fetch only the single most recent event of a session, if any.
    async fn fetch_latest_event(&self, session_id: &str) -> Result<Option<WorkerEvent>>;

    /// Inject a new message into an existing session.
    async fn push_message(&self, session_id: &str, message: &str) -> Result<()>;

    /// Out-of-band call against the worker API, used by directive dispatch.
    ///
    /// Never touches orchestrator state; callers log failures and move on.
    async fn raw_call(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value>;
}
