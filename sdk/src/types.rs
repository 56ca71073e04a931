//! Conversation and API wire types
//!
//! These types are shared between the engine (which persists and serves
//! them) and external callers (which send and receive them over HTTP).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a transcript entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System directive framing the conversation
    System,

    /// Message produced by the planner
    Planner,

    /// Progress reported by (or seeded into) the worker
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Planner => write!(f, "planner"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// One role-tagged message in a conversation transcript
///
/// The transcript is append-only and insertion-ordered; it is the full
/// context handed to the planner on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    /// Role of the message originator
    pub role: Role,

    /// Free-text content
    pub content: String,
}

impl TranscriptEntry {
    /// Create a system entry
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a planner entry
    pub fn planner(content: impl Into<String>) -> Self {
        Self {
            role: Role::Planner,
            content: content.into(),
        }
    }

    /// Create a worker entry
    pub fn worker(content: impl Into<String>) -> Self {
        Self {
            role: Role::Worker,
            content: content.into(),
        }
    }
}

/// Conversation state machine position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Created, planner not yet consulted
    Init,

    /// Worker session live, polling for events
    AwaitingWorker,

    /// Terminal. Once here, no further transitions occur
    Done,
}

impl ConversationState {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationState::Init => "init",
            ConversationState::AwaitingWorker => "awaiting_worker",
            ConversationState::Done => "done",
        }
    }
}

/// Whether a conversation is still being driven
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Stopped,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Stopped => "stopped",
        }
    }
}

/// A worker event staged for settlement, not yet folded into the transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEvent {
    pub id: i64,
    pub content: String,
    /// Unix epoch milliseconds when this event was first observed
    pub first_seen_at: i64,
}

/// Request body for `POST /conversations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    /// Free-text rules and context appended to the system directive
    #[serde(default)]
    pub task_context: String,

    /// The task handed to the planner as the opening worker-side message
    pub first_message: String,

    /// Cap on planner/worker exchanges before forced termination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Backend-specific session hints (repository, branch, ...) forwarded
    /// verbatim when the worker session is created
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Response body for `POST /conversations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

/// Full read-only view of a persisted conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub state: ConversationState,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub task_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_session_id: Option<String>,
    pub last_applied_event_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_event: Option<PendingEvent>,
    pub transcript: Vec<TranscriptEntry>,
    /// Unix epoch milliseconds
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed on every wake-up
    pub updated_at: i64,
}

/// Response body for `POST /conversations/{id}/stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConversationResponse {
    pub conversation_id: String,
    pub status: ConversationStatus,
    pub stop_reason: String,
}
