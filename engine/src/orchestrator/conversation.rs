//! The conversation aggregate
//!
//! One `Conversation` is the sole persisted record of a planner/worker
//! exchange. It is mutated only by the orchestrator's wake handler, one
//! wake at a time.

use sdk::types::{ConversationSnapshot, ConversationState, ConversationStatus, TranscriptEntry};
use serde::{Deserialize, Serialize};

pub use sdk::types::PendingEvent;

/// Stop reason when the planner emitted the completion sentinel
pub const STOP_PLANNER_DONE: &str = "planner_done";

/// Stop reason when the iteration cap was hit
pub const STOP_MAX_ITERATIONS: &str = "max_iterations_reached";

/// Stop reason when the state machine invariant was violated
pub const STOP_INVALID_STATE: &str = "invalid_state";

/// Stop reason for an external force stop
pub const STOP_BY_REQUEST: &str = "stopped_by_request";

/// Persisted state of one planner/worker conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub state: ConversationState,
    pub status: ConversationStatus,
    pub stop_reason: Option<String>,

    /// Completed planner/worker exchanges; strictly increases by 1 per
    /// exchange, never decreases
    pub iteration: u32,
    pub max_iterations: u32,

    /// Rules and context appended to the system directive
    pub task_context: String,

    /// The caller's opening message, consumed by the INIT handler
    pub first_message: String,

    /// Backend hints forwarded when the worker session is created
    pub metadata: serde_json::Value,

    /// Set exactly once, when the worker session is created
    pub worker_session_id: Option<String>,

    /// Dedup boundary: events with id at or below this are already applied
    pub last_applied_event_id: i64,

    /// Staged event waiting out the settlement cooldown
    pub pending_event: Option<PendingEvent>,

    /// Unix millis when the open cooldown window started
    pub cooldown_started_at: Option<i64>,

    /// Insertion-ordered, append-only while active
    pub transcript: Vec<TranscriptEntry>,

    /// Unix millis
    pub created_at: i64,
    /// Unix millis, refreshed on every wake-up
    pub updated_at: i64,
}

impl Conversation {
    /// Create a fresh conversation record
    pub fn new(
        id: impl Into<String>,
        task_context: impl Into<String>,
        first_message: impl Into<String>,
        metadata: serde_json::Value,
        max_iterations: u32,
        now_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            state: ConversationState::Init,
            status: ConversationStatus::Active,
            stop_reason: None,
            iteration: 0,
            max_iterations,
            task_context: task_context.into(),
            first_message: first_message.into(),
            metadata,
            worker_session_id: None,
            last_applied_event_id: 0,
            pending_event: None,
            cooldown_started_at: None,
            transcript: Vec::new(),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Once true, stays true: no further transitions occur
    pub fn is_terminal(&self) -> bool {
        self.state == ConversationState::Done
    }

    /// Read-only view served by the status endpoint
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            id: self.id.clone(),
            state: self.state,
            status: self.status,
            stop_reason: self.stop_reason.clone(),
            iteration: self.iteration,
            max_iterations: self.max_iterations,
            task_context: self.task_context.clone(),
            worker_session_id: self.worker_session_id.clone(),
            last_applied_event_id: self.last_applied_event_id,
            pending_event: self.pending_event.clone(),
            transcript: self.transcript.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_initial_state() {
        let conv = Conversation::new("c-1", "rules", "build X", serde_json::Value::Null, 10, 1000);
        assert_eq!(conv.state, ConversationState::Init);
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.iteration, 0);
        assert_eq!(conv.last_applied_event_id, 0);
        assert!(conv.worker_session_id.is_none());
        assert!(conv.transcript.is_empty());
        assert!(!conv.is_terminal());
    }

    #[test]
    fn test_serde_round_trip_preserves_staging() {
        let mut conv =
            Conversation::new("c-2", "", "task", serde_json::json!({"repository": "o/r"}), 3, 5);
        conv.pending_event = Some(PendingEvent {
            id: 12,
            content: "wrote server.js".to_string(),
            first_seen_at: 900,
        });
        conv.cooldown_started_at = Some(850);

        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pending_event, conv.pending_event);
        assert_eq!(back.cooldown_started_at, Some(850));
        assert_eq!(back.metadata, conv.metadata);
    }

    #[test]
    fn test_snapshot_reflects_record() {
        let mut conv = Conversation::new("c-3", "", "task", serde_json::Value::Null, 5, 5);
        conv.iteration = 2;
        conv.last_applied_event_id = 7;
        let snapshot = conv.snapshot();
        assert_eq!(snapshot.id, "c-3");
        assert_eq!(snapshot.iteration, 2);
        assert_eq!(snapshot.last_applied_event_id, 7);
        assert_eq!(snapshot.max_iterations, 5);
    }
}
