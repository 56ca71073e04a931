//! Planner client
//!
//! The planner is the service that produces natural-language instructions
//! and decides when a task is complete. The `Planner` trait defines the
//! single operation the orchestrator needs; `ChatPlanner` implements it
//! against an OpenAI-compatible chat-completions endpoint.
//!
//! Calls are never retried here. A planner failure is fatal to the
//! conversation it occurs in, and that decision belongs to the orchestrator.

use async_trait::async_trait;
use sdk::types::TranscriptEntry;

pub mod chat;

pub use chat::ChatPlanner;

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Errors that can occur when calling the planner
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Planner abstraction consumed by the orchestrator
#[async_trait]
pub trait Planner: Send + Sync {
    /// Send the full ordered transcript; returns the planner's next message.
    ///
    /// The transcript carries the system directive followed by alternating
    /// planner/worker turns. The reply may contain the completion sentinel
    /// or inline directives anywhere in the text.
    async fn send(&self, transcript: &[TranscriptEntry]) -> Result<String>;
}
