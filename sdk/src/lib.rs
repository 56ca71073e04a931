//! Foreman SDK
//!
//! Shared library providing the wire types, error taxonomy, and a typed HTTP
//! client for the Foreman supervisor service. This crate is used by the
//! engine and by external callers driving the API.

/// Error types and handling
pub mod errors;

/// Conversation and API wire types
pub mod types;

/// Typed HTTP client for the Foreman API
pub mod client;

// Re-export commonly used types
pub use client::{ClientError, ForemanClient};
pub use errors::{EngineError, ForemanErrorExt};
pub use types::{
    ConversationSnapshot, ConversationState, ConversationStatus, CreateConversationRequest,
    CreateConversationResponse, PendingEvent, Role, StopConversationResponse, TranscriptEntry,
};
