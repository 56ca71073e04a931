//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the Foreman
//! engine. All errors implement the `ForemanErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Error messages are safe to surface to API callers: they carry upstream
//! detail (status codes, reason text) but no credentials.

use thiserror::Error;

/// Trait for Foreman error extensions
///
/// Provides additional context for errors: a hint safe to display to end
/// users, and whether the error is recoverable without operator action.
pub trait ForemanErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried with a new conversation.
    /// Non-recoverable errors typically require a configuration fix.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// Every failure a caller can observe maps onto one of these variants.
/// Planner and worker failures are fatal to the conversation they occur in;
/// the conversation records the error text as its stop reason.
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors (rejected synchronously, never enter a conversation)
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Planner upstream errors
    #[error("Planner error: {0}")]
    Planner(String),

    // Worker upstream errors
    #[error("Worker error: {0}")]
    Worker(String),

    // State machine invariant violations
    #[error("Invalid conversation state: {0}")]
    InvalidState(String),

    // Unknown conversation id
    #[error("Conversation not found: {0}")]
    NotFound(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForemanErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml and request parameters",
            Self::Database(_) => "Database operation failed. Try restarting the service",
            Self::Planner(_) => "Planner unavailable. Check the API key and network",
            Self::Worker(_) => "Worker backend unavailable. Check its URL and health",
            Self::InvalidState(_) => "Conversation reached an unexpected state. Start a new one",
            Self::NotFound(_) => "No conversation with that id exists",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // A bad config needs fixing before anything will work
            Self::Config(_) => false,

            // All other errors are scoped to one conversation or one call
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_detail() {
        let err = EngineError::Planner("status 500: upstream exploded".to_string());
        assert_eq!(err.to_string(), "Planner error: status 500: upstream exploded");
    }

    #[test]
    fn test_config_errors_are_not_recoverable() {
        assert!(!EngineError::Config("bad cooldown".into()).is_recoverable());
        assert!(EngineError::Worker("503".into()).is_recoverable());
        assert!(EngineError::NotFound("abc".into()).is_recoverable());
    }

    #[test]
    fn test_user_hints_are_nonempty() {
        let errors = [
            EngineError::Config("x".into()),
            EngineError::Database("x".into()),
            EngineError::Planner("x".into()),
            EngineError::Worker("x".into()),
            EngineError::InvalidState("x".into()),
            EngineError::NotFound("x".into()),
        ];
        for err in errors {
            assert!(!err.user_hint().is_empty());
        }
    }
}
