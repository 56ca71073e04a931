/// Conversation persistence operations
///
/// One row per conversation; the transcript and staged event are stored as
/// JSON columns. All queries are parameterized.
use anyhow::{bail, Context, Result};
use sdk::types::{ConversationState, ConversationStatus};
use sqlx::{Row, SqlitePool};

use crate::orchestrator::{Conversation, PendingEvent};

fn parse_state(s: &str) -> Result<ConversationState> {
    match s {
        "init" => Ok(ConversationState::Init),
        "awaiting_worker" => Ok(ConversationState::AwaitingWorker),
        "done" => Ok(ConversationState::Done),
        other => bail!("unknown conversation state in database: {}", other),
    }
}

fn parse_status(s: &str) -> Result<ConversationStatus> {
    match s {
        "active" => Ok(ConversationStatus::Active),
        "stopped" => Ok(ConversationStatus::Stopped),
        other => bail!("unknown conversation status in database: {}", other),
    }
}

/// Repository for conversation records
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a freshly created conversation
    pub async fn insert(&self, conv: &Conversation) -> Result<()> {
        let transcript =
            serde_json::to_string(&conv.transcript).context("Failed to serialize transcript")?;
        let pending = conv
            .pending_event
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize pending event")?;
        let metadata =
            serde_json::to_string(&conv.metadata).context("Failed to serialize metadata")?;

        sqlx::query(
            "INSERT INTO conversations (id, state, status, stop_reason, iteration, max_iterations, \
             task_context, first_message, metadata, worker_session_id, last_applied_event_id, \
             pending_event, cooldown_started_at, transcript, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conv.id)
        .bind(conv.state.as_str())
        .bind(conv.status.as_str())
        .bind(&conv.stop_reason)
        .bind(conv.iteration as i64)
        .bind(conv.max_iterations as i64)
        .bind(&conv.task_context)
        .bind(&conv.first_message)
        .bind(metadata)
        .bind(&conv.worker_session_id)
        .bind(conv.last_applied_event_id)
        .bind(pending)
        .bind(conv.cooldown_started_at)
        .bind(transcript)
        .bind(conv.created_at)
        .bind(conv.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert conversation")?;

        Ok(())
    }

    /// Persist the mutable fields after a wake-up
    pub async fn save(&self, conv: &Conversation) -> Result<()> {
        let transcript =
            serde_json::to_string(&conv.transcript).context("Failed to serialize transcript")?;
        let pending = conv
            .pending_event
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize pending event")?;

        sqlx::query(
            "UPDATE conversations SET state = ?, status = ?, stop_reason = ?, iteration = ?, \
             worker_session_id = ?, last_applied_event_id = ?, pending_event = ?, \
             cooldown_started_at = ?, transcript = ?, updated_at = ? WHERE id = ?",
        )
        .bind(conv.state.as_str())
        .bind(conv.status.as_str())
        .bind(&conv.stop_reason)
        .bind(conv.iteration as i64)
        .bind(&conv.worker_session_id)
        .bind(conv.last_applied_event_id)
        .bind(pending)
        .bind(conv.cooldown_started_at)
        .bind(transcript)
        .bind(conv.updated_at)
        .bind(&conv.id)
        .execute(&self.pool)
        .await
        .context("Failed to save conversation")?;

        Ok(())
    }

    /// Load a conversation by id
    pub async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, state, status, stop_reason, iteration, max_iterations, task_context, \
             first_message, metadata, worker_session_id, last_applied_event_id, pending_event, \
             cooldown_started_at, transcript, created_at, updated_at \
             FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch conversation")?;

        let Some(r) = row else {
            return Ok(None);
        };

        let transcript = serde_json::from_str(&r.get::<String, _>("transcript"))
            .context("Failed to parse transcript")?;
        let pending_event: Option<PendingEvent> = r
            .get::<Option<String>, _>("pending_event")
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Failed to parse pending event")?;
        let metadata = serde_json::from_str(&r.get::<String, _>("metadata"))
            .context("Failed to parse metadata")?;

        Ok(Some(Conversation {
            id: r.get("id"),
            state: parse_state(&r.get::<String, _>("state"))?,
            status: parse_status(&r.get::<String, _>("status"))?,
            stop_reason: r.get("stop_reason"),
            iteration: r.get::<i64, _>("iteration") as u32,
            max_iterations: r.get::<i64, _>("max_iterations") as u32,
            task_context: r.get("task_context"),
            first_message: r.get("first_message"),
            metadata,
            worker_session_id: r.get("worker_session_id"),
            last_applied_event_id: r.get("last_applied_event_id"),
            pending_event,
            cooldown_started_at: r.get("cooldown_started_at"),
            transcript,
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Ids of conversations that are still being driven.
    ///
    /// Used at startup to reschedule wake-ups for conversations that were
    /// in flight when the process last stopped.
    pub async fn list_active_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM conversations WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list active conversations")?;

        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }
}
