//! Conversation arena and wake dispatch
//!
//! The runtime owns every live conversation: it creates records, drains
//! fired wake-ups from the scheduler, and runs the orchestrator's handler
//! with a per-conversation lock so exactly one wake-up (or external stop)
//! touches a record at a time. Different conversations share nothing and
//! proceed fully in parallel.
//!
//! Inline directives found in planner replies are dispatched here, after
//! the handler has run and persisted: the orchestrator state machine never
//! sees them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sdk::errors::EngineError;
use sdk::types::{ConversationSnapshot, CreateConversationRequest, Role};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::ConversationRepository;
use crate::directives::{self, Directive};
use crate::orchestrator::{Conversation, Orchestrator, STOP_BY_REQUEST};
use crate::scheduler::WakeScheduler;
use crate::worker::Worker;

/// Current time as unix epoch milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Owner of all conversation state transitions
pub struct Runtime {
    repo: ConversationRepository,
    orchestrator: Orchestrator,
    worker: Arc<dyn Worker>,
    scheduler: WakeScheduler,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    default_max_iterations: u32,
}

impl Runtime {
    pub fn new(
        repo: ConversationRepository,
        orchestrator: Orchestrator,
        worker: Arc<dyn Worker>,
        scheduler: WakeScheduler,
        default_max_iterations: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            orchestrator,
            worker,
            scheduler,
            locks: Mutex::new(HashMap::new()),
            default_max_iterations,
        })
    }

    /// Drain fired wake-ups; each runs as its own task so one conversation's
    /// slow upstream call never delays another's wake-up.
    pub fn spawn_driver(self: &Arc<Self>, mut rx: mpsc::Receiver<String>) {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(conversation_id) = rx.recv().await {
                let runtime = Arc::clone(&runtime);
                tokio::spawn(async move {
                    runtime.wake(&conversation_id).await;
                });
            }
        });
    }

    /// Reschedule wake-ups for conversations that were active when the
    /// process last stopped. Returns how many were recovered.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let ids = self.repo.list_active_ids().await?;
        for id in &ids {
            self.scheduler.schedule(id, Duration::ZERO).await;
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "recovered active conversations");
        }
        Ok(ids.len())
    }

    /// Create a conversation: validate, persist, schedule the first
    /// wake-up. Never calls the planner or worker.
    pub async fn create(&self, request: CreateConversationRequest) -> Result<String, EngineError> {
        let first_message = request.first_message.trim();
        if first_message.is_empty() {
            return Err(EngineError::Config(
                "first_message must not be empty".to_string(),
            ));
        }

        let max_iterations = request.max_iterations.unwrap_or(self.default_max_iterations);
        if max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let conv = Conversation::new(
            &id,
            request.task_context,
            first_message,
            request.metadata,
            max_iterations,
            now_ms(),
        );

        self.repo
            .insert(&conv)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        self.scheduler.schedule(&id, Duration::ZERO).await;

        info!(conversation_id = %id, max_iterations, "conversation created");
        Ok(id)
    }

    /// Read-only view of a conversation
    pub async fn status(&self, conversation_id: &str) -> Result<ConversationSnapshot, EngineError> {
        let conv = self
            .repo
            .get(conversation_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))?;

        Ok(conv.snapshot())
    }

    /// Force-stop a conversation.
    ///
    /// Takes the conversation lock first, so a stop arriving mid-handler
    /// only applies at the handler boundary; an already-dispatched upstream
    /// call completes and its result is discarded with the record already
    /// terminal.
    pub async fn force_stop(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationSnapshot, EngineError> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let mut conv = self
            .repo
            .get(conversation_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))?;

        if !conv.is_terminal() {
            self.orchestrator.terminate(&mut conv, STOP_BY_REQUEST);
            conv.updated_at = now_ms();
            self.repo
                .save(&conv)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;
        }

        self.scheduler.cancel(conversation_id).await;
        Ok(conv.snapshot())
    }

    /// Run one wake-up. Errors are logged, never propagated: a wake-up has
    /// no caller to answer to.
    pub async fn wake(&self, conversation_id: &str) {
        if let Err(e) = self.wake_inner(conversation_id).await {
            error!(conversation_id, "wake-up failed: {:#}", e);
        }
    }

    async fn wake_inner(&self, conversation_id: &str) -> anyhow::Result<()> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let Some(mut conv) = self.repo.get(conversation_id).await? else {
            warn!(conversation_id, "wake-up for unknown conversation");
            return Ok(());
        };

        if conv.is_terminal() {
            // Stray wake-up against a finished conversation.
            self.scheduler.cancel(conversation_id).await;
            return Ok(());
        }

        let transcript_len = conv.transcript.len();
        let outcome = self.orchestrator.handle_wake(&mut conv, now_ms()).await;
        self.repo.save(&conv).await?;

        let mut next_wake = outcome.next_wake;
        if self.dispatch_directives(&mut conv, transcript_len).await? {
            next_wake = None;
        }

        match next_wake {
            Some(delay) => self.scheduler.schedule(conversation_id, delay).await,
            None => self.scheduler.cancel(conversation_id).await,
        }

        Ok(())
    }

    /// Apply inline commands from planner turns appended during this wake.
    ///
    /// Returns true when a stop directive terminated the conversation.
    async fn dispatch_directives(
        &self,
        conv: &mut Conversation,
        from_index: usize,
    ) -> anyhow::Result<bool> {
        let found: Vec<Directive> = conv.transcript[from_index..]
            .iter()
            .filter(|entry| entry.role == Role::Planner)
            .map(|entry| directives::extract(&entry.content))
            .filter(|d| *d != Directive::None)
            .collect();

        let mut stopped = false;
        for directive in found {
            match directive {
                Directive::Stop { reason } => {
                    if !conv.is_terminal() {
                        info!(conversation_id = %conv.id, %reason, "planner stop directive");
                        self.orchestrator
                            .terminate(conv, &format!("planner requested stop: {}", reason));
                        self.repo.save(conv).await?;
                        stopped = true;
                    }
                }
                Directive::EndpointCall { method, path, body } => {
                    // Out-of-band; a failure here is logged, not fatal.
                    if let Err(e) = self.worker.raw_call(&method, &path, body).await {
                        warn!(conversation_id = %conv.id, "directive dispatch failed: {}", e);
                    }
                }
                Directive::None => {}
            }
        }

        Ok(stopped)
    }

    async fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
