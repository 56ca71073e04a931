//! Conversation orchestrator
//!
//! This module implements the state machine that drives one conversation:
//!
//! 1. `INIT` (runs once): consult the planner with the caller's task,
//!    seed a worker session with the planner's opening instruction
//! 2. `AWAITING_WORKER` (every subsequent wake-up): poll the worker's
//!    latest event, debounce bursts through the settlement policy, and on
//!    settlement forward consolidated progress to the planner
//! 3. `DONE` (terminal): reached on the completion sentinel, the iteration
//!    cap, or any upstream failure; sticky, so later wake-ups are no-ops
//!
//! The handler is synchronous from the state machine's perspective: each
//! outbound call resolves or times out before the next step runs. The
//! caller supplies the clock, persists the mutated record, and schedules
//! the returned wake-up delay.

use std::sync::Arc;
use std::time::Duration;

use sdk::types::{ConversationState, ConversationStatus, TranscriptEntry};
use tracing::{debug, info};

use crate::config::OrchestratorConfig;
use crate::directives;
use crate::planner::Planner;
use crate::worker::Worker;

pub mod conversation;
pub mod settlement;

pub use conversation::{
    Conversation, PendingEvent, STOP_BY_REQUEST, STOP_INVALID_STATE, STOP_MAX_ITERATIONS,
    STOP_PLANNER_DONE,
};
pub use settlement::{SettleDecision, SettlementPolicy};

/// Poll cadence derived from config
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Delay before the first event check after session creation
    pub first_poll: Duration,

    /// Poll interval while a staged event waits to settle
    pub active_poll: Duration,

    /// Poll interval while the worker is quiet
    pub idle_poll: Duration,
}

impl Timing {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            first_poll: Duration::from_millis(config.first_poll_delay_ms),
            active_poll: Duration::from_secs(config.active_poll_secs),
            idle_poll: Duration::from_secs(config.idle_poll_secs),
        }
    }
}

/// What a wake-up handler decided about the future
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeOutcome {
    /// Schedule the next wake-up after this delay; `None` cancels
    pub next_wake: Option<Duration>,
}

impl WakeOutcome {
    fn after(delay: Duration) -> Self {
        Self {
            next_wake: Some(delay),
        }
    }

    fn terminal() -> Self {
        Self { next_wake: None }
    }
}

/// Build the system directive framing the whole conversation.
///
/// Teaches the planner the completion sentinel and the inline command
/// grammar, then appends the caller's task rules.
pub fn system_directive(task_context: &str) -> String {
    let mut directive = format!(
        "You are supervising an autonomous coding agent. The agent executes your \
         instructions and reports progress; you review each report and reply with \
         the next instruction.\n\
         \n\
         Reply rules:\n\
         - When the task is fully complete, include the literal token {} in your reply.\n\
         - To halt the agent with a correction, write: *[STOP]* CONTEXT: \"short reason\" \
         followed by your correction.\n\
         - To call the agent backend's API directly, write: ACTION:METHOD:PATH followed \
         by a JSON body.",
        directives::COMPLETION_SENTINEL
    );

    if !task_context.trim().is_empty() {
        directive.push_str("\n\nTask rules:\n");
        directive.push_str(task_context);
    }

    directive
}

/// The per-conversation state machine
///
/// Holds no conversation state of its own; everything mutable lives in the
/// `Conversation` record passed into each wake-up.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    worker: Arc<dyn Worker>,
    policy: SettlementPolicy,
    timing: Timing,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        worker: Arc<dyn Worker>,
        policy: SettlementPolicy,
        timing: Timing,
    ) -> Self {
        Self {
            planner,
            worker,
            policy,
            timing,
        }
    }

    /// Run one wake-up against a conversation.
    ///
    /// A terminal conversation is left untouched and schedules nothing.
    pub async fn handle_wake(&self, conv: &mut Conversation, now_ms: i64) -> WakeOutcome {
        if conv.is_terminal() {
            debug!(conversation_id = %conv.id, "stray wake-up on terminal conversation");
            return WakeOutcome::terminal();
        }

        conv.updated_at = now_ms;

        match conv.state {
            ConversationState::Init => self.handle_init(conv).await,
            ConversationState::AwaitingWorker => self.handle_awaiting_worker(conv, now_ms).await,
            ConversationState::Done => WakeOutcome::terminal(),
        }
    }

    /// Terminate a conversation (idempotent).
    ///
    /// Clears all transient staging so a retained record carries no stale
    /// cooldown bookkeeping. The caller cancels the pending wake-up because
    /// `next_wake` comes back as `None`.
    pub fn terminate(&self, conv: &mut Conversation, reason: &str) -> WakeOutcome {
        if conv.is_terminal() {
            return WakeOutcome::terminal();
        }

        conv.state = ConversationState::Done;
        conv.status = ConversationStatus::Stopped;
        conv.stop_reason = Some(reason.to_string());
        conv.pending_event = None;
        conv.cooldown_started_at = None;

        info!(conversation_id = %conv.id, reason, iteration = conv.iteration, "conversation stopped");
        WakeOutcome::terminal()
    }

    /// First wake-up: consult the planner, seed the worker session.
    async fn handle_init(&self, conv: &mut Conversation) -> WakeOutcome {
        conv.transcript
            .push(TranscriptEntry::system(system_directive(&conv.task_context)));
        conv.transcript
            .push(TranscriptEntry::worker(conv.first_message.clone()));

        let reply = match self.planner.send(&conv.transcript).await {
            Ok(reply) => reply,
            Err(e) => return self.terminate(conv, &format!("planner call failed: {}", e)),
        };

        conv.transcript.push(TranscriptEntry::planner(reply.clone()));

        if directives::is_complete(&reply) {
            return self.terminate(conv, STOP_PLANNER_DONE);
        }

        conv.iteration += 1;

        let session_id = match self.worker.create_session(&reply, &conv.metadata).await {
            Ok(session_id) => session_id,
            Err(e) => return self.terminate(conv, &format!("worker session create failed: {}", e)),
        };

        info!(conversation_id = %conv.id, session_id = %session_id, "worker session created");
        conv.worker_session_id = Some(session_id);
        conv.state = ConversationState::AwaitingWorker;

        WakeOutcome::after(self.timing.first_poll)
    }

    /// Steady state: poll, stage, settle, flush.
    async fn handle_awaiting_worker(&self, conv: &mut Conversation, now_ms: i64) -> WakeOutcome {
        if conv.iteration >= conv.max_iterations {
            return self.terminate(conv, STOP_MAX_ITERATIONS);
        }

        let session_id = match conv.worker_session_id.clone() {
            Some(session_id) => session_id,
            None => return self.terminate(conv, STOP_INVALID_STATE),
        };

        let latest = match self.worker.fetch_latest_event(&session_id).await {
            Ok(latest) => latest,
            Err(e) => return self.terminate(conv, &format!("worker event fetch failed: {}", e)),
        };

        // The staged event, if any, is always the newest one seen so far.
        let high_water = conv
            .pending_event
            .as_ref()
            .map(|p| p.id)
            .unwrap_or(conv.last_applied_event_id)
            .max(conv.last_applied_event_id);

        match latest {
            Some(event) if event.id > high_water => {
                if event.content.is_empty() {
                    // No-op event: advance the pointer so it is never
                    // reprocessed, but stage nothing.
                    debug!(conversation_id = %conv.id, event_id = event.id, "empty event skipped");
                    conv.last_applied_event_id = event.id;
                    return self.settle_or_poll(conv, now_ms).await;
                }

                let previous_arrival = conv.pending_event.as_ref().map(|p| p.first_seen_at);

                conv.pending_event = Some(PendingEvent {
                    id: event.id,
                    content: event.content,
                    first_seen_at: now_ms,
                });
                if conv.cooldown_started_at.is_none() {
                    conv.cooldown_started_at = Some(now_ms);
                }

                // The worker already went quiet before this event arrived;
                // waiting out another cooldown would only add latency.
                if let Some(previous) = previous_arrival {
                    if self.policy.arrival_gap_exceeds_cooldown(previous, now_ms) {
                        return self.flush(conv).await;
                    }
                }

                self.settle_or_poll(conv, now_ms).await
            }
            _ => self.settle_or_poll(conv, now_ms).await,
        }
    }

    /// Evaluate the settlement policy for a staged event, or fall back to
    /// the idle poll when nothing is staged.
    async fn settle_or_poll(&self, conv: &mut Conversation, now_ms: i64) -> WakeOutcome {
        let Some(pending) = conv.pending_event.as_ref() else {
            return WakeOutcome::after(self.timing.idle_poll);
        };

        let window_opened = conv.cooldown_started_at.unwrap_or(pending.first_seen_at);
        match self
            .policy
            .evaluate(pending.first_seen_at, window_opened, now_ms)
        {
            SettleDecision::Flush => self.flush(conv).await,
            SettleDecision::Wait => WakeOutcome::after(self.timing.active_poll),
        }
    }

    /// Forward a settled event to the planner and relay the reply.
    async fn flush(&self, conv: &mut Conversation) -> WakeOutcome {
        let Some(pending) = conv.pending_event.take() else {
            return WakeOutcome::after(self.timing.idle_poll);
        };
        conv.cooldown_started_at = None;
        conv.last_applied_event_id = conv.last_applied_event_id.max(pending.id);

        debug!(
            conversation_id = %conv.id,
            event_id = pending.id,
            iteration = conv.iteration,
            "flushing settled worker event"
        );

        conv.transcript.push(TranscriptEntry::worker(format!(
            "[iteration {}/{}] {}",
            conv.iteration, conv.max_iterations, pending.content
        )));

        let reply = match self.planner.send(&conv.transcript).await {
            Ok(reply) => reply,
            Err(e) => return self.terminate(conv, &format!("planner call failed: {}", e)),
        };

        conv.transcript.push(TranscriptEntry::planner(reply.clone()));

        if directives::is_complete(&reply) {
            return self.terminate(conv, STOP_PLANNER_DONE);
        }

        conv.iteration += 1;

        let session_id = match conv.worker_session_id.clone() {
            Some(session_id) => session_id,
            None => return self.terminate(conv, STOP_INVALID_STATE),
        };

        if let Err(e) = self.worker.push_message(&session_id, &reply).await {
            return self.terminate(conv, &format!("worker push failed: {}", e));
        }

        WakeOutcome::after(self.timing.idle_poll)
    }
}
