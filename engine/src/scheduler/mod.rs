//! Per-conversation wake-up timers
//!
//! The orchestrator needs exactly one primitive from its host: "wake me for
//! this conversation after this delay, replacing any wake-up already
//! pending". `WakeScheduler` provides it with one timer task per
//! conversation; fired wake-ups are delivered as conversation ids over a
//! bounded channel that the runtime drains.
//!
//! Scheduling replaces any pending timer for the same conversation, and
//! cancelling removes it, so a terminated conversation never receives a
//! stray timer-driven wake-up from here. (The runtime still treats a stray
//! wake-up as a no-op.)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Channel buffer size for fired wake-ups
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Replaceable one-pending-per-conversation timers
pub struct WakeScheduler {
    tx: mpsc::Sender<String>,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl WakeScheduler {
    /// Create a scheduler and the receiver its wake-ups fire into
    pub fn new() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        (
            Self {
                tx,
                timers: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        )
    }

    /// Schedule a wake-up, replacing any pending one for this conversation
    pub async fn schedule(&self, conversation_id: &str, delay: Duration) {
        let id = conversation_id.to_string();
        let tx = self.tx.clone();
        let timers = Arc::clone(&self.timers);

        let mut guard = self.timers.lock().await;
        if let Some(previous) = guard.remove(&id) {
            previous.abort();
        }

        debug!(conversation_id = %id, delay_ms = delay.as_millis() as u64, "wake-up scheduled");

        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Drop the finished timer entry before delivering, so a handler
            // rescheduling from inside the wake never races its own entry.
            timers.lock().await.remove(&task_id);
            tx.send(task_id).await.ok();
        });

        guard.insert(id, handle);
    }

    /// Cancel the pending wake-up for a conversation, if any
    pub async fn cancel(&self, conversation_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(conversation_id) {
            handle.abort();
            debug!(conversation_id, "pending wake-up cancelled");
        }
    }

    /// Number of timers currently pending
    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scheduled_wake_fires_with_id() {
        let (scheduler, mut rx) = WakeScheduler::new();
        scheduler.schedule("c-1", Duration::from_millis(10)).await;

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("wake-up did not fire")
            .unwrap();
        assert_eq!(fired, "c-1");
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test]
    async fn test_reschedule_replaces_pending_wake() {
        let (scheduler, mut rx) = WakeScheduler::new();
        scheduler.schedule("c-1", Duration::from_secs(30)).await;
        scheduler.schedule("c-1", Duration::from_millis(10)).await;

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("replacement wake-up did not fire")
            .unwrap();
        assert_eq!(fired, "c-1");

        // The replaced 30s timer must not fire a second wake-up.
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let (scheduler, mut rx) = WakeScheduler::new();
        scheduler.schedule("c-1", Duration::from_millis(20)).await;
        scheduler.cancel("c-1").await;

        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err());
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let (scheduler, mut rx) = WakeScheduler::new();
        scheduler.schedule("c-1", Duration::from_millis(10)).await;
        scheduler.schedule("c-2", Duration::from_millis(20)).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, "c-1");
        assert_eq!(second, "c-2");
    }
}
