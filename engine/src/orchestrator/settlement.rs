//! Settlement policy
//!
//! The worker tends to emit bursts of events while working through one
//! logical step. Forwarding each event to the planner would waste calls and
//! desynchronize turn-taking, so staged events are debounced: a staged
//! event settles once the worker has been quiet for `cooldown_ms`, or once
//! `max_cooldown_wait_ms` has passed since the window opened, whichever
//! comes first. The decision logic is pure; the orchestrator owns the
//! clock.

use crate::config::OrchestratorConfig;

/// Whether a staged event may be forwarded yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleDecision {
    /// Forward the staged event to the planner now
    Flush,

    /// Keep waiting; poll again on the active interval
    Wait,
}

/// Timing bounds for the debounce window
#[derive(Debug, Clone, Copy)]
pub struct SettlementPolicy {
    /// Quiet period that settles the staged event
    pub cooldown_ms: i64,

    /// Ceiling on total wait since the window opened
    pub max_cooldown_wait_ms: i64,
}

impl SettlementPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            cooldown_ms: (config.cooldown_secs * 1000) as i64,
            max_cooldown_wait_ms: (config.max_cooldown_wait_secs * 1000) as i64,
        }
    }

    /// Decide whether the staged event is settled.
    ///
    /// `last_arrival_ms` is when the most recent event was observed (the
    /// staged event always is the most recent one); `window_opened_ms` is
    /// when the current cooldown window first opened.
    pub fn evaluate(&self, last_arrival_ms: i64, window_opened_ms: i64, now_ms: i64) -> SettleDecision {
        if now_ms - last_arrival_ms >= self.cooldown_ms {
            return SettleDecision::Flush;
        }
        if now_ms - window_opened_ms >= self.max_cooldown_wait_ms {
            return SettleDecision::Flush;
        }
        SettleDecision::Wait
    }

    /// True when a newly observed event arrived after a gap that already
    /// exceeds the cooldown: the worker went quiet in between, so there is
    /// nothing to wait for.
    pub fn arrival_gap_exceeds_cooldown(&self, previous_arrival_ms: i64, now_ms: i64) -> bool {
        now_ms - previous_arrival_ms > self.cooldown_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SettlementPolicy {
        SettlementPolicy {
            cooldown_ms: 10_000,
            max_cooldown_wait_ms: 30_000,
        }
    }

    #[test]
    fn test_waits_while_events_are_fresh() {
        let p = policy();
        // Event arrived 1s ago, window opened 1s ago.
        assert_eq!(p.evaluate(1_000, 1_000, 2_000), SettleDecision::Wait);
        // Just under the quiet period.
        assert_eq!(p.evaluate(1_000, 1_000, 10_999), SettleDecision::Wait);
    }

    #[test]
    fn test_quiet_period_flushes() {
        let p = policy();
        assert_eq!(p.evaluate(1_000, 1_000, 11_000), SettleDecision::Flush);
        assert_eq!(p.evaluate(1_000, 1_000, 60_000), SettleDecision::Flush);
    }

    #[test]
    fn test_ceiling_flushes_despite_fresh_events() {
        let p = policy();
        // Bursting: the latest event is 1s old, but the window has been
        // open for the full ceiling.
        assert_eq!(p.evaluate(30_000, 1_000, 31_000), SettleDecision::Flush);
        // One tick earlier the ceiling has not been reached.
        assert_eq!(p.evaluate(30_000, 1_500, 31_000), SettleDecision::Wait);
    }

    #[test]
    fn test_burst_never_flushes_early() {
        let p = policy();
        // Events every second starting at t=0; no evaluation point before
        // a >= 10s gap or the 30s ceiling may flush.
        for t in (1_000..29_000).step_by(1_000) {
            let last_arrival = t - 1_000;
            assert_eq!(
                p.evaluate(last_arrival, 0, t),
                SettleDecision::Wait,
                "unexpected flush at t={}",
                t
            );
        }
        // At the ceiling it must flush even though events keep coming.
        assert_eq!(p.evaluate(29_000, 0, 30_000), SettleDecision::Flush);
    }

    #[test]
    fn test_arrival_gap_rule() {
        let p = policy();
        assert!(p.arrival_gap_exceeds_cooldown(0, 10_001));
        assert!(!p.arrival_gap_exceeds_cooldown(0, 10_000));
        assert!(!p.arrival_gap_exceeds_cooldown(5_000, 8_000));
    }

    #[test]
    fn test_from_config_converts_to_millis() {
        let config = OrchestratorConfig::default();
        let p = SettlementPolicy::from_config(&config);
        assert_eq!(p.cooldown_ms, config.cooldown_secs as i64 * 1000);
        assert_eq!(p.max_cooldown_wait_ms, config.max_cooldown_wait_secs as i64 * 1000);
        assert!(p.cooldown_ms < p.max_cooldown_wait_ms);
    }
}
