// automatix-llm/src/budget.rs
// ============================================================================
// Module: Budget Gate
// Description: Per-user daily USD spend cap enforced before an upstream
//              LLM call is made.
// Purpose: Stop runaway LLM spend at the call site rather than after the
//          fact.
// Dependencies: automatix_core, tokio
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use automatix_core::Clock;
use tokio::sync::Mutex;

/// The outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// The call may proceed.
    Allowed,
    /// The call must not proceed.
    Denied,
}

/// Enforces a spending cap before an LLM call reaches upstream.
#[async_trait]
pub trait BudgetGate: Send + Sync {
    /// Checks whether a call estimated to cost `estimated_cost_usd` for
    /// `user_id` within `workflow_id` may proceed. Implementations that
    /// allow the call are expected to record the spend for future checks;
    /// [`InMemoryBudgetGate`] does so atomically within this call.
    async fn check(&self, estimated_cost_usd: f64, user_id: &str, workflow_id: &str) -> BudgetDecision;
}

#[derive(Default, Clone, Copy)]
struct DailySpend {
    /// The UTC day this accumulator covers, as a day-number since the epoch.
    day_unix: i64,
    /// Total spend recorded for that day.
    spent_usd: f64,
}

/// An in-memory [`BudgetGate`] tracking per-user spend within the current
/// UTC day. Spend does not persist across process restarts; a
/// persistence-backed gate can be layered in front of this one without
/// changing the trait.
pub struct InMemoryBudgetGate {
    /// Clock used to determine the current UTC day.
    clock: Arc<dyn Clock>,
    /// The per-user daily USD cap.
    daily_cap_usd: f64,
    /// Accumulated spend per user.
    spend: Mutex<HashMap<String, DailySpend>>,
}

impl InMemoryBudgetGate {
    /// Builds a budget gate capping each user's spend at `daily_cap_usd`
    /// per UTC day, per the platform's `llm.budget.daily` configuration.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, daily_cap_usd: f64) -> Self {
        Self { clock, daily_cap_usd, spend: Mutex::new(HashMap::new()) }
    }

    /// The current UTC day, as a day-number since the epoch.
    fn current_day_unix(&self) -> i64 {
        self.clock.now_unix_millis().div_euclid(86_400_000)
    }
}

#[async_trait]
impl BudgetGate for InMemoryBudgetGate {
    async fn check(&self, estimated_cost_usd: f64, user_id: &str, _workflow_id: &str) -> BudgetDecision {
        let today = self.current_day_unix();
        let mut spend = self.spend.lock().await;
        let entry = spend.entry(user_id.to_string()).or_default();
        if entry.day_unix != today {
            entry.day_unix = today;
            entry.spent_usd = 0.0;
        }
        if entry.spent_usd + estimated_cost_usd > self.daily_cap_usd {
            return BudgetDecision::Denied;
        }
        entry.spent_usd += estimated_cost_usd;
        BudgetDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::Ordering;

    use time::OffsetDateTime;

    use super::*;

    #[derive(Debug)]
    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH
        }

        fn now_unix_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn call_within_cap_is_allowed() {
        let gate = InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 1.0);
        assert_eq!(gate.check(0.05, "user-1", "wf-1").await, BudgetDecision::Allowed);
    }

    #[tokio::test]
    async fn call_exceeding_cap_is_denied() {
        let gate = InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 0.01);
        assert_eq!(gate.check(0.05, "user-1", "wf-1").await, BudgetDecision::Denied);
    }

    #[tokio::test]
    async fn spend_accumulates_within_the_same_day() {
        let gate = InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 0.1);
        assert_eq!(gate.check(0.06, "user-1", "wf-1").await, BudgetDecision::Allowed);
        assert_eq!(gate.check(0.06, "user-1", "wf-1").await, BudgetDecision::Denied);
    }

    #[tokio::test]
    async fn spend_resets_on_a_new_day() {
        let clock = Arc::new(FixedClock(AtomicI64::new(0)));
        let gate = InMemoryBudgetGate::new(clock.clone(), 0.1);
        assert_eq!(gate.check(0.09, "user-1", "wf-1").await, BudgetDecision::Allowed);
        clock.0.store(86_400_000, Ordering::SeqCst);
        assert_eq!(gate.check(0.09, "user-1", "wf-1").await, BudgetDecision::Allowed);
    }

    #[tokio::test]
    async fn users_are_tracked_independently() {
        let gate = InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 0.05);
        assert_eq!(gate.check(0.05, "user-1", "wf-1").await, BudgetDecision::Allowed);
        assert_eq!(gate.check(0.05, "user-2", "wf-1").await, BudgetDecision::Allowed);
    }
}
