// automatix-store-sqlite/src/retention.rs
// ============================================================================
// Module: Retention Policy
// Description: Configurable downsampling of node-execution detail after a
//              window, per the platform's Run Observability retention
//              policy.
// Purpose: Keep full per-node detail for a bounded window, then drop it
//          while leaving the owning Execution's aggregate record intact.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The platform's retention policy keeps full detail for 30 days by default
//! and downsamples to aggregates afterward. This store's downsampling is
//! deliberately narrow: it deletes `NodeExecution` and `DlqItem` rows for
//! executions whose `startTime` falls before the cutoff, leaving the
//! `Execution` row (which already carries the aggregate
//! `ExecutionMetadata`) untouched. A full statistical-rollup table is not
//! implemented; `stats()` always recomputes from whatever `Execution` rows
//! remain, so an operator who prunes aggressively will see degraded
//! percentile accuracy rather than a loss of the basic counts.

/// How long full per-node detail is retained before a call to
/// [`crate::store::SqliteRunLogStore::apply_retention`] prunes it.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Full detail is kept for this many seconds after an execution starts.
    pub full_detail_window_sec: u64,
}

impl Default for RetentionPolicy {
    /// 30 days, per the platform's default retention window.
    fn default() -> Self {
        Self { full_detail_window_sec: 30 * 24 * 60 * 60 }
    }
}

impl RetentionPolicy {
    /// Computes the unix-millis cutoff: executions started before this
    /// instant are eligible for detail pruning.
    #[must_use]
    pub fn cutoff_unix_millis(&self, now_unix_millis: i64) -> i64 {
        now_unix_millis - i64::try_from(self.full_detail_window_sec.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_subtracts_the_configured_window() {
        let policy = RetentionPolicy { full_detail_window_sec: 60 };
        assert_eq!(policy.cutoff_unix_millis(100_000), 40_000);
    }

    #[test]
    fn default_window_is_thirty_days() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.full_detail_window_sec, 30 * 24 * 60 * 60);
    }
}
