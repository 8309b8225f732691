// automatix-server/src/metrics.rs
// ============================================================================
// Module: Metrics Sink
// Description: An in-memory MetricsSink implementation with a snapshot
//              accessor for the observability read-path.
// Purpose: Give operators a way to read counters/gauges without standing up
//          an external metrics backend; this is a seam, not an exporter.
// Dependencies: automatix_core, std::sync
// ============================================================================

//! ## Overview
//! [`SnapshotMetricsSink`] keeps every counter and gauge it has seen in
//! memory behind a `RwLock<BTreeMap<..>>` and exposes [`Self::snapshot`] for
//! handlers (or a future `/metrics` endpoint) to read. No push-based exporter
//! is wired up; per the ambient stack's scope, a Prometheus-format pull
//! endpoint is the deployment's concern to add at the HTTP layer if needed,
//! not this sink's.

use std::collections::BTreeMap;
use std::sync::RwLock;

use automatix_core::MetricsSink;

/// A point-in-time read of every counter and gauge this sink has recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Counter name to cumulative value.
    pub counters: BTreeMap<String, u64>,
    /// Gauge name to last-set value.
    pub gauges: BTreeMap<String, f64>,
}

/// An in-memory [`MetricsSink`] that accumulates counters and tracks the
/// last value set for each gauge.
#[derive(Debug, Default)]
pub struct SnapshotMetricsSink {
    counters: RwLock<BTreeMap<String, u64>>,
    gauges: RwLock<BTreeMap<String, f64>>,
}

impl SnapshotMetricsSink {
    /// Builds an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of every counter and gauge.
    ///
    /// # Panics
    /// Panics if an internal lock is poisoned by a prior panicking holder.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let gauges = self.gauges.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        MetricsSnapshot { counters: counters.clone(), gauges: gauges.clone() }
    }
}

impl MetricsSink for SnapshotMetricsSink {
    fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    fn set_gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        gauges.insert(name.to_string(), value);
    }
}
