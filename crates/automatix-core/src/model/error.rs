// automatix-core/src/model/error.rs
// ============================================================================
// Module: Automatix Error Taxonomy
// Description: The cross-component error classification shared by every
//              crate in the workspace.
// Purpose: Give the Retry/DLQ Manager one stable vocabulary to classify
//          failures against, independent of which component raised them.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each crate defines its own `thiserror` error enum at the boundary it
//! owns, but every one of those errors is classifiable into one
//! [`ErrorKind`]. The Workflow Runtime is the sole authority that turns a
//! `RuntimeFailure` into a `NodeExecution` state transition.

use serde::Deserialize;
use serde::Serialize;

use crate::model::identifiers::CorrelationId;

/// The language-neutral error taxonomy every failure in the system maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed graph, unknown node type, invalid param reference. Terminal.
    Validation,
    /// Missing or expired credentials for a connector. Terminal unless the
    /// caller supplies fresh credentials.
    Credential,
    /// Webhook signature verification failed. Not an execution failure.
    Signature,
    /// Upstream 429 or local bucket empty. Retryable with `retryAfter`.
    RateLimited,
    /// Network, DNS, or 5xx transport failure. Retryable per policy.
    TransientTransport,
    /// Deadline exceeded. Retryable.
    Timeout,
    /// LLM JSON output did not match schema after one repair. Non-retryable
    /// by default.
    SchemaValidationFailed,
    /// LLM budget gate denied the call. Non-retryable; surfaces to user.
    BudgetExceeded,
    /// Execution was cancelled. Terminal.
    Cancelled,
    /// Programmer error or assertion violation. Logged; node fails.
    Internal,
}

impl ErrorKind {
    /// Returns whether this error kind is retryable in isolation, ignoring
    /// any per-node override the caller's `RetryPolicy` applies on top.
    #[must_use]
    pub const fn is_retryable_by_default(self) -> bool {
        matches!(self, Self::RateLimited | Self::TransientTransport | Self::Timeout)
    }
}

/// A classified failure carrying enough context to become a `NodeExecution`
/// state transition and a user-visible error report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeFailure {
    /// The error taxonomy classification.
    pub kind: ErrorKind,
    /// A short, human-readable message.
    pub message: String,
    /// When set, the caller should not retry before this many seconds have
    /// elapsed (derived from a `Retry-After` header, for example).
    pub retryable_after_secs: Option<u64>,
    /// The execution-scoped correlation id, so the failure can be traced in
    /// the observability timeline.
    pub correlation_id: CorrelationId,
}

impl RuntimeFailure {
    /// Builds a new classified failure.
    #[must_use]
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self { kind, message: message.into(), retryable_after_secs: None, correlation_id }
    }

    /// Attaches a `retryable_after_secs` hint (used for `RateLimited` with an
    /// explicit `Retry-After`).
    #[must_use]
    pub fn with_retryable_after_secs(mut self, secs: u64) -> Self {
        self.retryable_after_secs = Some(secs);
        self
    }
}

impl std::fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {} (correlation={})", self.kind, self.message, self.correlation_id)
    }
}

impl std::error::Error for RuntimeFailure {}
