// automatix-core/src/model/retry.rs
// ============================================================================
// Module: Automatix Retry Policy
// Description: Per-node retry policy, error classification, and backoff
//              scheduling for the Retry/DLQ Manager.
// Purpose: Decide whether a failed node attempt is retried and when the next
//          attempt should run.
// Dependencies: serde, rand
// ============================================================================

//! ## Overview
//! The Retry/DLQ Manager lives inside the runtime crate rather than a
//! separate crate: its decisions (`classify`, backoff scheduling) are pure
//! functions over a [`RetryPolicy`] and an [`ErrorKind`], consumed directly
//! by the Workflow Runtime's per-node attempt loop.

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::model::error::ErrorKind;

/// Jitter strategy applied to the computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffJitter {
    /// No jitter; use the computed delay exactly.
    None,
    /// Uniformly sampled delay in `[0, computed]`.
    Full,
    /// Uniformly sampled delay in `[computed/2, computed]`.
    Equal,
}

/// Per-node retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff delay after each attempt.
    pub backoff_multiplier: f64,
    /// Jitter strategy.
    pub jitter: BackoffJitter,
    /// Explicit set of additionally-retryable HTTP status codes, beyond the
    /// defaults baked into [`classify`].
    #[serde(default)]
    pub retry_on_http_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: BackoffJitter::Equal,
            retry_on_http_statuses: Vec::new(),
        }
    }
}

/// The classification of a failure: whether it's retryable, and its error
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    /// Whether this failure should be retried (subject to `max_attempts`).
    pub retryable: bool,
    /// The error taxonomy kind.
    pub kind: ErrorKind,
}

/// Classifies a failure from its [`ErrorKind`] and an optional HTTP status,
/// against a policy's additional retryable statuses.
///
/// Network errors, timeouts, 5xx, 408, 425, and 429 are retryable; other 4xx
/// responses, schema-validation errors, and signature failures are
/// terminal, per the platform's error taxonomy.
#[must_use]
pub fn classify(kind: ErrorKind, http_status: Option<u16>, policy: &RetryPolicy) -> ErrorClass {
    let status_retryable = http_status.is_some_and(|status| {
        matches!(status, 408 | 425 | 429) || (500..600).contains(&status) || policy.retry_on_http_statuses.contains(&status)
    });
    let retryable = kind.is_retryable_by_default() || status_retryable;
    ErrorClass { retryable, kind }
}

/// The outcome of evaluating a retry decision for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the given delay in milliseconds.
    RetryAfterMs(u64),
    /// Exhausted retries or the error was terminal; move to the DLQ.
    MoveToDlq,
}

/// Decides whether attempt number `attempt` (1-indexed, the attempt that
/// just failed) should be retried, and computes the backoff delay.
///
/// A `retry_after_secs` hint (from an upstream `Retry-After` header)
/// overrides the computed backoff entirely, per the platform's 429 handling
/// rule.
#[must_use]
pub fn decide_retry(
    policy: &RetryPolicy,
    attempt: u32,
    class: ErrorClass,
    retry_after_secs: Option<u64>,
) -> RetryDecision {
    if !class.retryable || attempt >= policy.max_attempts {
        return RetryDecision::MoveToDlq;
    }
    if let Some(secs) = retry_after_secs {
        return RetryDecision::RetryAfterMs(secs.saturating_mul(1000));
    }
    let base = backoff_delay_ms(policy, attempt);
    let jittered = apply_jitter(policy.jitter, base);
    RetryDecision::RetryAfterMs(jittered)
}

/// Computes the un-jittered backoff delay for the attempt that just failed,
/// `min(initial * multiplier^(attempt-1), max)`.
#[must_use]
pub fn backoff_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let exponent = f64::from(attempt.saturating_sub(1));
    let computed = (policy.initial_backoff_ms as f64) * policy.backoff_multiplier.powf(exponent);
    if computed.is_finite() && computed > 0.0 {
        (computed as u64).min(policy.max_backoff_ms)
    } else {
        policy.max_backoff_ms
    }
}

fn apply_jitter(jitter: BackoffJitter, base_ms: u64) -> u64 {
    match jitter {
        BackoffJitter::None => base_ms,
        BackoffJitter::Full => rand::thread_rng().gen_range(0..=base_ms.max(1)),
        BackoffJitter::Equal => {
            let half = base_ms / 2;
            half + rand::thread_rng().gen_range(0..=(base_ms - half).max(1))
        }
    }
}
