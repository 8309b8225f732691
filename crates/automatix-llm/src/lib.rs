// automatix-llm/src/lib.rs
// ============================================================================
// Module: LLM Call Shell
// Description: Fingerprint caching, single-flight, budget gating, and
//              validate-and-repair around a raw LLM provider.
// Purpose: Give every `llm`-role node call caching and cost control without
//          the Workflow Runtime needing to know about any of it.
// Dependencies: automatix_core, jsonschema, serde_jcs, tokio
// ============================================================================

//! ## Overview
//! [`LlmCallShell`] itself implements [`automatix_core::LlmProvider`] by
//! wrapping an inner raw provider: callers that hold an `Arc<dyn
//! LlmProvider>` cannot tell a shell-wrapped provider from a raw one, which
//! is exactly what lets the Workflow Runtime treat `llm`-role nodes the
//! same way it treats connector actions.
//!
//! Call order on [`LlmCallShell::generate`]:
//! 1. Compute the request's [`fingerprint::fingerprint`].
//! 2. Check [`cache::FingerprintCache`] for a non-expired entry; return it
//!    with `cache_hit: true` if found.
//! 3. Acquire the fingerprint's single-flight guard, so concurrent
//!    identical requests share one upstream call.
//! 4. Re-check the cache (it may have been filled while waiting).
//! 5. Consult [`budget::BudgetGate`]; deny with
//!    [`automatix_core::LlmProviderError::BudgetExceeded`] before ever
//!    calling upstream.
//! 6. Call the inner provider.
//! 7. If `json_schema` was set, validate the response and perform at most
//!    one repair round-trip before failing with
//!    [`automatix_core::LlmProviderError::SchemaValidationFailed`].
//! 8. Populate the cache and release the single-flight guard.

#![doc(html_no_source)]

pub mod budget;
pub mod cache;
pub mod fingerprint;
pub mod shell;
pub mod stub;

pub use budget::BudgetDecision;
pub use budget::BudgetGate;
pub use budget::InMemoryBudgetGate;
pub use cache::FingerprintCache;
pub use fingerprint::fingerprint;
pub use shell::LlmCallShell;
pub use stub::StubLlmProvider;
