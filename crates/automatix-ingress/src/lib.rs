// automatix-ingress/src/lib.rs
// ============================================================================
// Module: Trigger Ingress
// Description: Webhook intake with vendor signature verification and
//              dedupe, plus a tick-driven polling scheduler.
// Purpose: Turn raw inbound deliveries into deduplicated TriggerEvents that
//          seed new executions.
// Dependencies: automatix_core, automatix_signature, tokio
// ============================================================================

//! ## Overview
//! Trigger Ingress has two intake paths feeding one [`TriggerEvent`] shape:
//! [`webhook::WebhookIngress`] verifies and deduplicates inbound HTTP
//! deliveries; [`poll::PollScheduler`] drives scheduled connector polls and
//! deduplicates their returned items. Both consult their own
//! [`dedupe::SeenSet`] — webhook and poll dedupe hashes live in separate
//! namespaces, matching the platform's decision to keep polling and webhook
//! recency windows from interfering with each other.
//!
//! [`TriggerEvent`]: automatix_core::TriggerEvent

#![doc(html_no_source)]

pub mod dedupe;
pub mod error;
pub mod poll;
pub mod webhook;

pub use dedupe::SeenSet;
pub use error::IngressError;
pub use poll::PollScheduler;
pub use poll::PollingTrigger;
pub use webhook::WebhookIngress;
pub use webhook::WebhookOutcome;
pub use webhook::WebhookTrigger;
