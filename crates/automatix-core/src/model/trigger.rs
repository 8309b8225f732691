// automatix-core/src/model/trigger.rs
// ============================================================================
// Module: Automatix Trigger Event
// Description: The TriggerEvent shape produced by webhook intake and the
//              polling scheduler.
// Purpose: Carry a deduplicated trigger delivery into the Workflow Runtime as
//          an execution seed.
// Dependencies: serde, serde_json
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::model::identifiers::DedupeHash;
use crate::model::identifiers::PollId;
use crate::model::identifiers::WebhookId;

/// Which ingress path produced this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Delivered via an inbound webhook POST.
    Webhook(WebhookId),
    /// Produced by a polling scheduler tick.
    Poll(PollId),
}

/// A single deduplicated trigger delivery, ready to seed a new execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Whether this event came from a webhook or a poll, and which one.
    pub kind: TriggerKind,
    /// The normalized connector app id that produced this event.
    pub app_id: String,
    /// The trigger operation id within that connector.
    pub trigger_id: String,
    /// The event payload, as delivered (webhook body) or returned (poll
    /// item).
    pub payload: Value,
    /// Request headers, for webhook-origin events; empty for poll-origin
    /// events except for the synthetic `x-trigger-type: polling` marker.
    pub headers: BTreeMap<String, String>,
    /// Unix-millis timestamp this event was received or produced at.
    pub timestamp_unix_millis: i64,
    /// The raw signature header value, when present (webhook-origin only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// The content-addressed dedupe hash, uniquely identifying "same event"
    /// within the ingress's recency window.
    pub dedupe_hash: DedupeHash,
}

impl TriggerEvent {
    /// Returns the synthetic header marker the polling path adds, or the
    /// constant webhook marker, matching the platform's ordering contract
    /// for `headers.x-trigger-type`.
    #[must_use]
    pub fn trigger_type_header(&self) -> &'static str {
        match self.kind {
            TriggerKind::Webhook(_) => "webhook",
            TriggerKind::Poll(_) => "polling",
        }
    }
}
