// automatix-ingress/src/webhook.rs
// ============================================================================
// Module: Webhook Intake
// Description: Registers webhook triggers and turns verified, deduplicated
//              deliveries into TriggerEvents.
// Purpose: The inbound half of Trigger Ingress.
// Dependencies: automatix_core, automatix_signature, tokio
// ============================================================================

//! ## Overview
//! [`WebhookIngress::handle`] is the single entry point `POST
//! /webhooks/{webhookId}` hands raw request bytes to. It looks the trigger
//! up, verifies the signature over the **raw** body (never a re-serialized
//! `Value` — the caller is required to hold the original bytes to construct
//! this call), computes the dedupe hash, and either returns a fresh
//! [`automatix_core::TriggerEvent`] or reports why the delivery was
//! rejected or a duplicate.

use std::collections::BTreeMap;
use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::DedupeHash;
use automatix_core::TriggerEvent;
use automatix_core::TriggerKind;
use automatix_core::WebhookId;
use automatix_core::DEFAULT_HASH_ALGORITHM;
use automatix_signature::VendorScheme;
use automatix_signature::VerifyRequest;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

use crate::dedupe::SeenSet;
use crate::error::IngressError;

/// A registered webhook trigger: the configuration backing one
/// `/webhooks/{id}` endpoint.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
    /// This trigger's id, also the path segment of its endpoint.
    pub id: WebhookId,
    /// The connector app id this trigger belongs to.
    pub app_id: String,
    /// The trigger operation id within that connector.
    pub trigger_id: String,
    /// The workflow this trigger starts executions for.
    pub workflow_id: String,
    /// The shared signing secret, if this vendor's scheme requires one.
    pub secret: Option<Vec<u8>>,
    /// Whether this trigger currently accepts deliveries.
    pub is_active: bool,
    /// Opaque operator metadata (display name, owner, …).
    pub metadata: serde_json::Value,
    /// The vendor signature scheme this trigger's app id uses.
    pub scheme: VendorScheme,
}

/// The result of handling one inbound webhook delivery.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The delivery verified and was new; here is the event to enqueue.
    Accepted(Box<TriggerEvent>),
    /// The delivery verified but its dedupe hash was already seen within
    /// the recency window; discarded, no execution created.
    Duplicate,
    /// Signature verification rejected the delivery; `reason` is for the
    /// audit log, not returned to the sender.
    Rejected(String),
}

/// Registers webhook triggers and verifies/deduplicates their deliveries.
pub struct WebhookIngress {
    triggers: RwLock<BTreeMap<WebhookId, WebhookTrigger>>,
    seen: Mutex<SeenSet>,
    clock: Arc<dyn Clock>,
    timestamp_tolerance_sec: u64,
}

impl WebhookIngress {
    /// Builds an empty webhook ingress. `dedupe_window` bounds how many
    /// dedupe hashes are retained (≈1000 per the platform's default);
    /// `timestamp_tolerance_sec` is passed through to every vendor scheme
    /// that checks clock skew.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, dedupe_window: usize, timestamp_tolerance_sec: u64) -> Self {
        Self {
            triggers: RwLock::new(BTreeMap::new()),
            seen: Mutex::new(SeenSet::new(dedupe_window)),
            clock,
            timestamp_tolerance_sec,
        }
    }

    /// Registers a webhook trigger, replacing any existing registration
    /// under the same id.
    pub async fn register(&self, trigger: WebhookTrigger) {
        self.triggers.write().await.insert(trigger.id.clone(), trigger);
    }

    /// Deactivates a webhook trigger without removing its registration.
    pub async fn deactivate(&self, id: &WebhookId) {
        if let Some(trigger) = self.triggers.write().await.get_mut(id) {
            trigger.is_active = false;
        }
    }

    /// Returns a clone of the registered trigger, if any. Callers use this
    /// to resolve the `workflowId` an accepted delivery should start an
    /// execution against, since [`TriggerEvent`] itself carries only the
    /// connector-level `appId`/`triggerId`, not the workflow binding.
    pub async fn get(&self, id: &WebhookId) -> Option<WebhookTrigger> {
        self.triggers.read().await.get(id).cloned()
    }

    /// Handles one inbound delivery: verifies, deduplicates, and builds a
    /// [`TriggerEvent`] on success.
    ///
    /// # Errors
    /// Returns [`IngressError::UnknownWebhook`] if `id` has no active
    /// registration — the caller should answer with 404. Signature
    /// rejection is reported via [`WebhookOutcome::Rejected`], not an
    /// `Err`, since it is a normal 400 response, not an ingress failure.
    pub async fn handle(
        &self,
        id: &WebhookId,
        headers: &BTreeMap<String, String>,
        raw_body: &[u8],
    ) -> Result<WebhookOutcome, IngressError> {
        let trigger = {
            let triggers = self.triggers.read().await;
            let Some(trigger) = triggers.get(id) else {
                return Err(IngressError::UnknownWebhook);
            };
            if !trigger.is_active {
                return Err(IngressError::UnknownWebhook);
            }
            trigger.clone()
        };

        let secret = trigger.secret.clone().unwrap_or_default();
        let now_unix_sec = u64::try_from(self.clock.now_unix_millis() / 1000).unwrap_or(0);
        let verify_request = VerifyRequest {
            method: "POST",
            host: "",
            path: "",
            headers,
            raw_body,
            secret: &secret,
            timestamp_tolerance_sec: self.timestamp_tolerance_sec,
            now_unix_sec,
        };
        let outcome = automatix_signature::verify(trigger.scheme, &verify_request);
        if !outcome.verified {
            return Ok(WebhookOutcome::Rejected(outcome.reason));
        }

        let timestamp_component = vendor_timestamp_component(trigger.scheme, headers);
        let dedupe_hash = automatix_core::hash_parts(
            DEFAULT_HASH_ALGORITHM,
            &[id.as_str().as_bytes(), &timestamp_component, raw_body],
        );
        let dedupe_hash = DedupeHash::new(dedupe_hash.value);

        let mut seen = self.seen.lock().await;
        if !seen.insert(dedupe_hash.as_str()) {
            return Ok(WebhookOutcome::Duplicate);
        }
        drop(seen);

        let payload: serde_json::Value =
            serde_json::from_slice(raw_body).unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw_body).into_owned()));

        let event = TriggerEvent {
            kind: TriggerKind::Webhook(id.clone()),
            app_id: trigger.app_id.clone(),
            trigger_id: trigger.trigger_id.clone(),
            payload,
            headers: headers.clone(),
            timestamp_unix_millis: self.clock.now_unix_millis(),
            signature: headers.get("x-hub-signature-256").or_else(|| headers.get("stripe-signature")).cloned(),
            dedupe_hash,
        };
        Ok(WebhookOutcome::Accepted(Box::new(event)))
    }
}

/// Extracts the vendor's own declared event timestamp, as raw bytes, for
/// inclusion in the dedupe hash. Identical resends of the same underlying
/// vendor event carry the same declared timestamp even when they arrive at
/// different wall-clock times, which is what makes retried deliveries
/// deduplicate; vendors with no such header fall back to an empty
/// component, so dedupe for them rests on body content alone.
fn vendor_timestamp_component(scheme: VendorScheme, headers: &BTreeMap<String, String>) -> Vec<u8> {
    match scheme {
        VendorScheme::Slack => headers.get("x-slack-request-timestamp").map(String::as_bytes).map(<[u8]>::to_vec).unwrap_or_default(),
        VendorScheme::Stripe => extract_t_component(headers.get("stripe-signature")),
        VendorScheme::Calendly => extract_t_component(headers.get("calendly-webhook-signature")),
        VendorScheme::Zendesk => headers
            .get("x-zendesk-webhook-signature-timestamp")
            .map(String::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default(),
        VendorScheme::Hubspot => headers.get("x-hubspot-request-timestamp").map(String::as_bytes).map(<[u8]>::to_vec).unwrap_or_default(),
        VendorScheme::None
        | VendorScheme::Shopify
        | VendorScheme::Github
        | VendorScheme::Gitlab
        | VendorScheme::Bitbucket
        | VendorScheme::Intercom
        | VendorScheme::Docusign
        | VendorScheme::Square
        | VendorScheme::Surveymonkey => Vec::new(),
    }
}

fn extract_t_component(header: Option<&String>) -> Vec<u8> {
    let Some(header) = header else {
        return Vec::new();
    };
    header
        .split(',')
        .find_map(|part| part.trim().strip_prefix("t="))
        .map(str::as_bytes)
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}
