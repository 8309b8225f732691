// automatix-ingress/src/poll.rs
// ============================================================================
// Module: Polling Scheduler
// Description: Tick-driven connector polling, with its own dedupe
//              namespace.
// Purpose: Turn scheduled connector poll results into TriggerEvents.
// Dependencies: automatix_core, tokio
// ============================================================================

//! ## Overview
//! [`PollScheduler::tick`] is the single entry point a timer (external to
//! this crate — an interval loop in `automatix-server` or the CLI) calls
//! periodically. Each tick invokes the connector's poll operation for every
//! due trigger, through the same [`automatix_core::ConnectorInvoker`]
//! boundary the Workflow Runtime itself uses, and deduplicates returned
//! items against a poll-only [`SeenSet`] — kept separate from the webhook
//! seen-set, per the platform's decision to give the two ingress paths
//! independent dedupe namespaces.

use std::collections::BTreeMap;
use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::ConnectorContext;
use automatix_core::ConnectorInvoker;
use automatix_core::CorrelationId;
use automatix_core::DedupeHash;
use automatix_core::ExecutionId;
use automatix_core::NodeId;
use automatix_core::PollId;
use automatix_core::TriggerEvent;
use automatix_core::TriggerKind;
use automatix_core::DEFAULT_HASH_ALGORITHM;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::RwLock;

use crate::dedupe::SeenSet;
use crate::error::IngressError;

/// A registered polling trigger: the configuration driving one connector's
/// scheduled poll operation.
#[derive(Debug, Clone)]
pub struct PollingTrigger {
    /// This trigger's id.
    pub id: PollId,
    /// The connector app id this trigger belongs to.
    pub app_id: String,
    /// The trigger (poll) operation id within that connector.
    pub trigger_id: String,
    /// The workflow this trigger starts executions for.
    pub workflow_id: String,
    /// Seconds between polls.
    pub interval_sec: u64,
    /// The next unix-millis instant this trigger is due to be polled.
    pub next_poll_unix_millis: i64,
    /// Whether this trigger currently polls.
    pub is_active: bool,
    /// The field within a returned poll item used to compute its dedupe
    /// hash; items are not deduplicated at all if this is `None`.
    pub dedupe_key: Option<String>,
    /// Opaque operator metadata.
    pub metadata: Value,
}

/// The result of one scheduler tick: events to enqueue, and any poll
/// invocations that failed.
#[derive(Debug, Default)]
pub struct PollTickOutcome {
    /// Newly observed, deduplicated trigger events.
    pub events: Vec<TriggerEvent>,
    /// `(trigger id, error)` pairs for polls that failed this tick.
    pub errors: Vec<(PollId, IngressError)>,
}

/// Drives scheduled connector polling.
pub struct PollScheduler {
    triggers: RwLock<BTreeMap<PollId, PollingTrigger>>,
    seen: Mutex<SeenSet>,
    clock: Arc<dyn Clock>,
    min_interval_sec: u64,
}

impl PollScheduler {
    /// Builds an empty poll scheduler. `dedupe_window` bounds the number of
    /// retained poll-item dedupe hashes; `min_interval_sec` clamps any
    /// trigger registered with a shorter interval, per the platform's
    /// `polling.minIntervalSec` configuration option.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, dedupe_window: usize, min_interval_sec: u64) -> Self {
        Self {
            triggers: RwLock::new(BTreeMap::new()),
            seen: Mutex::new(SeenSet::new(dedupe_window)),
            clock,
            min_interval_sec,
        }
    }

    /// Registers a polling trigger, replacing any existing registration
    /// under the same id. The stored interval is clamped to
    /// `min_interval_sec`.
    pub async fn register(&self, mut trigger: PollingTrigger) {
        trigger.interval_sec = trigger.interval_sec.max(self.min_interval_sec);
        self.triggers.write().await.insert(trigger.id.clone(), trigger);
    }

    /// Returns a clone of the registered trigger, if any. Callers use this
    /// to resolve the `workflowId` a tick's events should start executions
    /// against, since [`TriggerEvent`] carries only `appId`/`triggerId`.
    pub async fn get(&self, id: &PollId) -> Option<PollingTrigger> {
        self.triggers.read().await.get(id).cloned()
    }

    /// Polls every trigger whose `next_poll_unix_millis` has elapsed,
    /// deduplicates returned items, and reschedules them.
    pub async fn tick(&self, connectors: &dyn ConnectorInvoker) -> PollTickOutcome {
        let now = self.clock.now_unix_millis();
        let due: Vec<PollingTrigger> = {
            let triggers = self.triggers.read().await;
            triggers.values().filter(|t| t.is_active && t.next_poll_unix_millis <= now).cloned().collect()
        };

        let mut outcome = PollTickOutcome::default();
        for trigger in due {
            match self.poll_one(&trigger, connectors, now).await {
                Ok(events) => outcome.events.extend(events),
                Err(err) => outcome.errors.push((trigger.id.clone(), err)),
            }
            let mut triggers = self.triggers.write().await;
            if let Some(stored) = triggers.get_mut(&trigger.id) {
                stored.next_poll_unix_millis = now + i64::try_from(trigger.interval_sec.saturating_mul(1000)).unwrap_or(i64::MAX);
            }
        }
        outcome
    }

    async fn poll_one(
        &self,
        trigger: &PollingTrigger,
        connectors: &dyn ConnectorInvoker,
        now: i64,
    ) -> Result<Vec<TriggerEvent>, IngressError> {
        let context = ConnectorContext {
            correlation_id: CorrelationId::new(format!("poll-{}-{now}", trigger.id)),
            execution_id: ExecutionId::new(format!("poll-{}", trigger.id)),
            node_id: NodeId::new("trigger"),
            workflow_id: trigger.workflow_id.clone(),
            user_id: String::new(),
            deadline_unix_millis: now + 30_000,
        };
        let outcome = connectors
            .invoke(&trigger.app_id, &trigger.trigger_id, &Value::Null, &[], &context)
            .await
            .map_err(|err| IngressError::PollInvocationFailed(err.to_string()))?;

        let items: Vec<Value> = match outcome.output {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let mut seen = self.seen.lock().await;
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            if let Some(key) = &trigger.dedupe_key {
                let item_value = item.get(key).cloned().unwrap_or(Value::Null);
                let item_bytes = serde_json::to_vec(&item_value).unwrap_or_default();
                let digest = automatix_core::hash_parts(
                    DEFAULT_HASH_ALGORITHM,
                    &[trigger.trigger_id.as_bytes(), &item_bytes],
                );
                if !seen.insert(&digest.value) {
                    continue;
                }
                events.push(self.build_event(trigger, item, DedupeHash::new(digest.value), now));
            } else {
                let digest = automatix_core::hash_bytes(DEFAULT_HASH_ALGORITHM, &serde_json::to_vec(&item).unwrap_or_default());
                events.push(self.build_event(trigger, item, DedupeHash::new(digest.value), now));
            }
        }
        Ok(events)
    }

    fn build_event(&self, trigger: &PollingTrigger, payload: Value, dedupe_hash: DedupeHash, now: i64) -> TriggerEvent {
        let mut headers = BTreeMap::new();
        headers.insert("x-trigger-type".to_string(), "polling".to_string());
        TriggerEvent {
            kind: TriggerKind::Poll(trigger.id.clone()),
            app_id: trigger.app_id.clone(),
            trigger_id: trigger.trigger_id.clone(),
            payload,
            headers,
            timestamp_unix_millis: now,
            signature: None,
            dedupe_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use automatix_core::ConnectorError;
    use automatix_core::ConnectorOutcome;
    use time::OffsetDateTime;

    use super::*;

    #[derive(Debug)]
    struct FixedClock(std::sync::atomic::AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH
        }

        fn now_unix_millis(&self) -> i64 {
            self.0.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    struct StubInvoker {
        items: Vec<Value>,
    }

    #[async_trait]
    impl ConnectorInvoker for StubInvoker {
        async fn invoke(
            &self,
            _app_id: &str,
            _operation_id: &str,
            _params: &Value,
            _credentials: &[u8],
            _context: &ConnectorContext,
        ) -> Result<ConnectorOutcome, ConnectorError> {
            Ok(ConnectorOutcome { output: Value::Array(self.items.clone()), ..Default::default() })
        }
    }

    fn trigger() -> PollingTrigger {
        PollingTrigger {
            id: PollId::new("poll-1"),
            app_id: "gmail".to_string(),
            trigger_id: "new_email".to_string(),
            workflow_id: "wf-1".to_string(),
            interval_sec: 30,
            next_poll_unix_millis: 0,
            is_active: true,
            dedupe_key: Some("message_id".to_string()),
            metadata: Value::Null,
        }
    }

    #[tokio::test]
    async fn due_trigger_is_polled_and_yields_events() {
        let scheduler = PollScheduler::new(Arc::new(FixedClock(std::sync::atomic::AtomicI64::new(1000))), 1000, 30);
        scheduler.register(trigger()).await;
        let invoker = StubInvoker { items: vec![serde_json::json!({"message_id": "m1"})] };

        let outcome = scheduler.tick(&invoker).await;
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn repeated_item_is_deduplicated_across_ticks() {
        let scheduler = PollScheduler::new(Arc::new(FixedClock(std::sync::atomic::AtomicI64::new(1000))), 1000, 0);
        scheduler.register(trigger()).await;
        let invoker = StubInvoker { items: vec![serde_json::json!({"message_id": "m1"})] };

        let first = scheduler.tick(&invoker).await;
        assert_eq!(first.events.len(), 1);

        let second = scheduler.tick(&invoker).await;
        assert!(second.events.is_empty());
    }

    #[tokio::test]
    async fn not_yet_due_trigger_is_skipped() {
        let scheduler = PollScheduler::new(Arc::new(FixedClock(std::sync::atomic::AtomicI64::new(0))), 1000, 30);
        let mut not_due = trigger();
        not_due.next_poll_unix_millis = 60_000;
        scheduler.register(not_due).await;
        let invoker = StubInvoker { items: vec![serde_json::json!({"message_id": "m1"})] };

        let outcome = scheduler.tick(&invoker).await;
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn connector_failure_is_reported_not_panicked() {
        struct FailingInvoker;
        #[async_trait]
        impl ConnectorInvoker for FailingInvoker {
            async fn invoke(
                &self,
                _app_id: &str,
                _operation_id: &str,
                _params: &Value,
                _credentials: &[u8],
                _context: &ConnectorContext,
            ) -> Result<ConnectorOutcome, ConnectorError> {
                Err(ConnectorError::Timeout)
            }
        }

        let scheduler = PollScheduler::new(Arc::new(FixedClock(std::sync::atomic::AtomicI64::new(1000))), 1000, 30);
        scheduler.register(trigger()).await;
        let outcome = scheduler.tick(&FailingInvoker).await;
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}
