// automatix-server/src/poll_loop.rs
// ============================================================================
// Module: Poll Loop
// Description: A background task that ticks the polling scheduler on a
//              fixed cadence and starts executions for the events it yields.
// Purpose: Give polling-style triggers the same always-on behavior webhook
//          triggers get from an inbound HTTP request, without an external
//          cron caller.
// Dependencies: automatix_core, tokio
// ============================================================================

//! ## Overview
//! `POST /triggers/poll/{triggerId}/tick` (in [`crate::handlers`]) lets an
//! operator force one tick; [`run`] is the same tick loop running forever
//! on `polling.tickIntervalSec`, spawned once by `serve::run` and cancelled
//! via a [`tokio_util`]-free `tokio::select!` against a shutdown signal.

use std::time::Duration;

use automatix_core::AuditEvent;
use automatix_core::CancellationToken;
use automatix_core::ExecutionId;
use automatix_core::UserId;
use automatix_core::WorkflowId;
use tokio::sync::watch;

use crate::state::ServerState;

/// Runs the polling scheduler's tick loop until `shutdown` fires.
pub async fn run(state: ServerState, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.polling.tick_interval_sec));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick_once(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn tick_once(state: &ServerState) {
    let outcome = state.polls.tick(state.services.connectors.as_ref()).await;
    for event in outcome.events {
        let automatix_core::TriggerKind::Poll(poll_id) = &event.kind else { continue };
        let Some(trigger) = state.polls.get(poll_id).await else { continue };
        let Ok(graph) = state.graphs.get(&WorkflowId::new(trigger.workflow_id.clone())) else { continue };
        let user_id = trigger
            .metadata
            .get("userId")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| UserId::new("system"), UserId::new);
        let execution_id = ExecutionId::new(uuid::Uuid::new_v4().to_string());
        state.services.audit.record(AuditEvent::ExecutionStarted { execution_id: execution_id.clone() });
        let _ = state
            .runtime
            .start_execution(&graph, event, user_id, execution_id, CancellationToken::new())
            .await;
    }
}
