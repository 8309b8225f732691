// automatix-server/src/handlers.rs
// ============================================================================
// Module: HTTP Handlers
// Description: axum handlers for every endpoint named in the platform's
//              external interfaces: trigger ingress, runtime control, and
//              run observability reads, plus a supplemental registry reload.
// Purpose: Translate HTTP requests into calls against ServerState's
//          collaborators and serialize their results back out.
// Dependencies: automatix_core, automatix_ingress, axum, serde_json
// ============================================================================

//! ## Overview
//! Handlers here hold no business logic of their own beyond request/response
//! shaping: verification, dedupe, graph execution, and persistence all live
//! in the crates this one wires together. [`router`] assembles the full
//! route table `serve::run` mounts.

use std::collections::BTreeMap;

use automatix_core::AuditEvent;
use automatix_core::CancellationToken;
use automatix_core::DlqItem;
use automatix_core::Execution;
use automatix_core::ExecutionId;
use automatix_core::ExecutionQuery;
use automatix_core::NodeId;
use automatix_core::NodeStatus;
use automatix_core::PollId;
use automatix_core::StatsWindow;
use automatix_core::UserId;
use automatix_core::WebhookId;
use automatix_core::WorkflowId;
use automatix_ingress::WebhookOutcome;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::state::ServerState;

/// Builds the full route table.
#[must_use]
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/webhooks/{webhook_id}", post(handle_webhook))
        .route("/triggers/poll/{trigger_id}/tick", post(handle_poll_tick))
        .route("/executions", post(create_execution).get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/retry", post(retry_execution))
        .route("/executions/{id}/nodes/{node_id}/retry", post(retry_node))
        .route("/dlq", get(list_dlq))
        .route("/admin/registry/reload", post(reload_registry))
        .with_state(state)
}

fn header_map_to_btree(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str().to_lowercase(), value.to_string())))
        .collect()
}

/// `userId` carried by a trigger's operator metadata, defaulted to
/// `"system"` when absent. Multi-tenant credential/user binding beyond this
/// is out of scope; see `DESIGN.md`.
/// Renders an [`automatix_core::ExecutionStatus`] as its serialized name,
/// for the audit log line.
fn status_name(status: automatix_core::ExecutionStatus) -> String {
    serde_json::to_value(status).ok().and_then(|value| value.as_str().map(str::to_string)).unwrap_or_default()
}

fn user_id_from_metadata(metadata: &Value) -> UserId {
    metadata.get("userId").and_then(Value::as_str).map_or_else(|| UserId::new("system"), UserId::new)
}

async fn handle_webhook(
    State(state): State<ServerState>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let webhook_id = WebhookId::new(webhook_id);
    let header_map = header_map_to_btree(&headers);

    let outcome = match state.webhooks.handle(&webhook_id, &header_map, &body).await {
        Ok(outcome) => outcome,
        Err(_err) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({"ok": false}))),
    };

    match outcome {
        WebhookOutcome::Accepted(event) => {
            let Some(trigger) = state.webhooks.get(&webhook_id).await else {
                return (StatusCode::NOT_FOUND, Json(serde_json::json!({"ok": false})));
            };
            state
                .services
                .audit
                .record(AuditEvent::WebhookAccepted { correlation_id: automatix_core::CorrelationId::new(event.dedupe_hash.as_str()) });
            spawn_execution(state, trigger.workflow_id, user_id_from_metadata(&trigger.metadata), *event).await;
            (StatusCode::OK, Json(serde_json::json!({"ok": true})))
        }
        WebhookOutcome::Duplicate => (StatusCode::OK, Json(serde_json::json!({"ok": true, "duplicate": true}))),
        WebhookOutcome::Rejected(reason) => {
            state.services.audit.record(AuditEvent::WebhookRejected { reason });
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({"ok": false})))
        }
    }
}

async fn handle_poll_tick(
    State(state): State<ServerState>,
    Path(trigger_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let poll_id = PollId::new(trigger_id);
    let Some(trigger) = state.polls.get(&poll_id).await else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"ok": false})));
    };
    let outcome = state.polls.tick(state.services.connectors.as_ref()).await;
    for event in outcome.events {
        spawn_execution(state.clone(), trigger.workflow_id.clone(), user_id_from_metadata(&trigger.metadata), event).await;
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({"ok": true, "errors": outcome.errors.len()})),
    )
}

/// Resolves the graph for `workflow_id`, starts an execution seeded by
/// `event`, and persists the result. Failures are recorded to the audit
/// sink; this is a best-effort background action from the caller's point
/// of view (both webhook and poll handlers already returned 200).
async fn spawn_execution(state: ServerState, workflow_id: String, user_id: UserId, event: automatix_core::TriggerEvent) {
    let Ok(graph) = state.graphs.get(&WorkflowId::new(workflow_id)) else {
        state.services.audit.record(AuditEvent::WebhookRejected { reason: "unknown workflow".to_string() });
        return;
    };
    let execution_id = ExecutionId::new(uuid::Uuid::new_v4().to_string());
    state.services.audit.record(AuditEvent::ExecutionStarted { execution_id: execution_id.clone() });
    if let Ok(execution) =
        state.runtime.start_execution(&graph, event, user_id, execution_id.clone(), CancellationToken::new()).await
    {
        state.services.metrics.increment_counter("executions_total", 1);
        state.services.audit.record(AuditEvent::ExecutionFinished { execution_id, status: status_name(execution.status) });
    }
}

/// Body of `POST /executions`.
#[derive(Debug, Deserialize)]
struct CreateExecutionRequest {
    workflow_id: String,
    trigger_data: Value,
}

async fn create_execution(
    State(state): State<ServerState>,
    Json(request): Json<CreateExecutionRequest>,
) -> (StatusCode, Json<Value>) {
    let Ok(graph) = state.graphs.get(&WorkflowId::new(request.workflow_id)) else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown workflow"})));
    };
    let execution_id = ExecutionId::new(uuid::Uuid::new_v4().to_string());
    let event = automatix_core::TriggerEvent {
        kind: automatix_core::TriggerKind::Poll(PollId::new("manual")),
        app_id: "core".to_string(),
        trigger_id: "manual".to_string(),
        payload: request.trigger_data.clone(),
        headers: BTreeMap::new(),
        timestamp_unix_millis: state.clock.now_unix_millis(),
        signature: None,
        dedupe_hash: automatix_core::DedupeHash::new(execution_id.as_str()),
    };
    match state
        .runtime
        .start_execution(&graph, event, UserId::new("system"), execution_id.clone(), CancellationToken::new())
        .await
    {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"executionId": execution_id.as_str()}))),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

async fn retry_execution(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let original = match state.services.run_log.get_execution(&ExecutionId::new(id)).await {
        Ok(execution) => execution,
        Err(_err) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown execution"}))),
    };
    let Ok(graph) = state.graphs.get(&original.workflow_id) else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown workflow"})));
    };
    let new_execution_id = ExecutionId::new(uuid::Uuid::new_v4().to_string());
    let event = automatix_core::TriggerEvent {
        kind: automatix_core::TriggerKind::Poll(PollId::new("retry")),
        app_id: "core".to_string(),
        trigger_id: "retry".to_string(),
        payload: original.trigger_data.clone(),
        headers: BTreeMap::new(),
        timestamp_unix_millis: state.clock.now_unix_millis(),
        signature: None,
        dedupe_hash: automatix_core::DedupeHash::new(new_execution_id.as_str()),
    };
    match state
        .runtime
        .start_execution(&graph, event, original.user_id.clone(), new_execution_id.clone(), CancellationToken::new())
        .await
    {
        Ok(mut execution) => {
            execution.parent_execution_id = Some(original.execution_id);
            let _ = state.services.run_log.put_execution(&execution).await;
            (StatusCode::OK, Json(serde_json::json!({"executionId": new_execution_id.as_str()})))
        }
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

async fn retry_node(
    State(state): State<ServerState>,
    Path((id, node_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let execution_id = ExecutionId::new(id);
    let node_id = NodeId::new(node_id);

    let dlq_items = match state.services.run_log.list_dlq(None).await {
        Ok(items) => items,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))),
    };
    let Some(item) = dlq_items.into_iter().find(|item| item.execution_id == execution_id && item.node_id == node_id)
    else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no such dlq item"})));
    };

    let node_executions = match state.services.run_log.list_node_executions(&execution_id).await {
        Ok(items) => items,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))),
    };
    let Some(node_execution) = node_executions.into_iter().find(|ne| ne.node_id == node_id) else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no such node execution"})));
    };

    let Some((_, app_id, operation_id)) = automatix_registry::split_node_type(&node_execution.node_type) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "unresolvable node type"})));
    };

    let context = automatix_core::ConnectorContext {
        correlation_id: automatix_core::CorrelationId::new(execution_id.as_str()),
        execution_id: execution_id.clone(),
        node_id: node_id.clone(),
        workflow_id: String::new(),
        user_id: String::new(),
        deadline_unix_millis: state.clock.now_unix_millis() + 60_000,
    };

    match state.services.connectors.invoke(app_id, operation_id, &item.payload, &[], &context).await {
        Ok(outcome) => {
            let mut replayed = node_execution;
            replayed.status = NodeStatus::Succeeded;
            replayed.output = Some(outcome.output);
            replayed.end_time_unix_millis = Some(state.clock.now_unix_millis());
            let _ = state.services.run_log.put_node_execution(&execution_id, &replayed).await;
            let _ = state.services.run_log.delete_dlq_item(&execution_id, &node_id).await;
            state.services.audit.record(AuditEvent::NodeAttempt { execution_id, node_id, attempt: replayed.attempt + 1 });
            (StatusCode::OK, Json(serde_json::json!({"ok": true})))
        }
        Err(err) => (StatusCode::BAD_GATEWAY, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

/// Query parameters for `GET /executions`, mapping 1:1 to
/// [`ExecutionQuery`].
#[derive(Debug, Deserialize, Default)]
struct ExecutionQueryParams {
    execution_id: Option<String>,
    workflow_id: Option<String>,
    user_id: Option<String>,
    status: Option<String>,
    since: Option<i64>,
    until: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ExecutionPageResponse {
    items: Vec<Execution>,
    total: u64,
}

async fn list_executions(
    State(state): State<ServerState>,
    Query(params): Query<ExecutionQueryParams>,
) -> (StatusCode, Json<Value>) {
    let query = ExecutionQuery {
        execution_id: params.execution_id.map(ExecutionId::new),
        workflow_id: params.workflow_id.map(WorkflowId::new),
        user_id: params.user_id,
        status: params.status,
        since_unix_millis: params.since,
        until_unix_millis: params.until,
        sort_by: params.sort_by,
        sort_order: params.sort_order,
        limit: params.limit.unwrap_or(50),
        offset: params.offset.unwrap_or(0),
    };
    match state.services.run_log.query_executions(&query).await {
        Ok(page) => (
            StatusCode::OK,
            Json(serde_json::to_value(ExecutionPageResponse { items: page.items, total: page.total }).unwrap_or(Value::Null)),
        ),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

async fn get_execution(State(state): State<ServerState>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match state.services.run_log.get_execution(&ExecutionId::new(id)).await {
        Ok(execution) => (StatusCode::OK, Json(serde_json::to_value(execution).unwrap_or(Value::Null))),
        Err(_err) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown execution"}))),
    }
}

#[derive(Debug, Deserialize, Default)]
struct DlqQueryParams {
    workflow_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct DlqListResponse {
    items: Vec<DlqItem>,
}

async fn list_dlq(State(state): State<ServerState>, Query(params): Query<DlqQueryParams>) -> (StatusCode, Json<Value>) {
    let workflow_id = params.workflow_id.map(WorkflowId::new);
    match state.services.run_log.list_dlq(workflow_id.as_ref()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::to_value(DlqListResponse { items }).unwrap_or(Value::Null))),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

async fn reload_registry(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    match state.registry.reload() {
        Ok(()) => {
            let connector_count = state.registry.list_connectors().len() as u64;
            state.services.audit.record(AuditEvent::RegistryReloaded { connector_count });
            (StatusCode::OK, Json(serde_json::json!({"ok": true, "connectorCount": connector_count})))
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))),
    }
}

#[cfg(test)]
mod tests {
    use automatix_core::SystemClock;

    use super::*;
    use crate::config::AppConfig;
    use crate::state::ServerState;

    fn connector_dir_with_one_connector() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("core.toml"),
            r#"
id = "core"
name = "Core"
category = "productivity"

[authentication]
scheme = "none"
allowed_scopes = []

[[actions]]
id = "noop"
name = "Noop"
input_params = {}
"#,
        )
        .expect("write connector");
        dir
    }

    async fn test_state() -> ServerState {
        let connector_dir = connector_dir_with_one_connector();
        let graph_dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.storage.connector_dir = connector_dir.path().to_string_lossy().into_owned();
        config.storage.graph_dir = graph_dir.path().to_string_lossy().into_owned();
        config.storage.sqlite_path = ":memory:".to_string();
        ServerState::build(config, Arc::new(SystemClock)).expect("build state")
    }

    fn connector_dir_with_stripe_trigger() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("stripe.toml"),
            r#"
id = "stripe"
name = "Stripe"
category = "payments"

[authentication]
scheme = "none"
allowed_scopes = []

[[triggers]]
id = "charge.succeeded"
name = "Charge Succeeded"
supports_webhook = true
"#,
        )
        .expect("write connector");
        dir
    }

    async fn test_state_with_clock(clock: Arc<dyn automatix_core::Clock>) -> ServerState {
        let connector_dir = connector_dir_with_stripe_trigger();
        let graph_dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.storage.connector_dir = connector_dir.path().to_string_lossy().into_owned();
        config.storage.graph_dir = graph_dir.path().to_string_lossy().into_owned();
        config.storage.sqlite_path = ":memory:".to_string();
        ServerState::build(config, clock).expect("build state")
    }

    #[tokio::test]
    async fn unknown_webhook_returns_404() {
        let state = test_state().await;
        let (status, _) = handle_webhook(State(state), Path("missing".to_string()), HeaderMap::new(), Bytes::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_executions_on_empty_store_returns_empty_page() {
        let state = test_state().await;
        let (status, Json(body)) = list_executions(State(state), Query(ExecutionQueryParams::default())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn list_dlq_on_empty_store_returns_empty_list() {
        let state = test_state().await;
        let (status, Json(body)) = list_dlq(State(state), Query(DlqQueryParams::default())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn reload_registry_reports_connector_count() {
        let state = test_state().await;
        let (status, Json(body)) = reload_registry(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connectorCount"], serde_json::json!(1));
    }

    #[derive(Debug)]
    struct FixedClock(i64);

    impl automatix_core::Clock for FixedClock {
        fn now(&self) -> time::OffsetDateTime {
            time::OffsetDateTime::from_unix_timestamp(self.0 / 1000).unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
        }

        fn now_unix_millis(&self) -> i64 {
            self.0
        }
    }

    fn sign_stripe(secret: &[u8], ts: u64, body: &[u8]) -> String {
        use hmac::Hmac;
        use hmac::Mac;
        use sha2::Sha256;
        let message = format!("{ts}.{}", String::from_utf8_lossy(body));
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret).expect("hmac key");
        mac.update(message.as_bytes());
        format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    async fn stripe_state_with_graph(now_unix_millis: i64) -> (ServerState, Vec<u8>, String) {
        let state = test_state_with_clock(Arc::new(FixedClock(now_unix_millis))).await;
        let secret = b"stripe-secret";
        state
            .webhooks
            .register(automatix_ingress::WebhookTrigger {
                id: automatix_core::WebhookId::new("stripe-charges"),
                app_id: "stripe".to_string(),
                trigger_id: "charge.succeeded".to_string(),
                workflow_id: "wf-stripe".to_string(),
                secret: Some(secret.to_vec()),
                is_active: true,
                metadata: serde_json::json!({}),
                scheme: automatix_signature::VendorScheme::Stripe,
            })
            .await;
        state
            .graphs
            .put(automatix_core::WorkflowGraph {
                workflow_id: WorkflowId::new("wf-stripe"),
                version: 1,
                nodes: vec![automatix_core::Node {
                    id: NodeId::new("trigger"),
                    node_type: "trigger.stripe:charge.succeeded".to_string(),
                    params: BTreeMap::new(),
                    retry_policy: None,
                    idempotency_key: None,
                }],
                edges: Vec::new(),
            })
            .expect("publish graph");

        let body = serde_json::to_vec(&serde_json::json!({"id": "evt_1", "amount": 4200})).expect("serialize body");
        let ts = u64::try_from(now_unix_millis / 1000).unwrap_or(0);
        let signature = sign_stripe(secret, ts, &body);
        (state, body, signature)
    }

    async fn execution_count(state: &ServerState) -> u64 {
        state
            .services
            .run_log
            .query_executions(&ExecutionQuery::default())
            .await
            .expect("query executions")
            .total
    }

    #[tokio::test]
    async fn duplicate_stripe_delivery_is_accepted_twice_but_starts_one_execution() {
        let now = 1_700_000_000_000_i64;
        let (state, body, signature) = stripe_state_with_graph(now).await;
        let mut headers = HeaderMap::new();
        headers.insert("stripe-signature", signature.parse().expect("header value"));

        let (first_status, Json(first_body)) =
            handle_webhook(State(state.clone()), Path("stripe-charges".to_string()), headers.clone(), Bytes::from(body.clone())).await;
        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(first_body["ok"], serde_json::json!(true));

        let (second_status, Json(second_body)) =
            handle_webhook(State(state.clone()), Path("stripe-charges".to_string()), headers, Bytes::from(body)).await;
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(second_body["duplicate"], serde_json::json!(true));

        assert_eq!(execution_count(&state).await, 1);
    }

    #[tokio::test]
    async fn stale_stripe_signature_is_rejected_and_starts_no_execution() {
        let now = 1_700_000_000_000_i64;
        let (state, body, _fresh_signature) = stripe_state_with_graph(now).await;
        let mut headers = HeaderMap::new();
        headers.insert("stripe-signature", "t=1,v1=deadbeef".parse().expect("header value"));

        let (status, Json(response_body)) =
            handle_webhook(State(state.clone()), Path("stripe-charges".to_string()), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response_body["ok"], serde_json::json!(false));
        assert_eq!(execution_count(&state).await, 0);
    }
}
