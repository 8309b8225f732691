// automatix-connectors/src/stub.rs
// ============================================================================
// Module: Stub Connector Invoker
// Description: An in-memory `ConnectorInvoker` returning canned outcomes,
//              keyed by `appId:operationId`.
// Purpose: Ground end-to-end test scenarios (e.g. a Gmail trigger feeding a
//          Sheets append) without a real SaaS credential or network call.
// Dependencies: automatix_core, tokio
// ============================================================================

//! Per the platform's connector invocation boundary, only the uniform
//! `invoke` contract is specified; individual connectors' API semantics are
//! out of scope. [`StubConnectorInvoker`] stands in for every non-`core`
//! connector in tests: register a canned [`ConnectorOutcome`] or
//! [`ConnectorError`] per `appId:operationId` pair and replay it.

use std::collections::HashMap;

use async_trait::async_trait;
use automatix_core::ConnectorContext;
use automatix_core::ConnectorError;
use automatix_core::ConnectorInvoker;
use automatix_core::ConnectorOutcome;
use serde_json::Value;
use tokio::sync::Mutex;

/// A scripted result for one `appId:operationId` pair.
#[derive(Clone)]
enum Scripted {
    /// Return this outcome on every call.
    Outcome(ConnectorOutcome),
    /// Return this error on every call.
    Error(String),
}

/// An in-memory [`ConnectorInvoker`] returning scripted outcomes.
///
/// Calls to an unregistered `appId:operationId` pair return
/// [`ConnectorError::Other`] naming the missing key, so a misconfigured test
/// fixture fails loudly rather than silently returning an empty success.
#[derive(Default)]
pub struct StubConnectorInvoker {
    /// Scripted results, keyed by `"{appId}:{operationId}"`.
    scripts: Mutex<HashMap<String, Scripted>>,
    /// Invocation log, for assertions on call order and arguments.
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl StubConnectorInvoker {
    /// Builds an invoker with no scripted results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app_id: &str, operation_id: &str) -> String {
        format!("{app_id}:{operation_id}")
    }

    /// Registers `outcome` to be returned for every call to
    /// `app_id:operation_id`.
    pub async fn script_success(&self, app_id: &str, operation_id: &str, outcome: ConnectorOutcome) {
        let mut scripts = self.scripts.lock().await;
        scripts.insert(Self::key(app_id, operation_id), Scripted::Outcome(outcome));
    }

    /// Registers a failure to be returned for every call to
    /// `app_id:operation_id`.
    pub async fn script_failure(&self, app_id: &str, operation_id: &str, message: impl Into<String>) {
        let mut scripts = self.scripts.lock().await;
        scripts.insert(Self::key(app_id, operation_id), Scripted::Error(message.into()));
    }

    /// Returns the calls made so far, in order, as `(appId, operationId, params)`.
    pub async fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ConnectorInvoker for StubConnectorInvoker {
    async fn invoke(
        &self,
        app_id: &str,
        operation_id: &str,
        params: &Value,
        _credentials: &[u8],
        _context: &ConnectorContext,
    ) -> Result<ConnectorOutcome, ConnectorError> {
        let key = Self::key(app_id, operation_id);
        self.calls.lock().await.push((app_id.to_string(), operation_id.to_string(), params.clone()));

        let scripts = self.scripts.lock().await;
        match scripts.get(&key) {
            Some(Scripted::Outcome(outcome)) => Ok(outcome.clone()),
            Some(Scripted::Error(message)) => Err(ConnectorError::Other { message: message.clone(), status: None }),
            None => Err(ConnectorError::Other { message: format!("no scripted result for {key}"), status: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use automatix_core::CorrelationId;
    use automatix_core::ExecutionId;
    use automatix_core::NodeId;

    use super::*;

    fn context() -> ConnectorContext {
        ConnectorContext {
            correlation_id: CorrelationId::new("corr-1"),
            execution_id: ExecutionId::new("exec-1"),
            node_id: NodeId::new("node-1"),
            workflow_id: "wf-1".to_string(),
            user_id: "user-1".to_string(),
            deadline_unix_millis: i64::MAX,
        }
    }

    #[tokio::test]
    async fn scripted_success_is_returned() {
        let invoker = StubConnectorInvoker::new();
        invoker
            .script_success(
                "gmail",
                "fetch_messages",
                ConnectorOutcome { output: serde_json::json!({"messages": []}), ..Default::default() },
            )
            .await;
        let result = invoker
            .invoke("gmail", "fetch_messages", &Value::Null, &[], &context())
            .await
            .expect("scripted success");
        assert_eq!(result.output, serde_json::json!({"messages": []}));
    }

    #[tokio::test]
    async fn unscripted_call_fails_loudly() {
        let invoker = StubConnectorInvoker::new();
        let result = invoker.invoke("slack", "post_message", &Value::Null, &[], &context()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let invoker = StubConnectorInvoker::new();
        invoker.script_success("gmail", "fetch_messages", ConnectorOutcome::default()).await;
        invoker.script_success("sheets", "append_row", ConnectorOutcome::default()).await;

        let params = serde_json::json!({"threadId": "t-1"});
        invoker.invoke("gmail", "fetch_messages", &params, &[], &context()).await.expect("ok");
        invoker.invoke("sheets", "append_row", &Value::Null, &[], &context()).await.expect("ok");

        let calls = invoker.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "gmail");
        assert_eq!(calls[1].0, "sheets");
    }
}
