// automatix-connectors/src/composite.rs
// ============================================================================
// Module: Composite Connector Invoker
// Description: Routes a connector invocation to the built-in HTTP invoker for
//              `core:http` and to a delegate invoker for everything else.
// Purpose: Give the runtime's `Services.connectors` field a single
//          `ConnectorInvoker` even though HTTP dispatch and third-party
//          connector dispatch are handled by different mechanisms.
// Dependencies: automatix_core
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use automatix_core::ConnectorContext;
use automatix_core::ConnectorError;
use automatix_core::ConnectorInvoker;
use automatix_core::ConnectorOutcome;
use serde_json::Value;

use crate::http::HttpActionInvoker;

/// Routes `core:http` to an [`HttpActionInvoker`] and every other
/// `appId:operationId` pair to `delegate`.
pub struct CompositeConnectorInvoker {
    /// Serves the built-in `core:http` action.
    http: HttpActionInvoker,
    /// Serves every other connector.
    delegate: Arc<dyn ConnectorInvoker>,
}

impl CompositeConnectorInvoker {
    /// Builds a composite invoker serving `core:http` via `http` and every
    /// other connector via `delegate`.
    #[must_use]
    pub fn new(http: HttpActionInvoker, delegate: Arc<dyn ConnectorInvoker>) -> Self {
        Self { http, delegate }
    }
}

#[async_trait]
impl ConnectorInvoker for CompositeConnectorInvoker {
    async fn invoke(
        &self,
        app_id: &str,
        operation_id: &str,
        params: &Value,
        credentials: &[u8],
        context: &ConnectorContext,
    ) -> Result<ConnectorOutcome, ConnectorError> {
        if app_id == "core" && operation_id == "http" {
            self.http.invoke(app_id, operation_id, params, credentials, context).await
        } else {
            self.delegate.invoke(app_id, operation_id, params, credentials, context).await
        }
    }
}
