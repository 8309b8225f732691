// automatix-connectors/src/http.rs
// ============================================================================
// Module: Generic HTTP Action Invoker
// Description: Connector invoker for the built-in `core:http` action, issuing
//              bounded outbound HTTP calls on a workflow author's behalf.
// Purpose: Give workflows one escape hatch for arbitrary HTTP calls without
//          requiring a dedicated connector definition per endpoint.
// Dependencies: automatix_core, reqwest
// ============================================================================

//! ## Overview
//! `core:http` is the only action this crate gives real transport logic to;
//! every other connector is out of scope per the platform's connector
//! invocation boundary (only the uniform `invoke` contract is specified, not
//! individual API clients' business logic). [`HttpActionInvoker`] enforces
//! scheme, host allowlist, and response-size limits the same way any
//! outbound evidence-gathering call in this codebase does: fail closed on
//! ambiguous or oversized input rather than silently truncate.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use automatix_core::ConnectorContext;
use automatix_core::ConnectorError;
use automatix_core::ConnectorInvoker;
use automatix_core::ConnectorOutcome;
use reqwest::redirect::Policy;
use reqwest::Client;
use reqwest::Method;
use reqwest::Url;
use serde_json::Value;

/// Configuration for the generic HTTP action invoker.
#[derive(Debug, Clone)]
pub struct HttpActionConfig {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response body size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Optional host allowlist; `None` allows any host (subject to scheme).
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// User agent string sent with outbound requests.
    pub user_agent: String,
}

impl Default for HttpActionConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            timeout_ms: 30_000,
            max_response_bytes: 4 * 1024 * 1024,
            allowed_hosts: None,
            user_agent: "automatix/0.1".to_string(),
        }
    }
}

/// Issues the outbound call for a `core:http` action node.
///
/// Expected params: `{ method, url, headers?, query?, body? }`.
pub struct HttpActionInvoker {
    /// Invoker configuration, including limits and host policy.
    config: HttpActionConfig,
    /// The underlying HTTP client.
    client: Client,
}

impl HttpActionInvoker {
    /// Builds an invoker from `config`.
    ///
    /// # Errors
    /// Returns [`ConnectorError::Other`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: HttpActionConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| ConnectorError::Other { message: format!("http client build failed: {err}"), status: None })?;
        Ok(Self { config, client })
    }

    fn validate_url(&self, url: &Url) -> Result<(), ConnectorError> {
        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_http => {}
            other => {
                return Err(ConnectorError::Other { message: format!("unsupported url scheme: {other}"), status: None });
            }
        }
        if let Some(allowlist) = &self.config.allowed_hosts {
            let host = url
                .host_str()
                .ok_or_else(|| ConnectorError::Other { message: "url host required".to_string(), status: None })?;
            if !allowlist.contains(host) {
                return Err(ConnectorError::Other { message: format!("url host not allowed: {host}"), status: None });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectorInvoker for HttpActionInvoker {
    async fn invoke(
        &self,
        app_id: &str,
        operation_id: &str,
        params: &Value,
        _credentials: &[u8],
        _context: &ConnectorContext,
    ) -> Result<ConnectorOutcome, ConnectorError> {
        if app_id != "core" || operation_id != "http" {
            return Err(ConnectorError::Other {
                message: format!("http action invoker cannot serve {app_id}:{operation_id}"),
                status: None,
            });
        }

        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .parse::<Method>()
            .map_err(|err| ConnectorError::Other { message: format!("invalid http method: {err}"), status: None })?;
        let raw_url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError::Other { message: "missing url param".to_string(), status: None })?;
        let url = Url::parse(raw_url)
            .map_err(|err| ConnectorError::Other { message: format!("invalid url: {err}"), status: None })?;
        self.validate_url(&url)?;

        let mut request = self.client.request(method, url.clone());
        if let Some(headers) = params.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(query) = params.get("query").and_then(Value::as_object) {
            let pairs: Vec<(String, String)> = query
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
                .collect();
            request = request.query(&pairs);
        }
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = std::collections::BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        if bytes.len() > self.config.max_response_bytes {
            return Err(ConnectorError::Other { message: "http response exceeds size limit".to_string(), status: Some(status) });
        }
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        if !(200..300).contains(&status) {
            return Err(classify_http_status(status, body));
        }

        Ok(ConnectorOutcome { output: body, cost_usd: None, tokens_used: None, http_status_code: Some(status), headers })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ConnectorError {
    if err.is_timeout() {
        ConnectorError::Timeout
    } else if err.is_connect() || err.is_request() {
        ConnectorError::Transient(err.to_string())
    } else {
        ConnectorError::Other { message: err.to_string(), status: err.status().map(|status| status.as_u16()) }
    }
}

fn classify_http_status(status: u16, body: Value) -> ConnectorError {
    match status {
        429 => ConnectorError::RateLimited { message: body.to_string(), retry_after_secs: None },
        408 | 425 | 500..=599 => ConnectorError::Transient(format!("http {status}: {body}")),
        _ => ConnectorError::Other { message: format!("http {status}: {body}"), status: Some(status) },
    }
}
