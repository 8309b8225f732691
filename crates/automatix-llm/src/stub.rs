// automatix-llm/src/stub.rs
// ============================================================================
// Module: Stub LLM Provider
// Description: An in-memory `LlmProvider` returning canned responses, keyed
//              by `provider:model`.
// Purpose: Ground end-to-end test scenarios and stand in for a real vendor
//          SDK in process wiring until one is configured.
// Dependencies: automatix_core, tokio
// ============================================================================

//! Per the platform's LLM provider boundary, only the uniform `generate`
//! contract is specified; no vendor SDK is part of this corpus.
//! [`StubLlmProvider`] stands in for every real `{provider}:{model}` pair,
//! mirroring [`automatix_connectors::StubConnectorInvoker`]'s scripted,
//! fail-loud-on-unregistered-call behavior.

use std::collections::HashMap;

use async_trait::async_trait;
use automatix_core::LlmProvider;
use automatix_core::LlmProviderError;
use automatix_core::LlmRequest;
use automatix_core::LlmResponse;
use tokio::sync::Mutex;

/// An in-memory [`LlmProvider`] returning scripted responses.
///
/// Calls for an unregistered `provider:model` pair return
/// [`LlmProviderError::Other`] naming the missing key, so a misconfigured
/// deployment fails loudly rather than silently returning an empty
/// completion.
#[derive(Default)]
pub struct StubLlmProvider {
    /// Scripted responses, keyed by `"{provider}:{model}"`.
    scripts: Mutex<HashMap<String, LlmResponse>>,
    /// Invocation log, for assertions on call order and arguments.
    calls: Mutex<Vec<LlmRequest>>,
}

impl StubLlmProvider {
    /// Builds a provider with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(provider: &str, model: &str) -> String {
        format!("{provider}:{model}")
    }

    /// Registers `response` to be returned for every call to
    /// `provider:model`.
    pub async fn script(&self, provider: &str, model: &str, response: LlmResponse) {
        self.scripts.lock().await.insert(Self::key(provider, model), response);
    }

    /// Returns the requests made so far, in order.
    pub async fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        let key = Self::key(&request.provider, &request.model);
        self.calls.lock().await.push(request.clone());

        self.scripts
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| LlmProviderError::Other(format!("no scripted response for {key}")))
    }
}

#[cfg(test)]
mod tests {
    use automatix_core::LlmMessage;
    use automatix_core::LlmUsage;

    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            messages: vec![LlmMessage { role: "user".to_string(), content: "hi".to_string() }],
            temperature: None,
            max_tokens: None,
            json_schema: None,
            user_id: "user-1".to_string(),
            workflow_id: "wf-1".to_string(),
        }
    }

    fn scripted_response() -> LlmResponse {
        LlmResponse {
            text: "hello".to_string(),
            parsed_json: None,
            usage: LlmUsage::default(),
            cost_usd: 0.0,
            cache_hit: false,
            fallback_provider: None,
        }
    }

    #[tokio::test]
    async fn scripted_response_is_returned() {
        let provider = StubLlmProvider::new();
        provider.script("openai", "gpt-4o", scripted_response()).await;
        let response = provider.generate(&request()).await.expect("scripted response");
        assert_eq!(response.text, "hello");
    }

    #[tokio::test]
    async fn unscripted_call_fails_loudly() {
        let provider = StubLlmProvider::new();
        let result = provider.generate(&request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let provider = StubLlmProvider::new();
        provider.script("openai", "gpt-4o", scripted_response()).await;
        provider.generate(&request()).await.expect("ok");
        let calls = provider.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, "openai");
    }
}
