// automatix-llm/src/shell.rs
// ============================================================================
// Module: LLM Call Shell
// Description: Wraps a raw LLM provider with fingerprint caching,
//              single-flight, budget enforcement, validate-and-repair, and
//              provider fallback.
// Purpose: Give the Workflow Runtime one `LlmProvider` implementation that
//          carries all of the platform's LLM cost and reliability policy.
// Dependencies: automatix_core, jsonschema
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use automatix_core::Clock;
use automatix_core::LlmProvider;
use automatix_core::LlmProviderError;
use automatix_core::LlmRequest;
use automatix_core::LlmResponse;
use jsonschema::Draft;
use serde_json::Value;

use crate::budget::BudgetDecision;
use crate::budget::BudgetGate;
use crate::cache::FingerprintCache;
use crate::fingerprint::fingerprint;

const DEFAULT_CACHE_TTL_SEC: u64 = 300;

/// Estimates the USD cost of a call before it is made, for the budget gate.
/// Real providers report an exact `costUSD` after the call; this estimate
/// only needs to be a reasonable upper bound so the gate can deny expensive
/// calls before they reach upstream.
///
/// Grounded on no live pricing table; the per-1k-token rate is a
/// conservative placeholder until a provider-specific pricing source is
/// wired in.
fn estimate_cost_usd(request: &LlmRequest) -> f64 {
    const USD_PER_1K_TOKENS: f64 = 0.01;
    let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    let estimated_prompt_tokens = (prompt_chars / 4).max(1) as f64;
    let estimated_completion_tokens = f64::from(request.max_tokens.unwrap_or(512));
    (estimated_prompt_tokens + estimated_completion_tokens) / 1000.0 * USD_PER_1K_TOKENS
}

/// Wraps a raw [`LlmProvider`] with caching, budget enforcement, and
/// validate-and-repair. Itself implements [`LlmProvider`], so a caller
/// holding `Arc<dyn LlmProvider>` cannot distinguish a shell from a raw
/// provider.
pub struct LlmCallShell {
    /// The requested provider.
    primary: Arc<dyn LlmProvider>,
    /// Providers consulted in order when `primary` is unreachable, each
    /// paired with the provider identifier reported in
    /// `LlmResponse::fallback_provider` when it serves the call.
    fallbacks: Vec<(String, Arc<dyn LlmProvider>)>,
    /// The fingerprint cache and single-flight guard map.
    cache: FingerprintCache,
    /// The per-user daily spend cap enforcer.
    budget: Arc<dyn BudgetGate>,
    /// Cache TTL applied when a request does not specify its own.
    default_cache_ttl_sec: u64,
}

impl LlmCallShell {
    /// Builds a shell around `primary`, consulting `fallbacks` in order when
    /// the primary provider is unreachable. Each fallback is paired with its
    /// own provider identifier, reported back in `metadata` when it is the
    /// one that actually served the call.
    #[must_use]
    pub fn new(
        primary: Arc<dyn LlmProvider>,
        fallbacks: Vec<(String, Arc<dyn LlmProvider>)>,
        budget: Arc<dyn BudgetGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { primary, fallbacks, cache: FingerprintCache::new(clock), budget, default_cache_ttl_sec: DEFAULT_CACHE_TTL_SEC }
    }

    /// Overrides the cache TTL applied to requests that do not carry their
    /// own `cacheTtlSec`, per the platform's `llm.cache.defaultTtlSec`
    /// configuration option.
    #[must_use]
    pub const fn with_default_cache_ttl_sec(mut self, default_cache_ttl_sec: u64) -> Self {
        self.default_cache_ttl_sec = default_cache_ttl_sec;
        self
    }

    async fn call_upstream(&self, request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        match self.primary.generate(request).await {
            Ok(response) => Ok(response),
            Err(LlmProviderError::Unreachable(reason)) => {
                for (fallback_id, fallback) in &self.fallbacks {
                    if let Ok(mut response) = fallback.generate(request).await {
                        response.fallback_provider = Some(fallback_id.clone());
                        return Ok(response);
                    }
                }
                Err(LlmProviderError::Unreachable(reason))
            }
            Err(err) => Err(err),
        }
    }

    fn validate(schema: &Value, value: &Value) -> bool {
        let Ok(validator) = jsonschema::options().with_draft(Draft::Draft202012).build(schema) else {
            return false;
        };
        validator.is_valid(value)
    }

    async fn validate_and_repair(
        &self,
        request: &LlmRequest,
        schema: &Value,
        response: LlmResponse,
    ) -> Result<LlmResponse, LlmProviderError> {
        if let Ok(parsed) = serde_json::from_str::<Value>(&response.text) {
            if Self::validate(schema, &parsed) {
                return Ok(LlmResponse { parsed_json: Some(parsed), ..response });
            }
        }

        let repair_prompt = format!(
            "The previous output failed schema validation against {schema}. Return only valid JSON matching that schema, with no surrounding prose. Previous output:\n{}",
            response.text
        );
        let mut repair_messages = request.messages.clone();
        repair_messages.push(automatix_core::LlmMessage { role: "user".to_string(), content: repair_prompt });
        let repair_request = LlmRequest { messages: repair_messages, ..request.clone() };

        let repaired = self.call_upstream(&repair_request).await?;
        match serde_json::from_str::<Value>(&repaired.text) {
            Ok(parsed) if Self::validate(schema, &parsed) => Ok(LlmResponse { parsed_json: Some(parsed), ..repaired }),
            _ => Err(LlmProviderError::SchemaValidationFailed(format!(
                "response did not match schema after one repair attempt: {schema}"
            ))),
        }
    }
}

#[async_trait]
impl LlmProvider for LlmCallShell {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
        let key = fingerprint(request);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(LlmResponse { cache_hit: true, cost_usd: 0.0, ..cached });
        }

        let guard = self.cache.single_flight_guard(&key).await;
        let _permit = guard.lock().await;

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(LlmResponse { cache_hit: true, cost_usd: 0.0, ..cached });
        }

        let estimated = estimate_cost_usd(request);
        if self.budget.check(estimated, &request.user_id, &request.workflow_id).await == BudgetDecision::Denied {
            return Err(LlmProviderError::BudgetExceeded);
        }

        let response = self.call_upstream(request).await?;
        let response = match &request.json_schema {
            Some(schema) => self.validate_and_repair(request, schema, response).await?,
            None => response,
        };

        self.cache.put(&key, response.clone(), self.default_cache_ttl_sec).await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::Ordering;

    use automatix_core::LlmMessage;
    use automatix_core::LlmUsage;
    use time::OffsetDateTime;

    use super::*;
    use crate::budget::InMemoryBudgetGate;
    use crate::stub::StubLlmProvider;

    #[derive(Debug)]
    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH
        }

        fn now_unix_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn request(max_tokens: Option<u32>) -> LlmRequest {
        LlmRequest {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            messages: vec![LlmMessage { role: "user".to_string(), content: "summarize this".to_string() }],
            temperature: None,
            max_tokens,
            json_schema: None,
            user_id: "user-1".to_string(),
            workflow_id: "wf-1".to_string(),
        }
    }

    fn scripted_response() -> LlmResponse {
        LlmResponse {
            text: "done".to_string(),
            parsed_json: None,
            usage: LlmUsage::default(),
            cost_usd: 0.004,
            cache_hit: false,
            fallback_provider: None,
        }
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let primary = Arc::new(StubLlmProvider::new());
        primary.script("openai", "gpt-4o", scripted_response()).await;
        let budget = Arc::new(InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 10.0));
        let shell = LlmCallShell::new(primary.clone(), Vec::new(), budget, Arc::new(FixedClock(AtomicI64::new(0))))
            .with_default_cache_ttl_sec(60);

        let first = shell.generate(&request(None)).await.expect("first call");
        assert!(!first.cache_hit);

        let second = shell.generate(&request(None)).await.expect("second call");
        assert!(second.cache_hit);
        assert_eq!(second.cost_usd, 0.0);
        assert_eq!(second.text, first.text);
        assert_eq!(primary.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn call_over_the_daily_cap_is_denied_before_reaching_upstream() {
        let primary = Arc::new(StubLlmProvider::new());
        primary.script("openai", "gpt-4o", scripted_response()).await;
        let budget = Arc::new(InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 0.01));
        let shell = LlmCallShell::new(primary.clone(), Vec::new(), budget, Arc::new(FixedClock(AtomicI64::new(0))));

        let result = shell.generate(&request(Some(4096))).await;
        assert!(matches!(result, Err(LlmProviderError::BudgetExceeded)));
        assert!(primary.calls().await.is_empty());
    }

    /// A primary that is always unreachable, so `call_upstream` falls
    /// through to the fallback list.
    #[derive(Debug, Default)]
    struct UnreachablePrimary;

    #[async_trait]
    impl LlmProvider for UnreachablePrimary {
        async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmProviderError> {
            Err(LlmProviderError::Unreachable("primary down".to_string()))
        }
    }

    #[tokio::test]
    async fn fallback_metadata_names_the_provider_that_served_the_call() {
        let primary = Arc::new(UnreachablePrimary);
        let fallback = Arc::new(StubLlmProvider::new());
        fallback.script("openai", "gpt-4o", scripted_response()).await;
        let budget = Arc::new(InMemoryBudgetGate::new(Arc::new(FixedClock(AtomicI64::new(0))), 10.0));
        let shell = LlmCallShell::new(
            primary,
            vec![("anthropic".to_string(), fallback.clone())],
            budget,
            Arc::new(FixedClock(AtomicI64::new(0))),
        );

        let response = shell.generate(&request(None)).await.expect("fallback serves the call");
        assert_eq!(response.fallback_provider.as_deref(), Some("anthropic"));
        assert_eq!(fallback.calls().await.len(), 1);
    }
}
