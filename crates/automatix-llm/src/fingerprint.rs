// automatix-llm/src/fingerprint.rs
// ============================================================================
// Module: Fingerprint
// Description: Deterministic cache key for an LLM request.
// Purpose: Let identical requests (same provider, model, messages,
//          sampling, and schema) share one cached response.
// Dependencies: automatix_core, serde_json
// ============================================================================

//! Fingerprinting canonicalizes the parts of an [`automatix_core::LlmRequest`]
//! that determine its output and hashes them with
//! [`automatix_core::hash_canonical_json`], the same canonical-JSON hashing
//! used for dedupe hashes elsewhere in the platform.

use automatix_core::LlmRequest;
use serde_json::json;
use serde_json::Value;

/// Computes the cache fingerprint for a request: `H(provider, model,
/// canonicalized messages, temperature, maxTokens, jsonSchema)`.
///
/// Two requests differing only in fields outside this list (for example
/// `cacheTtlSec`, which governs how long a fingerprint's entry lives rather
/// than what it represents) fingerprint identically.
#[must_use]
pub fn fingerprint(request: &LlmRequest) -> String {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| json!({"role": message.role, "content": message.content}))
        .collect();
    let parts = json!({
        "provider": request.provider,
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "json_schema": request.json_schema,
    });
    automatix_core::hash_canonical_json(automatix_core::DEFAULT_HASH_ALGORITHM, &parts)
        .map(|digest| digest.value)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use automatix_core::LlmMessage;

    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            messages: vec![LlmMessage { role: "user".to_string(), content: "hello".to_string() }],
            temperature: Some(0.2),
            max_tokens: Some(256),
            json_schema: None,
            user_id: "user-1".to_string(),
            workflow_id: "wf-1".to_string(),
        }
    }

    #[test]
    fn identical_requests_fingerprint_identically() {
        assert_eq!(fingerprint(&request()), fingerprint(&request()));
    }

    #[test]
    fn differing_messages_fingerprint_differently() {
        let mut other = request();
        other.messages[0].content = "goodbye".to_string();
        assert_ne!(fingerprint(&request()), fingerprint(&other));
    }

    #[test]
    fn differing_json_schema_fingerprints_differently() {
        let mut other = request();
        other.json_schema = Some(json!({"type": "object"}));
        assert_ne!(fingerprint(&request()), fingerprint(&other));
    }

    #[test]
    fn message_order_matters() {
        let mut reordered = request();
        reordered.messages.push(LlmMessage { role: "user".to_string(), content: "again".to_string() });
        let mut reordered_swapped = reordered.clone();
        reordered_swapped.messages.swap(0, 1);
        assert_ne!(fingerprint(&reordered), fingerprint(&reordered_swapped));
    }
}
