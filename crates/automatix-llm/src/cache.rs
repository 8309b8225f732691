// automatix-llm/src/cache.rs
// ============================================================================
// Module: Fingerprint Cache
// Description: TTL-bounded cache of LLM responses keyed by fingerprint, with
//              a per-key single-flight guard.
// Purpose: Serve repeated identical requests without a second upstream call,
//          and collapse concurrent identical requests into one.
// Dependencies: automatix_core, tokio
// ============================================================================

//! A cache entry's TTL is set per-request (`cacheTtlSec`, defaulted by the
//! caller), not per-cache, since different node calls may want different
//! staleness tolerances for the same provider and model.

use std::collections::HashMap;
use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::LlmResponse;
use tokio::sync::Mutex;

#[derive(Clone)]
struct Entry {
    /// The cached response.
    response: LlmResponse,
    /// When this entry stops being servable, in unix-millis.
    expires_at_unix_millis: i64,
}

/// A fingerprint-keyed cache of LLM responses with single-flight dedup of
/// concurrent identical requests.
pub struct FingerprintCache {
    /// Clock used for TTL expiry checks.
    clock: Arc<dyn Clock>,
    /// Cached responses by fingerprint.
    entries: Mutex<HashMap<String, Entry>>,
    /// Per-fingerprint single-flight guards.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FingerprintCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, entries: Mutex::new(HashMap::new()), in_flight: Mutex::new(HashMap::new()) }
    }

    /// Returns a cached response for `fingerprint`, if present and not
    /// expired. An expired entry is evicted on lookup.
    pub async fn get(&self, fingerprint: &str) -> Option<LlmResponse> {
        let now = self.clock.now_unix_millis();
        let mut entries = self.entries.lock().await;
        match entries.get(fingerprint) {
            Some(entry) if entry.expires_at_unix_millis > now => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    /// Stores `response` under `fingerprint` for `ttl_sec` seconds.
    pub async fn put(&self, fingerprint: &str, response: LlmResponse, ttl_sec: u64) {
        let expires_at_unix_millis =
            self.clock.now_unix_millis() + i64::try_from(ttl_sec.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.entries.lock().await.insert(fingerprint.to_string(), Entry { response, expires_at_unix_millis });
    }

    /// Returns the single-flight guard mutex for `fingerprint`, creating one
    /// if absent. Callers must lock the returned mutex for the duration of
    /// their upstream call; concurrent callers for the same fingerprint
    /// block on the same lock rather than issuing redundant upstream calls.
    pub async fn single_flight_guard(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.entry(fingerprint.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::Ordering;

    use automatix_core::LlmUsage;
    use time::OffsetDateTime;

    use super::*;

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

    fn response() -> LlmResponse {
        LlmResponse {
            text: "hi".to_string(),
            parsed_json: None,
            usage: LlmUsage::default(),
            cost_usd: 0.01,
            cache_hit: false,
            fallback_provider: None,
        }
    }

    #[tokio::test]
    async fn missing_fingerprint_returns_none() {
        let cache = FingerprintCache::new(Arc::new(FixedClock(AtomicI64::new(0))));
        assert!(cache.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn stored_entry_is_returned_before_expiry() {
        let cache = FingerprintCache::new(Arc::new(FixedClock(AtomicI64::new(0))));
        cache.put("abc", response(), 60).await;
        assert!(cache.get("abc").await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_and_returns_none() {
        let clock = Arc::new(FixedClock(AtomicI64::new(0)));
        let cache = FingerprintCache::new(clock.clone());
        cache.put("abc", response(), 10).await;
        clock.0.store(11_000, Ordering::SeqCst);
        assert!(cache.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn single_flight_guard_is_shared_across_callers() {
        let cache = FingerprintCache::new(Arc::new(FixedClock(AtomicI64::new(0))));
        let first = cache.single_flight_guard("abc").await;
        let second = cache.single_flight_guard("abc").await;
        assert!(Arc::ptr_eq(&first, &second));
    }
}
