//! Resource-side JWKS cache.
//!
//! Holds the published signing keys by `kid`. A lookup that misses (or
//! hits a TTL-expired cache) refreshes from the JWKS endpoint, with two
//! guards: a single-flight mutex so N concurrent misses cost one upstream
//! request, and a leaky-bucket limit on refresh attempts per rolling
//! minute so a flood of bad tokens cannot hammer the endpoint. Calls that
//! land over the limit fail closed as `UNAUTHENTICATED`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};

use crate::error::RpcError;
use crate::utils::jwt::{decoding_key_from_jwk, JwksDocument};

/// Fetches the JWKS document. Abstracted so tests can stub the endpoint.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<JwksDocument>;
}

/// HTTP fetcher for the real endpoint.
pub struct HttpJwksFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksFetcher {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> anyhow::Result<JwksDocument> {
        tracing::info!(url = %self.url, "fetching JWKS");
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let document: JwksDocument = response.json().await?;
        Ok(document)
    }
}

struct CacheState {
    keys: HashMap<String, DecodingKey>,
    last_fetch: Option<Instant>,
    refresh_attempts: VecDeque<Instant>,
}

/// Process-wide key cache. Readers share the lock; refresh serializes
/// through `refresh_flight`.
pub struct JwksCache {
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    refresh_limit: usize,
    state: RwLock<CacheState>,
    refresh_flight: Mutex<()>,
}

const REFRESH_WINDOW: Duration = Duration::from_secs(60);

impl JwksCache {
    /// # Arguments
    /// * `fetcher` - JWKS endpoint access
    /// * `ttl_seconds` - cache lifetime before a lazy refresh
    /// * `refresh_limit` - max refresh attempts per rolling minute
    pub fn new(fetcher: Arc<dyn JwksFetcher>, ttl_seconds: u64, refresh_limit: usize) -> Self {
        Self {
            fetcher,
            ttl: Duration::from_secs(ttl_seconds),
            refresh_limit,
            state: RwLock::new(CacheState {
                keys: HashMap::new(),
                last_fetch: None,
                refresh_attempts: VecDeque::new(),
            }),
            refresh_flight: Mutex::new(()),
        }
    }

    /// Look up the decoding key for a `kid`, refreshing the cache when the
    /// key is unknown or the cache is past its TTL.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, RpcError> {
        // Fast path: fresh cache hit under the read lock.
        {
            let state = self.state.read().await;
            if let Some(key) = state.keys.get(kid) {
                if !self.is_stale(&state) {
                    return Ok(key.clone());
                }
            }
        }

        // Slow path: serialize refreshes. Whoever wins the flight fetches;
        // everyone queued behind re-checks and usually finds the key.
        let _flight = self.refresh_flight.lock().await;

        {
            let state = self.state.read().await;
            if let Some(key) = state.keys.get(kid) {
                if !self.is_stale(&state) {
                    return Ok(key.clone());
                }
            }
        }

        self.refresh_locked().await?;

        let state = self.state.read().await;
        state
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| RpcError::Unauthenticated(format!("unknown signing key: {}", kid)))
    }

    /// Refresh unconditionally (still rate limited).
    #[allow(dead_code)]
    pub async fn force_refresh(&self) -> Result<(), RpcError> {
        let _flight = self.refresh_flight.lock().await;
        self.refresh_locked().await
    }

    /// Number of refresh attempts inside the current rolling window.
    /// Exposed for observability.
    #[allow(dead_code)]
    pub async fn recent_refresh_attempts(&self) -> usize {
        let now = Instant::now();
        let state = self.state.read().await;
        state
            .refresh_attempts
            .iter()
            .filter(|t| now.duration_since(**t) < REFRESH_WINDOW)
            .count()
    }

    fn is_stale(&self, state: &CacheState) -> bool {
        match state.last_fetch {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// Caller must hold `refresh_flight`.
    async fn refresh_locked(&self) -> Result<(), RpcError> {
        let now = Instant::now();

        // Leaky bucket over the rolling window.
        {
            let mut state = self.state.write().await;
            while let Some(front) = state.refresh_attempts.front() {
                if now.duration_since(*front) >= REFRESH_WINDOW {
                    state.refresh_attempts.pop_front();
                } else {
                    break;
                }
            }
            if state.refresh_attempts.len() >= self.refresh_limit {
                return Err(RpcError::Unauthenticated(
                    "signing key unavailable".to_string(),
                ));
            }
            state.refresh_attempts.push_back(now);
        }

        let document = self.fetcher.fetch().await.map_err(|e| {
            tracing::warn!(error = %e, "JWKS refresh failed");
            RpcError::Unauthenticated("signing key unavailable".to_string())
        })?;

        let mut keys = HashMap::with_capacity(document.keys.len());
        for jwk in &document.keys {
            match decoding_key_from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(jwk.kid.clone(), key);
                }
                Err(e) => {
                    tracing::warn!(kid = %jwk.kid, error = %e, "skipping unparseable JWK");
                }
            }
        }

        let mut state = self.state.write().await;
        state.keys = keys;
        state.last_fetch = Some(Instant::now());
        tracing::info!(key_count = state.keys.len(), "JWKS cache refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jwt::test_keys::{OTHER_KEY_PAIR, TEST_KEY_PAIR};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        calls: AtomicUsize,
        documents: std::sync::Mutex<Vec<anyhow::Result<JwksDocument>>>,
    }

    impl StubFetcher {
        fn serving(kid: &str) -> Arc<Self> {
            let doc = JwksDocument::from_public_key_pem(&TEST_KEY_PAIR.1, kid).unwrap();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                documents: std::sync::Mutex::new(vec![Ok(doc)]),
            })
        }

        fn sequence(documents: Vec<anyhow::Result<JwksDocument>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                documents: std::sync::Mutex::new(documents),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwksFetcher for StubFetcher {
        async fn fetch(&self) -> anyhow::Result<JwksDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut documents = self.documents.lock().unwrap();
            if documents.len() > 1 {
                documents.remove(0)
            } else {
                // Keep serving the last configured document.
                match &documents[0] {
                    Ok(doc) => Ok(doc.clone()),
                    Err(e) => Err(anyhow::anyhow!("{}", e)),
                }
            }
        }
    }

    #[tokio::test]
    async fn miss_triggers_single_fetch_then_caches() {
        let fetcher = StubFetcher::serving("k1");
        let cache = JwksCache::new(fetcher.clone(), 3600, 3);

        assert!(cache.get_key("k1").await.is_ok());
        assert!(cache.get_key("k1").await.is_ok());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_refresh() {
        let fetcher = StubFetcher::serving("k1");
        let cache = Arc::new(JwksCache::new(fetcher.clone(), 3600, 3));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_key("k1").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_rejects_without_key() {
        let fetcher = StubFetcher::serving("k1");
        let cache = JwksCache::new(fetcher.clone(), 3600, 3);

        let err = match cache.get_key("k2").await {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, RpcError::Unauthenticated(_)));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn refresh_attempts_are_rate_limited() {
        let fetcher = StubFetcher::serving("k1");
        let cache = JwksCache::new(fetcher.clone(), 3600, 3);

        // Each lookup of a kid the endpoint never publishes consumes one
        // refresh attempt, up to the limit.
        for _ in 0..3 {
            assert!(cache.get_key("missing").await.is_err());
        }
        assert_eq!(fetcher.call_count(), 3);

        // Over the limit: rejected without another upstream request.
        assert!(cache.get_key("missing").await.is_err());
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(cache.recent_refresh_attempts().await, 3);
    }

    #[tokio::test]
    async fn fetch_failure_rejects_as_unauthenticated() {
        let fetcher = StubFetcher::sequence(vec![Err(anyhow::anyhow!("connection refused"))]);
        let cache = JwksCache::new(fetcher, 3600, 3);

        let err = match cache.get_key("k1").await {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, RpcError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn rotation_replaces_key_set() {
        let k1 = JwksDocument::from_public_key_pem(&TEST_KEY_PAIR.1, "k1").unwrap();
        let k2 = JwksDocument::from_public_key_pem(&OTHER_KEY_PAIR.1, "k2").unwrap();
        let fetcher = StubFetcher::sequence(vec![Ok(k1), Ok(k2)]);
        let cache = JwksCache::new(fetcher.clone(), 3600, 3);

        assert!(cache.get_key("k1").await.is_ok());

        // The publisher rotated; the miss on k2 refreshes and picks it up.
        assert!(cache.get_key("k2").await.is_ok());
        assert_eq!(fetcher.call_count(), 2);

        // Old kid is gone after the swap, and the failed lookup burns the
        // last attempt in the window.
        assert!(cache.get_key("k1").await.is_err());
    }

    #[tokio::test]
    async fn expired_ttl_refreshes_lazily() {
        let fetcher = StubFetcher::serving("k1");
        let cache = JwksCache::new(fetcher.clone(), 0, 5);

        assert!(cache.get_key("k1").await.is_ok());
        // TTL of zero: every lookup is stale and refreshes again.
        assert!(cache.get_key("k1").await.is_ok());
        assert_eq!(fetcher.call_count(), 2);
    }
}
