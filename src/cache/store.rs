//! TTL key/value store with stale-on-error fallback.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use crate::retry::Classify;

/// One stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Expired once strictly more than `ttl` has passed since it was stored.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.is_past(now, Duration::ZERO)
    }

    /// Expired for longer than `grace`.
    pub fn is_past(&self, now: Instant, grace: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl.saturating_add(grace)
    }
}

/// Cache-wide defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used when a call does not name one.
    pub default_ttl: Duration,
    /// Whether a failed refresh may return an expired entry, unless the
    /// call decides otherwise.
    pub stale_on_error: bool,
    /// How long past its TTL the sweeper keeps an entry while stale
    /// fallback is on.
    pub max_stale: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            stale_on_error: true,
            max_stale: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Per-call options for [`ResponseCache::cached_fetch`].
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    /// Skip the cache lookup and always fetch.
    pub force_refresh: bool,
    /// Key to store under instead of the URL.
    pub cache_key: Option<String>,
    /// Overrides [`CacheConfig::stale_on_error`] for this call.
    pub stale_on_error: Option<bool>,
}

impl CacheOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn stale_on_error(mut self, allowed: bool) -> Self {
        self.stale_on_error = Some(allowed);
        self
    }
}

/// In-memory response cache.
///
/// # Thread Safety
/// Entries sit behind a `std::sync::Mutex`. The lock is never held across
/// an await, so the cache can be shared freely between tasks.
pub struct ResponseCache<V = serde_json::Value> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("ResponseCache")
            .field("entries", &entries)
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Live value for `key`. An expired entry is evicted and `None` returned.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Value for `key` whether or not it has expired.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.lock().get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        self.lock().insert(key, entry);
    }

    /// Whether a live entry exists. Evicts an expired one.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`. Returns whether anything was stored under it.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove every key matching `pattern`. Returns how many were removed.
    pub fn clear_pattern(&self, pattern: &Regex) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(pattern = %pattern, removed, "Cleared cache entries");
        }
        removed
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Evict entries that can no longer serve any read. Returns how many
    /// were removed.
    ///
    /// With stale fallback on, an expired entry is kept until `max_stale`
    /// past its TTL. Otherwise this is [`purge_expired`](Self::purge_expired).
    pub fn purge_unusable(&self) -> usize {
        let grace = if self.config.stale_on_error {
            self.config.max_stale
        } else {
            Duration::ZERO
        };
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_past(now, grace));
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serve `url` from the cache, fetching on a miss.
    ///
    /// - Without `force_refresh`, a live entry is returned and `fetch` never runs.
    /// - A successful fetch is stored under the option's TTL (or the default).
    /// - A failed fetch returns the stored value for the key, even if expired,
    ///   when stale fallback is allowed. Otherwise the error is returned as is.
    /// - A cancelled fetch is always returned as is.
    pub async fn cached_fetch<F, Fut, E>(
        &self,
        url: &str,
        options: &CacheOptions,
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Classify + fmt::Display,
    {
        let key = options.cache_key.as_deref().unwrap_or(url);

        if !options.force_refresh {
            // Leave an expired entry in place: it is the stale fallback.
            if let Some(hit) = self.peek_live(key) {
                debug!(key, "Cache hit");
                return Ok(hit);
            }
        }

        match fetch().await {
            Ok(value) => {
                let ttl = options.ttl.unwrap_or(self.config.default_ttl);
                self.set(key, value.clone(), ttl);
                Ok(value)
            }
            Err(err) if err.is_cancelled() => {
                debug!(key, "Fetch cancelled");
                Err(err)
            }
            Err(err) => {
                let allow_stale = options.stale_on_error.unwrap_or(self.config.stale_on_error);
                if allow_stale {
                    if let Some(stale) = self.get_stale(key) {
                        warn!(key, error = %err, "Fetch failed, serving stale cache entry");
                        return Ok(stale);
                    }
                }
                Err(err)
            }
        }
    }

    fn peek_live(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone + Send + 'static> ResponseCache<V> {
    /// Periodically purge unusable entries until `cancel` fires or the cache
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let purged = cache.purge_unusable();
                        if purged > 0 {
                            debug!(purged, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::cache::ManualClock;
    use crate::retry::ErrorClass;

    #[derive(Debug, PartialEq, Eq)]
    enum FetchError {
        Down(&'static str),
        Cancelled,
    }

    impl fmt::Display for FetchError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Down(reason) => write!(f, "down: {}", reason),
                Self::Cancelled => write!(f, "cancelled"),
            }
        }
    }

    impl Classify for FetchError {
        fn class(&self) -> ErrorClass {
            match self {
                Self::Down(_) => ErrorClass::Retryable,
                Self::Cancelled => ErrorClass::Cancelled,
            }
        }
    }

    fn manual_cache() -> (ResponseCache<serde_json::Value>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::with_clock(CacheConfig::default(), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_get_set_delete() {
        let (cache, _clock) = manual_cache();
        assert_eq!(cache.get("/budgets"), None);

        cache.set("/budgets", json!([1, 2]), Duration::from_secs(1));
        assert_eq!(cache.get("/budgets"), Some(json!([1, 2])));
        assert!(cache.has("/budgets"));

        assert!(cache.delete("/budgets"));
        assert!(!cache.delete("/budgets"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let (cache, clock) = manual_cache();
        cache.set("/expenses", json!("v"), Duration::from_millis(100));

        clock.advance(Duration::from_millis(100));
        assert!(cache.has("/expenses"), "exactly ttl is still live");

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("/expenses"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_stale("/expenses"), None);
    }

    #[test]
    fn test_get_stale_ignores_expiry() {
        let (cache, clock) = manual_cache();
        cache.set("/income", json!(5), Duration::from_millis(10));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_stale("/income"), Some(json!(5)));
    }

    #[test]
    fn test_clear_pattern() {
        let (cache, _clock) = manual_cache();
        let ttl = Duration::from_secs(60);
        cache.set("/expenses", json!(1), ttl);
        cache.set("/expenses?month=2026-10", json!(2), ttl);
        cache.set("/budgets", json!(3), ttl);

        let removed = cache.clear_pattern(&Regex::new("^/expenses").unwrap());
        assert_eq!(removed, 2);
        assert!(cache.has("/budgets"));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = manual_cache();
        cache.set("short", json!(1), Duration::from_millis(10));
        cache.set("long", json!(2), Duration::from_secs(10));
        clock.advance(Duration::from_millis(50));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.has("long"));
    }

    #[tokio::test]
    async fn test_cached_fetch_respects_ttl() {
        let (cache, clock) = manual_cache();
        let fetches = AtomicU32::new(0);
        let options = CacheOptions::with_ttl(Duration::from_millis(100));
        let fetch = || {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, FetchError>(json!({ "fetch": n })) }
        };

        let first = cache.cached_fetch("/budgets", &options, fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(50));
        let second = cache.cached_fetch("/budgets", &options, fetch).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(100));
        let third = cache.cached_fetch("/budgets", &options, fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(third, json!({ "fetch": 1 }));
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let (cache, _clock) = manual_cache();
        cache.set("/budgets", json!("old"), Duration::from_secs(60));

        let value = cache
            .cached_fetch("/budgets", &CacheOptions::refresh(), || async {
                Ok::<_, FetchError>(json!("new"))
            })
            .await
            .unwrap();
        assert_eq!(value, json!("new"));
        assert_eq!(cache.get("/budgets"), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_value() {
        let (cache, clock) = manual_cache();
        let options = CacheOptions::with_ttl(Duration::from_millis(100));
        cache
            .cached_fetch("/budgets", &options, || async { Ok::<_, FetchError>(json!("cached")) })
            .await
            .unwrap();

        clock.advance(Duration::from_millis(150));
        let value = cache
            .cached_fetch("/budgets", &options, || async {
                Err::<serde_json::Value, _>(FetchError::Down("connection refused"))
            })
            .await;
        assert_eq!(value, Ok(json!("cached")));
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates() {
        let (cache, _clock) = manual_cache();
        let result = cache
            .cached_fetch("/budgets", &CacheOptions::default(), || async {
                Err::<serde_json::Value, _>(FetchError::Down("boom"))
            })
            .await;
        assert_eq!(result, Err(FetchError::Down("boom")));
    }

    #[tokio::test]
    async fn test_stale_fallback_can_be_disabled_per_call() {
        let (cache, clock) = manual_cache();
        cache.set("/balance", json!(100), Duration::from_millis(10));
        clock.advance(Duration::from_millis(20));

        let options = CacheOptions::default().stale_on_error(false);
        let result = cache
            .cached_fetch("/balance", &options, || async {
                Err::<serde_json::Value, _>(FetchError::Down("timeout"))
            })
            .await;
        assert_eq!(result, Err(FetchError::Down("timeout")));
    }

    #[tokio::test]
    async fn test_explicit_cache_key() {
        let (cache, _clock) = manual_cache();
        let options = CacheOptions::default().key("budgets:all");
        cache
            .cached_fetch("/budgets?page=1", &options, || async { Ok::<_, FetchError>(json!(1)) })
            .await
            .unwrap();
        assert!(cache.has("budgets:all"));
        assert!(!cache.has("/budgets?page=1"));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_skips_stale_value() {
        let (cache, clock) = manual_cache();
        cache.set("/expenses", json!("cached"), Duration::from_millis(10));
        clock.advance(Duration::from_millis(20));

        let result = cache
            .cached_fetch("/expenses", &CacheOptions::default(), || async {
                Err::<serde_json::Value, _>(FetchError::Cancelled)
            })
            .await;
        assert_eq!(result, Err(FetchError::Cancelled));
        assert_eq!(cache.get_stale("/expenses"), Some(json!("cached")));
    }

    #[test]
    fn test_purge_unusable_keeps_entries_within_max_stale() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            max_stale: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        let cache = ResponseCache::with_clock(config, clock.clone());
        cache.set("/budgets", json!(1), Duration::from_secs(10));

        clock.advance(Duration::from_secs(70));
        assert_eq!(cache.purge_unusable(), 0);
        assert_eq!(cache.get_stale("/budgets"), Some(json!(1)));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.purge_unusable(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_unusable_without_stale_fallback() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            stale_on_error: false,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::with_clock(config, clock.clone());
        cache.set("/budgets", json!(1), Duration::from_secs(10));

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.purge_unusable(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let config = CacheConfig {
            stale_on_error: false,
            ..CacheConfig::default()
        };
        let cache = Arc::new(ResponseCache::<serde_json::Value>::new(config));
        cache.set("short", json!(1), Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(Duration::from_millis(50), cancel.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.len(), 0);

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_stale_fallback() {
        let cache = Arc::new(ResponseCache::<serde_json::Value>::default());
        let cancel = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(Duration::from_secs(60), cancel.clone());
        let options = CacheOptions::with_ttl(Duration::from_secs(300));

        cache
            .cached_fetch("/budgets", &options, || async { Ok::<_, FetchError>(json!("cached")) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(361)).await;
        let value = cache
            .cached_fetch("/budgets", &options, || async {
                Err::<serde_json::Value, _>(FetchError::Down("offline"))
            })
            .await;
        assert_eq!(value, Ok(json!("cached")));

        cancel.cancel();
        sweeper.await.unwrap();
    }
}
