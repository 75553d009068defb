//! Time-bounded caching of market data and finished analyses

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::domain::{Fundamentals, TimeSeries};
use crate::engine::AnalysisResult;

/// Source of the current instant, injectable for tests
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Cache key for data and analysis requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Normalised ticker symbol
    pub symbol: String,
    /// Data set or report section the entry belongs to
    pub section: String,
    /// Additional parameters as a JSON string
    pub params: String,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, section: impl Into<String>, params: impl Serialize) -> Self {
        Self {
            symbol: symbol.into(),
            section: section.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) <= self.ttl
    }
}

/// Thread-safe TTL cache.
///
/// An entry is served while its age is at most the TTL. Expired entries are
/// evicted on access or by [`AnalysisCache::clear_expired`].
#[derive(Debug)]
pub struct AnalysisCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    in_flight: Arc<Mutex<HashMap<K, Arc<Mutex<()>>>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> Clone for AnalysisCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            in_flight: Arc::clone(&self.in_flight),
            ttl: self.ttl,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K, V> AnalysisCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`; an expired entry is evicted.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            entries.remove(key);
        }
        None
    }

    /// Store or overwrite a value stamped with the current instant.
    pub async fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
            ttl: self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Return the cached value or run `fetcher` and cache its result.
    ///
    /// Concurrent misses for one key are serialised so that only the first
    /// caller fetches. Errors are returned and not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!("Cache hit for key: {:?}", key);
            return Ok(value);
        }

        let key_lock = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = key_lock.lock().await;
            if let Some(value) = self.get(&key).await {
                tracing::debug!("Cache filled while waiting for key: {:?}", key);
                Ok(value)
            } else {
                tracing::debug!("Cache miss for key: {:?}", key);
                match fetcher().await {
                    Ok(value) => {
                        self.set(key.clone(), value.clone()).await;
                        Ok(value)
                    }
                    Err(err) => Err(err),
                }
            }
        };

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(&key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &key_lock) && Arc::strong_count(lock) <= 2)
        {
            in_flight.remove(&key);
        }

        result
    }

    /// Remove every expired entry; returns how many were removed.
    pub async fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One cache per data domain, each with its own TTL
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Price series, short TTL
    pub prices: AnalysisCache<CacheKey, TimeSeries>,
    /// Company fundamentals
    pub fundamentals: AnalysisCache<CacheKey, Fundamentals>,
    /// Finished analysis reports
    pub analysis: AnalysisCache<CacheKey, AnalysisResult>,
}

impl CacheManager {
    pub fn new(prices_ttl: Duration, fundamentals_ttl: Duration, analysis_ttl: Duration) -> Self {
        Self::with_clock(prices_ttl, fundamentals_ttl, analysis_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        prices_ttl: Duration,
        fundamentals_ttl: Duration,
        analysis_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prices: AnalysisCache::with_clock(prices_ttl, Arc::clone(&clock)),
            fundamentals: AnalysisCache::with_clock(fundamentals_ttl, Arc::clone(&clock)),
            analysis: AnalysisCache::with_clock(analysis_ttl, clock),
        }
    }

    /// Sweep all caches; returns the total number of evicted entries.
    pub async fn clear_expired_all(&self) -> usize {
        let removed = self.prices.clear_expired().await
            + self.fundamentals.clear_expired().await
            + self.analysis.clear_expired().await;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.prices.clear().await;
        self.fundamentals.clear().await;
        self.analysis.clear().await;
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(300),  // 5 minutes for prices
            Duration::from_secs(3600), // 1 hour for fundamentals
            Duration::from_secs(3600), // 1 hour for analyses
        )
    }
}
