//! Bounded, expiring, single-flight result cache
//!
//! Key features:
//! - Entry-count capacity with least-recently-used eviction (moka)
//! - Per-entry TTL measured from insertion; hits do not extend it
//! - At most one computation per missing key; concurrent callers share it
//! - Computations run on their own task, so a caller that gives up does not
//!   stop the computation from finishing and populating the cache

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, gauge};
use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::debug;

use crate::config::CacheConfig;

use super::types::{CacheEntry, CacheError, CacheStats, Weighted};

type Flight<V, E> = Shared<BoxFuture<'static, Result<Arc<V>, E>>>;

/// Expires each entry after its own TTL, counted from creation or replacement
struct EntryExpiry;

impl<V> Expiry<String, Arc<CacheEntry<V>>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Arc<CacheEntry<V>>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Arc<CacheEntry<V>>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl())
    }
}

/// Concurrency-safe key to value cache with single-flight computation
pub struct ResultCache<V, E> {
    name: &'static str,
    store: Cache<String, Arc<CacheEntry<V>>>,
    in_flight: Arc<DashMap<String, Flight<V, E>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
}

impl<V, E> ResultCache<V, E>
where
    V: Weighted + Send + Sync + 'static,
    E: From<CacheError> + Clone + Send + Sync + 'static,
{
    /// Create a cache; `name` labels its metrics
    pub fn new(name: &'static str, capacity: u64, default_ttl: Duration) -> Self {
        let store = Cache::builder()
            .name(name)
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry)
            .build();

        Self {
            name,
            store,
            in_flight: Arc::new(DashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computes: AtomicU64::new(0),
        }
    }

    pub fn from_config(name: &'static str, config: &CacheConfig) -> Self {
        Self::new(name, config.max_entries, config.ttl)
    }

    /// Look up a live entry, refreshing its recency
    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        match self.store.get(key).await {
            Some(entry) => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("blindview_cache_hits_total", "cache" => self.name).increment(1);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("blindview_cache_misses_total", "cache" => self.name).increment(1);
                None
            }
        }
    }

    /// Bookkeeping for a live entry, without counting a hit
    pub async fn entry(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.store.get(key).await
    }

    /// Insert or replace an entry; `ttl` defaults to the cache's TTL
    pub async fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> Arc<V> {
        let value = Arc::new(value);
        let entry = CacheEntry::new(value.clone(), ttl.unwrap_or(self.default_ttl));
        self.store.insert(key.to_string(), Arc::new(entry)).await;
        value
    }

    /// Remove an entry if present
    pub async fn invalidate(&self, key: &str) {
        self.store.invalidate(key).await;
    }

    /// Return the cached value, or compute it exactly once across concurrent callers
    ///
    /// Failed computations are not cached; every waiter receives the error and the
    /// next call starts a fresh computation.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut compute = Some(compute);

        loop {
            if let Some(value) = self.get(key).await {
                return Ok(value);
            }

            let flight = match self.in_flight.entry(key.to_string()) {
                Entry::Occupied(occupied) => {
                    debug!("Joining in-flight {} computation for {}", self.name, key);
                    occupied.get().clone()
                }
                Entry::Vacant(vacant) => {
                    // Landed between the lookup above and taking the slot
                    if self.store.contains_key(key) {
                        continue;
                    }
                    let Some(compute) = compute.take() else {
                        return Err(E::from(CacheError::ComputeAborted {
                            key: key.to_string(),
                            reason: "computation already consumed".to_string(),
                        }));
                    };
                    let flight = self.launch(key.to_string(), compute());
                    vacant.insert(flight.clone());
                    flight
                }
            };

            return flight.await;
        }
    }

    /// Start a computation on its own task and return a shareable handle to it
    fn launch<Fut>(&self, key: String, fut: Fut) -> Flight<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.computes.fetch_add(1, Ordering::Relaxed);
        let store = self.store.clone();
        let in_flight = self.in_flight.clone();
        let ttl = self.default_ttl;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = fut.await.map(Arc::new);
            if let Ok(value) = &result {
                let entry = CacheEntry::new(value.clone(), ttl);
                store.insert(task_key.clone(), Arc::new(entry)).await;
            }
            // Only after the value is visible, so late callers find it in the store
            in_flight.remove(&task_key);
            result
        });

        let in_flight = self.in_flight.clone();
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    in_flight.remove(&key);
                    Err(E::from(CacheError::ComputeAborted {
                        key,
                        reason: e.to_string(),
                    }))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Flush pending eviction and expiry work
    pub async fn run_pending_tasks(&self) {
        self.store.run_pending_tasks().await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            entry_count: self.store.entry_count(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Publish size and hit-rate gauges
    pub fn record_gauges(&self) {
        let stats = self.stats();
        gauge!("blindview_cache_hit_rate", "cache" => self.name).set(stats.hit_rate());
        gauge!("blindview_cache_entry_count", "cache" => self.name).set(stats.entry_count as f64);
    }
}
