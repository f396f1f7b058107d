//! Cache entry, statistics and error types

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::imagery::{DetectionMask, OverlayResult};

/// Failures of the cache machinery itself (never of the computed value)
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cached computation for {key} was aborted: {reason}")]
    ComputeAborted { key: String, reason: String },
}

/// Approximate in-memory size of a cached value
pub trait Weighted {
    fn weight(&self) -> u64;
}

impl Weighted for DetectionMask {
    fn weight(&self) -> u64 {
        self.alpha().as_raw().len() as u64
    }
}

impl Weighted for OverlayResult {
    fn weight(&self) -> u64 {
        self.pixels.as_raw().len() as u64
    }
}

/// One cached value plus its bookkeeping
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    /// Nanoseconds after `created_at` of the most recent hit
    last_access: AtomicU64,
    ttl: Duration,
    weight: u64,
}

impl<V: Weighted> CacheEntry<V> {
    pub fn new(value: Arc<V>, ttl: Duration) -> Self {
        let weight = value.weight();
        Self {
            value,
            created_at: Instant::now(),
            last_access: AtomicU64::new(0),
            ttl,
            weight,
        }
    }
}

impl<V> CacheEntry<V> {
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_access(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_access.load(Ordering::Relaxed))
    }

    /// Record a hit; the only mutation an entry ever sees
    pub fn touch(&self) {
        let nanos = self.created_at.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.last_access.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total lookups that found a live entry
    pub hits: u64,
    /// Total lookups that found nothing
    pub misses: u64,
    /// Computations started on behalf of a miss
    pub computes: u64,
    /// Number of live entries (approximate)
    pub entry_count: u64,
    /// Computations currently running
    pub in_flight: usize,
}

impl CacheStats {
    /// Hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
