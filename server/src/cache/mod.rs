//! In-memory result caching
//!
//! `ResultCache` memoizes detection masks and try-on results. Entries are
//! bounded by count (LRU) and by age (TTL), and concurrent misses on the same
//! key share a single computation.

mod result_cache;
mod types;

pub use result_cache::ResultCache;
pub use types::{CacheEntry, CacheError, CacheStats, Weighted};
