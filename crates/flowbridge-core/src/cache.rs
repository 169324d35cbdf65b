//! Read cache for target records.
//!
//! [`RecordCache`] evicts by least-recent use and by age. [`CachedTarget`]
//! puts one in front of any [`TargetStore`] and invalidates an entry on every
//! write or delete that goes through it.

use crate::error::StoreError;
use crate::record::Record;
use crate::target::{RecordFilter, TargetStore};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

type CacheKey = (String, String);

/// Cache sizing and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached records.
    pub capacity: usize,
    /// Age after which an entry is no longer served.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the time to live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries dropped for capacity or age.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped by explicit invalidation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

struct CacheEntry {
    record: Record,
    inserted_at: Instant,
}

/// LRU + TTL cache of records keyed by `(table, id)`.
pub struct RecordCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    stats: CacheStats,
}

impl RecordCache {
    /// Create a cache.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl,
            stats: CacheStats::default(),
        }
    }

    /// Get a live entry.
    pub fn get(&self, table: &str, id: &str) -> Option<Record> {
        let key = (table.to_string(), id.to_string());
        let mut entries = self.entries.lock();

        let expired = match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.record.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or refresh an entry.
    pub fn insert(&self, table: &str, record: Record) {
        let key = (table.to_string(), record.id.clone());
        let entry = CacheEntry {
            record,
            inserted_at: Instant::now(),
        };
        if let Some((pushed_out, _)) = self.entries.lock().push(key.clone(), entry) {
            if pushed_out != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop one entry.
    pub fn invalidate(&self, table: &str, id: &str) {
        let key = (table.to_string(), id.to_string());
        if self.entries.lock().pop(&key).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// A [`TargetStore`] with a read cache in front of it.
pub struct CachedTarget<T> {
    inner: T,
    cache: RecordCache,
}

impl<T: TargetStore> CachedTarget<T> {
    /// Wrap a store.
    pub fn new(inner: T, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: RecordCache::new(config),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The cache, for statistics and manual invalidation.
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }
}

impl<T: TargetStore> TargetStore for CachedTarget<T> {
    fn save(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        // Invalidate even when the write fails; the backend may have applied it.
        let result = self.inner.save(table, record);
        self.cache.invalidate(table, &record.id);
        result
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        if let Some(record) = self.cache.get(table, id) {
            return Ok(Some(record));
        }
        let record = self.inner.get(table, id)?;
        if let Some(record) = &record {
            self.cache.insert(table, record.clone());
        }
        Ok(record)
    }

    fn list_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_ids(table)
    }

    fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        let result = self.inner.delete(table, id);
        self.cache.invalidate(table, id);
        result
    }

    fn query(&self, table: &str, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        self.inner.query(table, filter)
    }
}
