//! Best-effort read-through cache in front of identity metadata lookups.
//!
//! The cache is advisory: a miss, an expired entry, or a failing backend only costs a
//! trip to the [`IdentitySource`]. Backend failures are logged and never surfaced.
//! Entries are independent per key, so the in-memory backend needs no cross-key
//! locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::db::Person;
use crate::error::EngineResult;

/// The source of record for person metadata.
pub trait IdentitySource: Send + Sync {
    /// Look up an active person by owner id.
    fn get_by_id(&self, owner_id: &str) -> Result<Option<Person>>;
}

/// Storage behind the metadata cache.
///
/// Implementations report outages as
/// [`EngineError::CacheUnavailable`](crate::error::EngineError::CacheUnavailable).
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> EngineResult<Option<Person>>;
    fn set(&self, key: &str, value: &Person, ttl: Duration) -> EngineResult<()>;
    fn delete(&self, key: &str) -> EngineResult<()>;
}

struct CacheEntry {
    value: Person,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// In-process backend. Expired entries are evicted lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        before.saturating_sub(self.entries.len())
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> EngineResult<Option<Person>> {
        let hit = self
            .entries
            .get(key)
            .and_then(|e| (!e.is_expired()).then(|| e.value.clone()));
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.is_expired());
        }
        Ok(hit)
    }

    fn set(&self, key: &str, value: &Person, ttl: Duration) -> EngineResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> EngineResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Backend that never stores anything; every lookup goes to the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheBackend for NoopCache {
    fn get(&self, _key: &str) -> EngineResult<Option<Person>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &Person, _ttl: Duration) -> EngineResult<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> EngineResult<()> {
        Ok(())
    }
}

/// Create a cache backend from config.
pub fn create_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new())),
        "none" => Ok(Arc::new(NoopCache)),
        other => anyhow::bail!("unknown cache backend: {other}. Supported: memory, none"),
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub backend_errors: u64,
}

/// Read-through metadata cache keyed by owner id.
pub struct MetadataCache {
    backend: Arc<dyn CacheBackend>,
    source: Arc<dyn IdentitySource>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
}

impl MetadataCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        source: Arc<dyn IdentitySource>,
        ttl: Duration,
    ) -> Self {
        Self {
            backend,
            source,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        }
    }

    /// Return cached metadata, or fetch it from the source and populate the cache.
    ///
    /// Only source failures are returned as errors; backend failures fall through to
    /// the source. People who are not found are not cached.
    pub fn get(&self, owner_id: &str) -> Result<Option<Person>> {
        match self.backend.get(owner_id) {
            Ok(Some(person)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(person));
            }
            Ok(None) => {}
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(owner_id, error = %e, "metadata cache read failed, using source");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let person = self.source.get_by_id(owner_id)?;
        if let Some(ref p) = person {
            if let Err(e) = self.backend.set(owner_id, p, self.ttl) {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(owner_id, error = %e, "failed to populate metadata cache");
            }
        }
        Ok(person)
    }

    /// Forget the cached entry for `owner_id`. Must be called after any
    /// out-of-band change to that person in the source.
    pub fn invalidate(&self, owner_id: &str) {
        if let Err(e) = self.backend.delete(owner_id) {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(owner_id, error = %e, "failed to invalidate metadata cache entry");
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}
