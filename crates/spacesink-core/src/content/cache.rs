//! Content cache tiers.
//!
//! ```text
//! TieredCache
//!   ├── front: LruContentCache     (process-local, bounded, TTL)
//!   └── back:  DurableContentCache (store table, permanent, insert-only)
//! ```
//!
//! Content uris are derived from the bytes they name, so an entry never goes
//! stale in the durable tier. The TTL only bounds memory in the front tier.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use crate::error::IndexerError;
use crate::store::{CacheEntry, ContentCacheStore};

#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError>;

    /// Insert `entry` unless the uri is already cached, and return the entry
    /// that is cached afterwards (the existing one wins).
    async fn insert(&self, entry: CacheEntry) -> Result<CacheEntry, IndexerError>;
}

// ─── In-memory tier ───────────────────────────────────────────────────────────

pub struct LruContentCache {
    inner: Mutex<LruCache<String, (Instant, CacheEntry)>>,
    ttl: Duration,
}

impl LruContentCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, (Instant, CacheEntry)>> {
        // A poisoned cache only holds immutable entries; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, uri: &str) -> Option<CacheEntry> {
        let mut cache = self.lock();
        let found = cache
            .get(uri)
            .map(|(at, entry)| (at.elapsed() < self.ttl, entry.clone()));
        match found {
            Some((true, entry)) => Some(entry),
            Some((false, _)) => {
                cache.pop(uri);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl ContentCache for LruContentCache {
    async fn get(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError> {
        Ok(self.lookup(uri))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<CacheEntry, IndexerError> {
        if let Some(existing) = self.lookup(&entry.uri) {
            return Ok(existing);
        }
        self.lock().put(entry.uri.clone(), (Instant::now(), entry.clone()));
        Ok(entry)
    }
}

// ─── Durable tier ─────────────────────────────────────────────────────────────

pub struct DurableContentCache {
    store: Arc<dyn ContentCacheStore>,
}

impl DurableContentCache {
    pub fn new(store: Arc<dyn ContentCacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContentCache for DurableContentCache {
    async fn get(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError> {
        self.store.get_content(uri).await
    }

    async fn insert(&self, entry: CacheEntry) -> Result<CacheEntry, IndexerError> {
        if self.store.insert_content(&entry).await? {
            return Ok(entry);
        }
        // Lost a race with another writer; theirs is canonical.
        match self.store.get_content(&entry.uri).await? {
            Some(existing) => Ok(existing),
            None => Err(IndexerError::Storage(format!(
                "content cache row for '{}' vanished after conflict",
                entry.uri
            ))),
        }
    }
}

// ─── Read-through / write-through ─────────────────────────────────────────────

pub struct TieredCache {
    front: Arc<dyn ContentCache>,
    back: Arc<dyn ContentCache>,
}

impl TieredCache {
    pub fn new(front: Arc<dyn ContentCache>, back: Arc<dyn ContentCache>) -> Self {
        Self { front, back }
    }
}

#[async_trait]
impl ContentCache for TieredCache {
    async fn get(&self, uri: &str) -> Result<Option<CacheEntry>, IndexerError> {
        if let Some(hit) = self.front.get(uri).await? {
            return Ok(Some(hit));
        }
        match self.back.get(uri).await? {
            Some(entry) => Ok(Some(self.front.insert(entry).await?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, entry: CacheEntry) -> Result<CacheEntry, IndexerError> {
        let canonical = self.back.insert(entry).await?;
        self.front.insert(canonical).await
    }
}
