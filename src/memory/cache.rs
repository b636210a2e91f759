//! Query-result cache with TTL and explicit write invalidation.
//!
//! The orchestrator calls [`QueryCache::invalidate`] after every write — no
//! cache entry is authoritative past its TTL, and none survives a write to
//! the corpus it was computed from.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::memory::search::SearchHit;

/// What kind of write occurred. All current kinds flush the whole cache;
/// the distinction is kept for logging and future partial invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Store,
    Update,
    Revise,
    Delete,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub project: String,
    pub limit: usize,
    /// Fixed-point min-confidence (×1000) so the key stays hashable.
    pub min_confidence_milli: u32,
}

struct CacheEntry {
    hits: Vec<SearchHit>,
    inserted_at: Instant,
}

pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchHit>> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.hits.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: CacheKey, hits: Vec<SearchHit>) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key,
            CacheEntry {
                hits,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Eagerly flush on any write.
    pub fn invalidate(&self, kind: WriteKind) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if !entries.is_empty() {
            tracing::debug!(kind = ?kind, flushed = entries.len(), "query cache invalidated");
        }
        entries.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(query: &str) -> CacheKey {
        CacheKey {
            query: query.into(),
            project: "global".into(),
            limit: 10,
            min_confidence_milli: 0,
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.into(),
            content: "cached".into(),
            memory_type: "fact".into(),
            score: 1.0,
            effective_confidence: 0.8,
            confidence_level: crate::memory::confidence::ConfidenceLevel::High,
            retention: 1.0,
            retention_level: crate::memory::retention::RetentionLevel::Strong,
            snippet: None,
            caution: None,
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.put(key("q"), vec![hit("m1")]);
        let cached = cache.get(&key("q")).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, "m1");
    }

    #[test]
    fn miss_after_ttl() {
        let cache = QueryCache::new(Duration::from_millis(0));
        cache.put(key("q"), vec![hit("m1")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key("q")).is_none());
        // Expired entry is evicted on read
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn write_invalidation_flushes_everything() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.put(key("a"), vec![hit("m1")]);
        cache.put(key("b"), vec![hit("m2")]);
        assert_eq!(cache.len(), 2);

        cache.invalidate(WriteKind::Store);
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key("a")).is_none());
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.put(key("a"), vec![hit("m1")]);

        let mut other = key("a");
        other.project = "beta".into();
        assert!(cache.get(&other).is_none());

        let mut other = key("a");
        other.min_confidence_milli = 500;
        assert!(cache.get(&other).is_none());
    }
}
