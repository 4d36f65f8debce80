//! Small LRU cache of query results, invalidated on any write
//! (spec.md §4.10).
//!
//! Holds only ids, never entry objects, so a cache hit is re-read
//! through the authoritative entry map and reflects current access
//! counts (spec.md §9: "LRU cache with mutable entries -> store ids
//! only").

use std::collections::HashMap;

/// `(query-fingerprint, filter-fingerprint)`.
pub type CacheKey = (String, String);

struct Node {
    key: CacheKey,
    ids: Vec<String>,
}

/// Fixed-capacity LRU keyed by query+filter fingerprint.
pub struct ReadCache {
    capacity: usize,
    order: Vec<CacheKey>,
    entries: HashMap<CacheKey, Node>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        ReadCache {
            capacity,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<String>> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key).map(|n| n.ids.clone())
        } else {
            None
        }
    }

    pub fn put(&mut self, key: CacheKey, ids: Vec<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(key.clone(), Node { key: key.clone(), ids });
            self.touch(&key);
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(key.clone(), Node { key: key.clone(), ids });
        self.order.push(key);
    }

    /// Drop every cached result — called on any mutation (ingest, purge,
    /// forget, feedback).
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn evict_lru(&mut self) {
        if !self.order.is_empty() {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

/// Build a deterministic fingerprint for a query/filter pair so equal
/// queries map to the same cache key.
pub fn fingerprint(query_text: &str, filters: &str) -> CacheKey {
    (query_text.trim().to_lowercase(), filters.to_string())
}
