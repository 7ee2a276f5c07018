//! Per-document memoization of tracking snapshots and diagnostics.
//!
//! Entries are keyed by document identity and guarded by the document
//! version: a lookup only hits when the cached version equals the requested
//! one, and a write for an older version never replaces a newer entry.
//! Eviction is least-recently-used at a fixed capacity.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tower_lsp::lsp_types::Diagnostic;
use tracing::trace;

use crate::tracking::TrackingState;

pub const DEFAULT_CAPACITY: usize = 64;

/// Cached results for one version of one document.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub version: i32,
    pub tracking: Option<Arc<TrackingState>>,
    pub diagnostics: Option<Arc<Vec<Diagnostic>>>,
}

impl CacheEntry {
    fn empty(version: i32) -> Self {
        CacheEntry {
            version,
            tracking: None,
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheInner<K> {
    /// Access order: front is least recently used.
    entries: IndexMap<K, CacheEntry>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone> CacheInner<K> {
    fn touch(&mut self, key: &K) {
        if let Some(index) = self.entries.get_index_of(key) {
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
        }
    }

    fn lookup<T>(
        &mut self,
        key: &K,
        version: i32,
        field: impl Fn(&CacheEntry) -> Option<T>,
    ) -> Option<T> {
        let found = self
            .entries
            .get(key)
            .filter(|entry| entry.version == version)
            .and_then(field);
        match found {
            Some(value) => {
                self.hits += 1;
                self.touch(key);
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Entry for `key` at `version`, created or reset as needed. `None` when
    /// the cache already holds a newer version.
    fn entry_for_write(&mut self, key: &K, version: i32) -> Option<&mut CacheEntry> {
        match self.entries.get(key).map(|e| e.version) {
            Some(current) if current > version => {
                trace!(current, version, "ignoring stale cache write");
                return None;
            }
            Some(current) => {
                if current < version {
                    self.entries.insert(key.clone(), CacheEntry::empty(version));
                }
                self.touch(key);
            }
            None => {
                while self.entries.len() >= self.capacity {
                    self.entries.shift_remove_index(0);
                    self.evictions += 1;
                }
                self.entries.insert(key.clone(), CacheEntry::empty(version));
            }
        }
        self.entries.get_mut(key)
    }

    fn shrink_to_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
            self.evictions += 1;
        }
    }
}

/// LRU cache of analysis results. All operations take one lock over the
/// whole map, so concurrent callers see them in a single order.
#[derive(Debug)]
pub struct DocumentCache<K> {
    inner: Mutex<CacheInner<K>>,
}

impl<K: Hash + Eq + Clone> Default for DocumentCache<K> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<K: Hash + Eq + Clone> DocumentCache<K> {
    pub fn new(capacity: usize) -> Self {
        DocumentCache {
            inner: Mutex::new(CacheInner {
                entries: IndexMap::new(),
                capacity: capacity.max(1),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn get_tracking(&self, key: &K, version: i32) -> Option<Arc<TrackingState>> {
        self.inner
            .lock()
            .lookup(key, version, |entry| entry.tracking.clone())
    }

    pub fn get_diagnostics(&self, key: &K, version: i32) -> Option<Arc<Vec<Diagnostic>>> {
        self.inner
            .lock()
            .lookup(key, version, |entry| entry.diagnostics.clone())
    }

    /// Both cached results for `key` at `version`, counted as one access: a
    /// hit when the diagnostics are present, a miss otherwise.
    pub fn get_analysis(
        &self,
        key: &K,
        version: i32,
    ) -> (Option<Arc<TrackingState>>, Option<Arc<Vec<Diagnostic>>>) {
        let mut inner = self.inner.lock();
        let found = inner
            .entries
            .get(key)
            .filter(|e| e.version == version)
            .map(|e| (e.tracking.clone(), e.diagnostics.clone()));
        match found {
            Some((tracking, Some(diagnostics))) => {
                inner.hits += 1;
                inner.touch(key);
                (tracking, Some(diagnostics))
            }
            Some((tracking, None)) => {
                inner.misses += 1;
                inner.touch(key);
                (tracking, None)
            }
            None => {
                inner.misses += 1;
                (None, None)
            }
        }
    }

    /// Store a tracking snapshot. Returns `false` if a newer version is
    /// already cached.
    pub fn set_tracking(&self, key: &K, version: i32, tracking: Arc<TrackingState>) -> bool {
        let mut inner = self.inner.lock();
        match inner.entry_for_write(key, version) {
            Some(entry) => {
                entry.tracking = Some(tracking);
                true
            }
            None => false,
        }
    }

    pub fn set_diagnostics(&self, key: &K, version: i32, diagnostics: Arc<Vec<Diagnostic>>) -> bool {
        let mut inner = self.inner.lock();
        match inner.entry_for_write(key, version) {
            Some(entry) => {
                entry.diagnostics = Some(diagnostics);
                true
            }
            None => false,
        }
    }

    /// Newest cached version of `key`, without counting as an access.
    pub fn version(&self, key: &K) -> Option<i32> {
        self.inner.lock().entries.get(key).map(|e| e.version)
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().entries.shift_remove(key).is_some()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity.max(1);
        inner.shrink_to_capacity();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.entries.len(),
            capacity: inner.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(marker: &str) -> Arc<TrackingState> {
        let mut state = TrackingState::default();
        state.defined_constants.insert(marker.to_string());
        Arc::new(state)
    }

    #[test]
    fn version_guarded_lookup() {
        let cache = DocumentCache::new(4);
        cache.set_tracking(&"doc", 1, state("a"));
        assert_eq!(cache.get_tracking(&"doc", 1), Some(state("a")));
        assert_eq!(cache.get_tracking(&"doc", 2), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn tracking_and_diagnostics_are_independent() {
        let cache = DocumentCache::new(4);
        cache.set_tracking(&"doc", 3, state("a"));
        assert!(cache.get_diagnostics(&"doc", 3).is_none());
        cache.set_diagnostics(&"doc", 3, Arc::new(Vec::new()));
        assert!(cache.get_diagnostics(&"doc", 3).is_some());
        assert!(cache.get_tracking(&"doc", 3).is_some());
    }

    #[test]
    fn newer_version_resets_entry() {
        let cache = DocumentCache::new(4);
        cache.set_tracking(&"doc", 1, state("a"));
        cache.set_diagnostics(&"doc", 2, Arc::new(Vec::new()));
        assert!(cache.get_tracking(&"doc", 2).is_none());
        assert!(cache.get_tracking(&"doc", 1).is_none());
    }

    #[test]
    fn stale_writes_are_rejected() {
        let cache = DocumentCache::new(4);
        assert!(cache.set_tracking(&"doc", 5, state("new")));
        assert!(!cache.set_tracking(&"doc", 4, state("old")));
        assert_eq!(cache.get_tracking(&"doc", 5), Some(state("new")));
        assert_eq!(cache.version(&"doc"), Some(5));
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = DocumentCache::new(2);
        cache.set_tracking(&"a", 1, state("a"));
        cache.set_tracking(&"b", 1, state("b"));
        // touching `a` makes `b` the eviction candidate
        assert!(cache.get_tracking(&"a", 1).is_some());
        cache.set_tracking(&"c", 1, state("c"));
        assert!(cache.get_tracking(&"b", 1).is_none());
        assert!(cache.get_tracking(&"a", 1).is_some());
        assert!(cache.get_tracking(&"c", 1).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn delete_and_shrink() {
        let cache = DocumentCache::new(3);
        for key in ["a", "b", "c"] {
            cache.set_tracking(&key, 1, state(key));
        }
        assert!(cache.delete(&"b"));
        assert!(!cache.delete(&"b"));
        cache.set_capacity(1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_tracking(&"c", 1).is_some());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().capacity, 1);
    }
}
