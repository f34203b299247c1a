//! In-memory image cache with LRU eviction.

use crate::cache::key::ImageCacheKey;
use crate::cache::r#trait::ImageCaching;
use crate::container::ImageContainer;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Default cost limit (256 MB of decoded pixels).
pub const DEFAULT_COST_LIMIT: usize = 256 * 1024 * 1024;

/// Default share of the cost limit a single entry may take.
pub const DEFAULT_ENTRY_COST_RATIO: f64 = 0.1;

/// Limits for [`ImageCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCacheConfig {
    /// Maximum total cost in bytes
    pub cost_limit: usize,
    /// Maximum number of entries
    pub count_limit: usize,
    /// Entries costing more than this fraction of `cost_limit` are not stored
    pub entry_cost_ratio: f64,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            cost_limit: DEFAULT_COST_LIMIT,
            count_limit: usize::MAX,
            entry_cost_ratio: DEFAULT_ENTRY_COST_RATIO,
        }
    }
}

impl ImageCacheConfig {
    pub fn with_cost_limit(mut self, cost_limit: usize) -> Self {
        self.cost_limit = cost_limit;
        self
    }

    pub fn with_count_limit(mut self, count_limit: usize) -> Self {
        self.count_limit = count_limit;
        self
    }

    pub fn with_entry_cost_ratio(mut self, ratio: f64) -> Self {
        self.entry_cost_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Largest cost a single entry may have.
    pub fn entry_cost_limit(&self) -> usize {
        (self.cost_limit as f64 * self.entry_cost_ratio) as usize
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Entry {
    container: ImageContainer,
    cost: usize,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<ImageCacheKey, Entry>,
    /// Access tick -> key, oldest first
    order: BTreeMap<u64, ImageCacheKey>,
    total_cost: usize,
    next_tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &ImageCacheKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.total_cost -= entry.cost;
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<(ImageCacheKey, Entry)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.total_cost -= entry.cost;
        Some((key, entry))
    }
}

/// Cost- and count-bounded LRU cache of decoded images.
///
/// All state lives behind one lock, so `remove_all` is atomic with respect
/// to concurrent `get` and `set` calls.
pub struct ImageCache {
    config: ImageCacheConfig,
    state: Mutex<LruState>,
    counters: Counters,
}

impl ImageCache {
    pub fn new(config: ImageCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LruState::default()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Evicts least recently used entries until both limits hold.
    fn trim(&self, state: &mut LruState) {
        while state.total_cost > self.config.cost_limit
            || state.entries.len() > self.config.count_limit
        {
            let Some((key, entry)) = state.pop_oldest() else {
                break;
            };
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, cost = entry.cost, "Evicted cache entry");
        }
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(ImageCacheConfig::default())
    }
}

impl ImageCaching for ImageCache {
    fn get(&self, key: &ImageCacheKey) -> Option<ImageContainer> {
        let mut state = self.state.lock();
        let tick = state.next_tick();

        let Some(entry) = state.entries.get_mut(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let previous = std::mem::replace(&mut entry.tick, tick);
        let container = entry.container.clone();
        state.order.remove(&previous);
        state.order.insert(tick, key.clone());

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(container)
    }

    fn set(&self, key: ImageCacheKey, container: ImageContainer) {
        let cost = container.cost();
        if cost > self.config.entry_cost_limit() {
            debug!(
                key = %key,
                cost,
                limit = self.config.entry_cost_limit(),
                "Entry too large for memory cache"
            );
            return;
        }

        let mut state = self.state.lock();
        state.remove(&key);
        let tick = state.next_tick();
        state.order.insert(tick, key.clone());
        state.entries.insert(
            key,
            Entry {
                container,
                cost,
                tick,
            },
        );
        state.total_cost += cost;
        self.trim(&mut state);
    }

    fn remove(&self, key: &ImageCacheKey) -> Option<ImageContainer> {
        self.state.lock().remove(key).map(|entry| entry.container)
    }

    fn remove_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.total_cost = 0;
    }

    fn contains(&self, key: &ImageCacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    fn total_cost(&self) -> usize {
        self.state.lock().total_cost
    }

    fn total_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn debug_entries(&self) -> Vec<(ImageCacheKey, ImageContainer)> {
        let state = self.state.lock();
        state
            .order
            .values()
            .rev()
            .filter_map(|key| {
                state
                    .entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.container.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    /// 10x10 RGBA = 400 bytes.
    fn container() -> ImageContainer {
        ImageContainer::new(DynamicImage::new_rgba8(10, 10))
    }

    fn key(name: &str) -> ImageCacheKey {
        ImageCacheKey::custom(name)
    }

    fn small_cache() -> ImageCache {
        ImageCache::new(
            ImageCacheConfig::default()
                .with_cost_limit(1000)
                .with_entry_cost_ratio(1.0),
        )
    }

    #[test]
    fn test_get_after_set_returns_same_bitmap() {
        let cache = ImageCache::default();
        let stored = container();
        cache.set(key("a"), stored.clone());

        let fetched = cache.get(&key("a")).unwrap();
        assert!(fetched.ptr_eq(&stored));
        assert_eq!(cache.total_cost(), 400);
        assert_eq!(cache.total_count(), 1);
    }

    #[test]
    fn test_replacing_entry_updates_cost() {
        let cache = ImageCache::default();
        cache.set(key("a"), container());
        cache.set(key("a"), ImageContainer::new(DynamicImage::new_rgba8(5, 5)));

        assert_eq!(cache.total_count(), 1);
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = small_cache();
        cache.set(key("a"), container());
        cache.set(key("b"), container());
        // Touch "a" so that "b" becomes the oldest
        assert!(cache.get(&key("a")).is_some());
        cache.set(key("c"), container());

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.total_cost(), 800);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_count_limit() {
        let cache = ImageCache::new(ImageCacheConfig::default().with_count_limit(2));
        for name in ["a", "b", "c"] {
            cache.set(key(name), container());
        }
        assert_eq!(cache.total_count(), 2);
        assert!(!cache.contains(&key("a")));
    }

    #[test]
    fn test_oversized_entry_not_stored() {
        let cache = ImageCache::new(
            ImageCacheConfig::default()
                .with_cost_limit(1000)
                .with_entry_cost_ratio(0.1),
        );
        cache.set(key("big"), container());

        assert!(!cache.contains(&key("big")));
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let cache = ImageCache::default();
        cache.set(key("a"), container());
        cache.set(key("b"), container());

        assert!(cache.remove(&key("a")).is_some());
        assert!(cache.remove(&key("a")).is_none());
        assert_eq!(cache.total_count(), 1);

        cache.remove_all();
        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.total_cost(), 0);
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = ImageCache::default();
        cache.set(key("a"), container());
        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_debug_entries_most_recent_first() {
        let cache = ImageCache::default();
        cache.set(key("a"), container());
        cache.set(key("b"), container());
        cache.get(&key("a"));

        let names: Vec<String> = cache
            .debug_entries()
            .into_iter()
            .map(|(k, _)| k.description().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(ImageCache::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let k = key(&format!("{}-{}", i, j % 5));
                        cache.set(k.clone(), container());
                        cache.get(&k);
                        if j % 10 == 0 {
                            cache.remove_all();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.total_cost(), cache.total_count() * 400);
    }
}
