use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use clustore_store::StoredObject;
use clustore_types::{ClusterPath, ItemId};

/// Default idle lifetime of a cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Retention discipline for the read cache.
///
/// Retention is a tuning knob. Coherence comes from invalidation, never
/// from eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep everything until invalidated.
    Unbounded,
    /// Keep at most `max_entries`, evicting the least recently read.
    Bounded { max_entries: usize },
    /// Drop entries not read for `ttl`.
    Expiring { ttl: Duration },
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Expiring { ttl: DEFAULT_TTL }
    }
}

/// One cached object with its access bookkeeping.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    object: Arc<StoredObject>,
    inserted: Instant,
    last_access: Instant,
    /// Position in the access order; larger is more recent.
    tick: u64,
}

impl CacheEntry {
    fn new(object: Arc<StoredObject>, tick: u64) -> Self {
        let now = Instant::now();
        Self {
            object,
            inserted: now,
            last_access: now,
            tick,
        }
    }

    pub fn object(&self) -> &Arc<StoredObject> {
        &self.object
    }

    pub fn inserted(&self) -> Instant {
        self.inserted
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }
}

/// Counters for cache effectiveness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Two-level read cache: item, then path.
///
/// Each item's entries live in one `DashMap` slot, so operations on
/// different items do not contend. Bounded and expiring caches also keep
/// an access-ordered index so eviction and expiry start from the oldest
/// entry instead of scanning every item.
///
/// Lock order is item slot, then `recency`. Nothing takes a slot while
/// holding `recency`.
#[derive(Debug)]
pub struct ReadCache {
    policy: CachePolicy,
    items: DashMap<ItemId, BTreeMap<ClusterPath, CacheEntry>>,
    recency: Mutex<BTreeMap<u64, (Instant, ItemId, ClusterPath)>>,
    clock: AtomicU64,
    generation: AtomicU64,
    entries: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReadCache {
    /// An empty cache retaining entries under `policy`.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            items: DashMap::new(),
            recency: Mutex::new(BTreeMap::new()),
            clock: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            entries: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The retention policy this cache was built with.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Cached object at `path`, refreshing its access time.
    pub fn get(&self, item: &ItemId, path: &ClusterPath) -> Option<Arc<StoredObject>> {
        let found = self.lookup(item, path);
        match found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(item = %item, path = %path, "cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    fn lookup(&self, item: &ItemId, path: &ClusterPath) -> Option<Arc<StoredObject>> {
        let mut paths = self.items.get_mut(item)?;
        let entry = paths.get_mut(path)?;
        if let CachePolicy::Expiring { ttl } = self.policy {
            if entry.last_access.elapsed() > ttl {
                let tick = entry.tick;
                paths.remove(path);
                self.entries.fetch_sub(1, Ordering::Relaxed);
                self.forget([tick]);
                return None;
            }
        }
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        entry.last_access = Instant::now();
        self.reorder(Some(entry.tick), tick, entry.last_access, item, path);
        entry.tick = tick;
        Some(Arc::clone(&entry.object))
    }

    /// Cache `object` unconditionally. Used for the writer's own copy.
    pub fn insert(&self, item: &ItemId, object: Arc<StoredObject>) {
        {
            let mut paths = self.items.entry(*item).or_default();
            self.store(item, &mut paths, object);
        }
        self.enforce_retention();
    }

    /// Invalidation counter. Read it before fetching from a backend and
    /// pass it to [`insert_if_unchanged`](Self::insert_if_unchanged).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cache `object` unless an invalidation ran since `generation` was
    /// read. Returns whether the object was cached.
    ///
    /// The check and the insert happen under the item's slot lock, which
    /// every invalidation of that item also takes after bumping the
    /// counter, so a fetched value can never outlive an invalidation that
    /// raced with the fetch.
    pub fn insert_if_unchanged(
        &self,
        item: &ItemId,
        object: Arc<StoredObject>,
        generation: u64,
    ) -> bool {
        let stored = {
            let mut paths = self.items.entry(*item).or_default();
            if self.generation.load(Ordering::SeqCst) == generation {
                self.store(item, &mut paths, object);
                true
            } else {
                false
            }
        };
        if !stored {
            self.items.remove_if(item, |_, paths| paths.is_empty());
            trace!(item = %item, "stale cache fill skipped");
            return false;
        }
        self.enforce_retention();
        true
    }

    fn store(
        &self,
        item: &ItemId,
        paths: &mut BTreeMap<ClusterPath, CacheEntry>,
        object: Arc<StoredObject>,
    ) {
        let path = object.path().clone();
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(object, tick);
        let accessed = entry.last_access;
        let previous = paths.insert(path.clone(), entry);
        if previous.is_none() {
            self.entries.fetch_add(1, Ordering::Relaxed);
        }
        self.reorder(previous.map(|p| p.tick), tick, accessed, item, &path);
    }

    fn tracks_recency(&self) -> bool {
        !matches!(self.policy, CachePolicy::Unbounded)
    }

    /// Move an entry from `stale` to `tick` in the access order.
    fn reorder(
        &self,
        stale: Option<u64>,
        tick: u64,
        accessed: Instant,
        item: &ItemId,
        path: &ClusterPath,
    ) {
        if !self.tracks_recency() {
            return;
        }
        let mut recency = self.recency.lock().expect("lock poisoned");
        if let Some(stale) = stale {
            recency.remove(&stale);
        }
        recency.insert(tick, (accessed, *item, path.clone()));
    }

    fn forget(&self, ticks: impl IntoIterator<Item = u64>) {
        if !self.tracks_recency() {
            return;
        }
        let mut recency = self.recency.lock().expect("lock poisoned");
        for tick in ticks {
            recency.remove(&tick);
        }
    }

    /// Evict past the size bound, or drop idle entries, oldest first. Must
    /// not be called while holding a guard into `items`.
    fn enforce_retention(&self) {
        match self.policy {
            CachePolicy::Unbounded => {}
            CachePolicy::Bounded { max_entries } => {
                while self.len() > max_entries {
                    if !self.evict_oldest(|_| true) {
                        break;
                    }
                }
            }
            CachePolicy::Expiring { ttl } => {
                while self.evict_oldest(|accessed| accessed.elapsed() > ttl) {}
            }
        }
    }

    /// Pop the least recently used entry if `due` says so. Returns whether
    /// anything was popped.
    fn evict_oldest(&self, due: impl Fn(Instant) -> bool) -> bool {
        let (tick, item, path) = {
            let mut recency = self.recency.lock().expect("lock poisoned");
            let Some(oldest) = recency.first_entry() else {
                return false;
            };
            if !due(oldest.get().0) {
                return false;
            }
            let (tick, (_, item, path)) = oldest.remove_entry();
            (tick, item, path)
        };
        if self.remove_exact(&item, &path, tick) {
            trace!(item = %item, path = %path, "cache entry evicted");
        }
        true
    }

    /// Remove `path` only if it is still the entry recorded at `tick`; a
    /// concurrent read may have refreshed it meanwhile.
    fn remove_exact(&self, item: &ItemId, path: &ClusterPath, tick: u64) -> bool {
        let removed = match self.items.get_mut(item) {
            Some(mut paths) => {
                if paths.get(path).is_some_and(|entry| entry.tick == tick) {
                    paths.remove(path);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if removed {
            self.entries.fetch_sub(1, Ordering::Relaxed);
            self.items.remove_if(item, |_, paths| paths.is_empty());
        }
        removed
    }

    /// Drop `prefix` and everything nested under it for one item. The root
    /// path drops the whole item.
    pub fn invalidate_path(&self, item: &ItemId, prefix: &ClusterPath) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut ticks = Vec::new();
        if let Some(mut paths) = self.items.get_mut(item) {
            paths.retain(|path, entry| {
                let keep = !path.starts_with(prefix);
                if !keep {
                    ticks.push(entry.tick);
                }
                keep
            });
        }
        let removed = ticks.len();
        if removed > 0 {
            self.entries.fetch_sub(removed, Ordering::Relaxed);
            self.forget(ticks);
            self.items.remove_if(item, |_, paths| paths.is_empty());
            trace!(item = %item, prefix = %prefix, removed, "cache invalidated");
        }
        removed
    }

    /// Drop every cached path of one item.
    pub fn invalidate_item(&self, item: &ItemId) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let Some((_, paths)) = self.items.remove(item) else {
            return 0;
        };
        self.entries.fetch_sub(paths.len(), Ordering::Relaxed);
        self.forget(paths.values().map(|entry| entry.tick));
        paths.len()
    }

    /// Drop everything. Returns the number of entries dropped.
    pub fn clear(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut ticks = Vec::new();
        self.items.retain(|_, paths| {
            ticks.extend(paths.values().map(|entry| entry.tick));
            false
        });
        let removed = ticks.len();
        self.entries.fetch_sub(removed, Ordering::Relaxed);
        self.forget(ticks);
        removed
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `path` is cached, without touching its access time.
    pub fn contains(&self, item: &ItemId, path: &ClusterPath) -> bool {
        self.items
            .get(item)
            .is_some_and(|paths| paths.contains_key(path))
    }

    /// Entry count and hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(path: &str) -> Arc<StoredObject> {
        Arc::new(StoredObject::new(
            ClusterPath::parse(path).unwrap(),
            path.as_bytes().to_vec(),
        ))
    }

    fn path(raw: &str) -> ClusterPath {
        ClusterPath::parse(raw).unwrap()
    }

    #[test]
    fn insert_then_hit() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        let item = ItemId::new();
        cache.insert(&item, obj("Property/a"));

        let got = cache.get(&item, &path("Property/a")).unwrap();
        assert_eq!(got.data(), b"Property/a");
        assert!(cache.get(&item, &path("Property/b")).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn overwrite_does_not_double_count() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        let item = ItemId::new();
        cache.insert(&item, obj("Property/a"));
        cache.insert(&item, obj("Property/a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn prefix_invalidation_respects_segments() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        let item = ItemId::new();
        cache.insert(&item, obj("Outcome/S/0/1"));
        cache.insert(&item, obj("Outcome/S/0/2"));
        cache.insert(&item, obj("Outcome/ST/0/1"));
        cache.insert(&item, obj("Property/a"));

        assert_eq!(cache.invalidate_path(&item, &path("Outcome/S")), 2);
        assert!(cache.contains(&item, &path("Outcome/ST/0/1")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn root_prefix_clears_item_only() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        let (a, b) = (ItemId::new(), ItemId::new());
        cache.insert(&a, obj("Property/x"));
        cache.insert(&a, obj("Job/1"));
        cache.insert(&b, obj("Property/x"));

        assert_eq!(cache.invalidate_path(&a, &ClusterPath::root()), 2);
        assert!(cache.contains(&b, &path("Property/x")));
        assert_eq!(cache.invalidate_item(&b), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_reports_count() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        for _ in 0..3 {
            cache.insert(&ItemId::new(), obj("Property/x"));
        }
        assert_eq!(cache.clear(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn bounded_evicts_least_recently_read() {
        let cache = ReadCache::new(CachePolicy::Bounded { max_entries: 2 });
        let item = ItemId::new();
        cache.insert(&item, obj("Property/a"));
        cache.insert(&item, obj("Property/b"));
        // Touch `a` so `b` becomes the oldest.
        assert!(cache.get(&item, &path("Property/a")).is_some());
        cache.insert(&item, obj("Property/c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&item, &path("Property/a")));
        assert!(!cache.contains(&item, &path("Property/b")));
        assert!(cache.contains(&item, &path("Property/c")));
    }

    #[test]
    fn expiring_drops_idle_entries() {
        let cache = ReadCache::new(CachePolicy::Expiring {
            ttl: Duration::from_millis(5),
        });
        let item = ItemId::new();
        cache.insert(&item, obj("Property/a"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&item, &path("Property/a")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_swept_on_insert() {
        let cache = ReadCache::new(CachePolicy::Expiring {
            ttl: Duration::from_millis(50),
        });
        for _ in 0..1000 {
            cache.insert(&ItemId::new(), obj("Property/a"));
        }
        std::thread::sleep(Duration::from_millis(100));

        let item = ItemId::new();
        cache.insert(&item, obj("Property/b"));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&item, &path("Property/b")));
    }

    #[test]
    fn bounded_eviction_follows_refreshed_entries() {
        let cache = ReadCache::new(CachePolicy::Bounded { max_entries: 3 });
        let (x, y) = (ItemId::new(), ItemId::new());
        cache.insert(&x, obj("Property/a"));
        cache.insert(&y, obj("Property/b"));
        cache.insert(&x, obj("Property/c"));

        assert!(cache.get(&x, &path("Property/a")).is_some());
        cache.insert(&y, obj("Property/d"));
        assert!(!cache.contains(&y, &path("Property/b")));

        assert!(cache.get(&x, &path("Property/c")).is_some());
        cache.insert(&y, obj("Property/e"));
        assert!(!cache.contains(&x, &path("Property/a")));

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&x, &path("Property/c")));
        assert!(cache.contains(&y, &path("Property/d")));
        assert!(cache.contains(&y, &path("Property/e")));
    }

    #[test]
    fn invalidated_entries_leave_the_access_order() {
        let cache = ReadCache::new(CachePolicy::Bounded { max_entries: 2 });
        let item = ItemId::new();
        cache.insert(&item, obj("Property/a"));
        cache.insert(&item, obj("Property/b"));
        cache.invalidate_path(&item, &path("Property/a"));
        cache.insert(&item, obj("Property/c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&item, &path("Property/b")));
        assert!(cache.contains(&item, &path("Property/c")));
        assert_eq!(cache.recency.lock().unwrap().len(), 2);
    }

    #[test]
    fn fill_racing_an_invalidation_is_dropped() {
        let cache = ReadCache::new(CachePolicy::Unbounded);
        let item = ItemId::new();
        let before_fetch = cache.generation();
        cache.invalidate_path(&item, &path("Property/a"));

        assert!(!cache.insert_if_unchanged(&item, obj("Property/a"), before_fetch));
        assert!(!cache.contains(&item, &path("Property/a")));
        assert!(cache.is_empty());

        let fresh = cache.generation();
        assert!(cache.insert_if_unchanged(&item, obj("Property/a"), fresh));
        assert!(cache.contains(&item, &path("Property/a")));
    }

    #[test]
    fn default_policy_is_ten_minute_idle_expiry() {
        assert_eq!(
            CachePolicy::default(),
            CachePolicy::Expiring {
                ttl: Duration::from_secs(600)
            }
        );
    }
}
