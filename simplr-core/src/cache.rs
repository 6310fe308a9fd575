//! CacheManager: namespaced LRU memo store with memory-pressure-adaptive limits.
//!
//! Design (v0):
//! - One `Mutex` guards every namespace, the in-flight table and the counters.
//!   All reads and writes are linearizable.
//! - `compute` runs with the lock released. A second `get` for a key that is
//!   already being computed waits on a `Condvar` instead of computing again
//!   (at most one computation per key per epoch).
//! - An invalidation that lands while a key is in flight marks that flight
//!   stale: its value goes back to its own caller but is never stored.
//! - Limits (max entries + TTL) are per namespace and scale down with the
//!   reported memory-pressure tier.
//!
//! Eviction order: oldest last access, then lowest access count, then oldest touch.
//!
//! `compute` must not call back into `get` for the same key; it would wait on itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Logical partitions of the cache, each with its own limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Grouped/filtered list results.
    FilteredLists,
    /// Scalar aggregates such as overdue counts.
    Aggregates,
    /// Ordered task lists for a single category.
    CategoryLists,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::FilteredLists,
        Namespace::Aggregates,
        Namespace::CategoryLists,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::FilteredLists => "filtered_lists",
            Namespace::Aggregates => "aggregates",
            Namespace::CategoryLists => "category_lists",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory-pressure tier reported by the host platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl MemoryPressure {
    /// Divisor applied to both max entries and TTL.
    fn divisor(&self) -> u32 {
        match self {
            MemoryPressure::Normal => 1,
            MemoryPressure::Warning => 2,
            MemoryPressure::Critical => 4,
        }
    }
}

/// Base (normal-pressure) limits for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceLimits {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl NamespaceLimits {
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            max_entries,
            ttl_secs,
        }
    }

    /// Limits in effect under `tier`. Never below one entry or one second.
    pub fn scaled(&self, tier: MemoryPressure) -> (usize, Duration) {
        let d = tier.divisor();
        let max = (self.max_entries / d as usize).max(1);
        let ttl = (Duration::from_secs(self.ttl_secs) / d).max(Duration::from_secs(1));
        (max, ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub filtered_lists: NamespaceLimits,
    pub aggregates: NamespaceLimits,
    pub category_lists: NamespaceLimits,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            filtered_lists: NamespaceLimits::new(32, 300),
            aggregates: NamespaceLimits::new(64, 120),
            category_lists: NamespaceLimits::new(48, 300),
        }
    }
}

impl CacheConfig {
    pub fn limits(&self, namespace: Namespace) -> NamespaceLimits {
        match namespace {
            Namespace::FilteredLists => self.filtered_lists,
            Namespace::Aggregates => self.aggregates,
            Namespace::CategoryLists => self.category_lists,
        }
    }
}

/// Source of monotonic time for TTL and LRU bookkeeping.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-advanced clock for tests and replay harnesses.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_access: Instant,
    access_count: u64,
    /// Monotonic touch sequence; orders accesses that share an `Instant`.
    touched: u64,
    cost: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

#[derive(Debug)]
struct State<V> {
    tier: MemoryPressure,
    entries: HashMap<Namespace, HashMap<String, CacheEntry<V>>>,
    // (namespace, key) -> stale flag
    in_flight: HashMap<(Namespace, String), bool>,
    touch_seq: u64,
    counters: Counters,
}

impl<V> State<V> {
    fn next_touch(&mut self) -> u64 {
        self.touch_seq += 1;
        self.touch_seq
    }

    fn mark_stale(&mut self, namespace: Namespace, matches: impl Fn(&str) -> bool) {
        for ((ns, key), stale) in self.in_flight.iter_mut() {
            if *ns == namespace && matches(key) {
                *stale = true;
            }
        }
    }
}

/// Per-namespace view in [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: Namespace,
    pub entries: usize,
    pub cost: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub tier: MemoryPressure,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub namespaces: Vec<NamespaceStats>,
}

/// Keyed memo store shared by every reader in the process.
pub struct CacheManager<V> {
    config: CacheConfig,
    state: Mutex<State<V>>,
    ready: Condvar,
    clock: Arc<dyn Clock>,
    weigher: fn(&V) -> usize,
}

impl<V> fmt::Debug for CacheManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> CacheManager<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                tier: MemoryPressure::Normal,
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                touch_seq: 0,
                counters: Counters::default(),
            }),
            ready: Condvar::new(),
            clock,
            weigher: |_| 1,
        }
    }

    /// Approximate size cost per value (default: 1 per entry).
    pub fn with_weigher(mut self, weigher: fn(&V) -> usize) -> Self {
        self.weigher = weigher;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the live value for `key`, or run `compute` and cache its result.
    ///
    /// A failing `compute` propagates its error and caches nothing.
    pub fn get<E, F>(&self, namespace: Namespace, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = (namespace, key.to_string());
        let mut state = self.lock();

        loop {
            let now = self.clock.now();
            let (_, ttl) = self.config.limits(namespace).scaled(state.tier);
            let touch = state.next_touch();

            let mut expired = false;
            if let Some(entry) = state
                .entries
                .get_mut(&namespace)
                .and_then(|m| m.get_mut(key))
            {
                if now.saturating_duration_since(entry.inserted_at) >= ttl {
                    expired = true;
                } else {
                    entry.last_access = now;
                    entry.access_count += 1;
                    entry.touched = touch;
                    let value = entry.value.clone();
                    state.counters.hits += 1;
                    tracing::trace!(%namespace, key, "cache hit");
                    return Ok(value);
                }
            }

            if expired {
                if let Some(m) = state.entries.get_mut(&namespace) {
                    m.remove(key);
                }
                state.counters.expirations += 1;
                tracing::debug!(%namespace, key, "cache entry expired");
            }

            if !state.in_flight.contains_key(&slot) {
                break;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        state.counters.misses += 1;
        state.in_flight.insert(slot.clone(), false);
        drop(state);
        tracing::trace!(%namespace, key, "cache miss");

        let mut guard = FlightGuard {
            cache: self,
            slot: Some(slot),
        };
        let result = compute();
        let slot = guard.slot.take();

        let mut state = self.lock();
        let stale = slot
            .as_ref()
            .and_then(|s| state.in_flight.remove(s))
            .unwrap_or(true);

        if let Ok(value) = &result {
            if stale {
                tracing::debug!(%namespace, key, "invalidated during compute, not caching");
            } else {
                self.store(&mut state, namespace, key, value.clone());
            }
        }
        drop(state);
        self.ready.notify_all();

        result
    }

    /// Infallible convenience over [`CacheManager::get`].
    pub fn get_with<F>(&self, namespace: Namespace, key: &str, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.get::<std::convert::Infallible, _>(namespace, key, || Ok(compute())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Live entry present (does not touch LRU metadata).
    pub fn contains(&self, namespace: Namespace, key: &str) -> bool {
        let state = self.lock();
        let (_, ttl) = self.config.limits(namespace).scaled(state.tier);
        let now = self.clock.now();
        state
            .entries
            .get(&namespace)
            .and_then(|m| m.get(key))
            .is_some_and(|e| now.saturating_duration_since(e.inserted_at) < ttl)
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.lock().entries.get(&namespace).map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.values().all(|m| m.is_empty())
    }

    /// Remove one key. Returns whether an entry was present.
    pub fn invalidate(&self, namespace: Namespace, key: &str) -> bool {
        let mut state = self.lock();
        state.mark_stale(namespace, |k| k == key);
        let removed = state
            .entries
            .get_mut(&namespace)
            .and_then(|m| m.remove(key))
            .is_some();
        if removed {
            state.counters.invalidations += 1;
        }
        removed
    }

    /// Remove every key in `namespace`. Returns how many were removed.
    pub fn invalidate_all(&self, namespace: Namespace) -> usize {
        self.invalidate_where(namespace, |_| true)
    }

    /// Remove every key in `namespace` matching `predicate`.
    pub fn invalidate_where<P>(&self, namespace: Namespace, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let mut state = self.lock();
        state.mark_stale(namespace, &predicate);
        let Some(map) = state.entries.get_mut(&namespace) else {
            return 0;
        };
        let before = map.len();
        map.retain(|k, _| !predicate(k));
        let removed = before - map.len();
        state.counters.invalidations += removed as u64;
        if removed > 0 {
            tracing::debug!(%namespace, removed, "cache entries invalidated");
        }
        removed
    }

    /// Apply the limits for `tier` now: purge expired entries, then evict
    /// oldest-first down to the new caps. Returns how many entries were dropped.
    pub fn report_memory_pressure(&self, tier: MemoryPressure) -> usize {
        let mut state = self.lock();
        let previous = state.tier;
        state.tier = tier;
        let now = self.clock.now();

        let mut expired = 0usize;
        let mut evicted = 0usize;
        for namespace in Namespace::ALL {
            let (max, ttl) = self.config.limits(namespace).scaled(tier);
            let Some(map) = state.entries.get_mut(&namespace) else {
                continue;
            };
            let before = map.len();
            map.retain(|_, e| now.saturating_duration_since(e.inserted_at) < ttl);
            expired += before - map.len();
            evicted += evict_excess(map, max, None).len();
        }
        state.counters.expirations += expired as u64;
        state.counters.evictions += evicted as u64;

        if previous != tier {
            tracing::info!(?previous, ?tier, expired, evicted, "memory pressure changed");
        }
        expired + evicted
    }

    pub fn memory_pressure(&self) -> MemoryPressure {
        self.lock().tier
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let namespaces = Namespace::ALL
            .into_iter()
            .map(|namespace| {
                let (max_entries, ttl) = self.config.limits(namespace).scaled(state.tier);
                let (entries, cost) = state.entries.get(&namespace).map_or((0, 0), |m| {
                    (m.len(), m.values().map(|e| e.cost).sum())
                });
                NamespaceStats {
                    namespace,
                    entries,
                    cost,
                    max_entries,
                    ttl_secs: ttl.as_secs(),
                }
            })
            .collect();

        CacheStats {
            tier: state.tier,
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            expirations: state.counters.expirations,
            invalidations: state.counters.invalidations,
            namespaces,
        }
    }

    fn store(&self, state: &mut State<V>, namespace: Namespace, key: &str, value: V) {
        let now = self.clock.now();
        let touch = state.next_touch();
        let (max, _) = self.config.limits(namespace).scaled(state.tier);
        let cost = (self.weigher)(&value);

        let map = state.entries.entry(namespace).or_default();
        map.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                last_access: now,
                access_count: 1,
                touched: touch,
                cost,
            },
        );

        let evicted = evict_excess(map, max, Some(key));
        for victim in &evicted {
            tracing::debug!(%namespace, key = %victim, "cache evict (lru)");
        }
        state.counters.evictions += evicted.len() as u64;
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight marker if `compute` unwinds.
struct FlightGuard<'a, V> {
    cache: &'a CacheManager<V>,
    slot: Option<(Namespace, String)>,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let mut state = self
                .cache
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.in_flight.remove(&slot);
            drop(state);
            self.cache.ready.notify_all();
        }
    }
}

fn evict_excess<V>(
    map: &mut HashMap<String, CacheEntry<V>>,
    max: usize,
    protect: Option<&str>,
) -> Vec<String> {
    let mut evicted = Vec::new();
    while map.len() > max {
        let victim = map
            .iter()
            .filter(|(k, _)| Some(k.as_str()) != protect)
            .min_by(|(_, a), (_, b)| {
                a.last_access
                    .cmp(&b.last_access)
                    .then(a.access_count.cmp(&b.access_count))
                    .then(a.touched.cmp(&b.touched))
            })
            .map(|(k, _)| k.clone());

        let Some(key) = victim else { break };
        map.remove(&key);
        evicted.push(key);
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn small(max: usize, ttl_secs: u64) -> CacheConfig {
        CacheConfig {
            filtered_lists: NamespaceLimits::new(max, ttl_secs),
            aggregates: NamespaceLimits::new(max, ttl_secs),
            category_lists: NamespaceLimits::new(max, ttl_secs),
        }
    }

    fn manual(config: CacheConfig) -> (CacheManager<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (CacheManager::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn hit_skips_compute() {
        let (cache, _) = manual(small(4, 60));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            7
        };

        assert_eq!(cache.get_with(Namespace::Aggregates, "k", compute), 7);
        assert_eq!(cache.get_with(Namespace::Aggregates, "k", compute), 7);
        assert_eq!(calls.get(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn namespaces_are_independent() {
        let (cache, _) = manual(small(4, 60));
        cache.get_with(Namespace::Aggregates, "k", || 1);
        assert_eq!(cache.get_with(Namespace::FilteredLists, "k", || 2), 2);
        assert_eq!(cache.invalidate_all(Namespace::Aggregates), 1);
        assert!(cache.contains(Namespace::FilteredLists, "k"));
    }

    #[test]
    fn evicts_least_recently_accessed() {
        let (cache, clock) = manual(small(3, 600));
        for key in ["a", "b", "c"] {
            cache.get_with(Namespace::FilteredLists, key, || 0);
            clock.advance(Duration::from_secs(1));
        }
        // Touch "a" so "b" becomes the oldest.
        cache.get_with(Namespace::FilteredLists, "a", || 99);
        clock.advance(Duration::from_secs(1));

        cache.get_with(Namespace::FilteredLists, "d", || 0);
        assert_eq!(cache.len(Namespace::FilteredLists), 3);
        assert!(!cache.contains(Namespace::FilteredLists, "b"));
        assert!(cache.contains(Namespace::FilteredLists, "a"));

        let calls = Cell::new(0);
        cache.get_with(Namespace::FilteredLists, "b", || {
            calls.set(calls.get() + 1);
            0
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn equal_timestamps_evict_lowest_access_count() {
        let (cache, _) = manual(small(2, 600));
        cache.get_with(Namespace::Aggregates, "hot", || 1);
        cache.get_with(Namespace::Aggregates, "hot", || 1);
        cache.get_with(Namespace::Aggregates, "cold", || 2);
        cache.get_with(Namespace::Aggregates, "new", || 3);

        assert!(cache.contains(Namespace::Aggregates, "hot"));
        assert!(cache.contains(Namespace::Aggregates, "new"));
        assert!(!cache.contains(Namespace::Aggregates, "cold"));
    }

    #[test]
    fn expired_entries_recompute() {
        let (cache, clock) = manual(small(4, 10));
        cache.get_with(Namespace::Aggregates, "k", || 1);
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get_with(Namespace::Aggregates, "k", || 2), 2);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn failed_compute_is_not_cached() {
        let (cache, _) = manual(small(4, 60));
        let err: Result<u32, &str> = cache.get(Namespace::Aggregates, "k", || Err("boom"));
        assert_eq!(err, Err("boom"));
        assert!(!cache.contains(Namespace::Aggregates, "k"));

        let ok: Result<u32, &str> = cache.get(Namespace::Aggregates, "k", || Ok(5));
        assert_eq!(ok, Ok(5));
    }

    #[test]
    fn invalidate_forces_recompute() {
        let (cache, _) = manual(small(4, 60));
        cache.get_with(Namespace::CategoryLists, "k", || 1);
        assert!(cache.invalidate(Namespace::CategoryLists, "k"));
        assert!(!cache.invalidate(Namespace::CategoryLists, "k"));
        assert_eq!(cache.get_with(Namespace::CategoryLists, "k", || 2), 2);
    }

    #[test]
    fn invalidate_where_matches_prefix() {
        let (cache, _) = manual(small(8, 60));
        for key in ["v1|a", "v1|b", "v2|a"] {
            cache.get_with(Namespace::FilteredLists, key, || 0);
        }
        let removed = cache.invalidate_where(Namespace::FilteredLists, |k| k.starts_with("v1|"));
        assert_eq!(removed, 2);
        assert!(cache.contains(Namespace::FilteredLists, "v2|a"));
    }

    #[test]
    fn invalidation_during_compute_is_not_cached() {
        let (cache, _) = manual(small(4, 60));
        let v = cache.get_with(Namespace::Aggregates, "k", || {
            cache.invalidate(Namespace::Aggregates, "k");
            1
        });
        assert_eq!(v, 1);
        assert!(!cache.contains(Namespace::Aggregates, "k"));
    }

    #[test]
    fn critical_pressure_shrinks_oldest_first() {
        let (cache, clock) = manual(small(8, 600));
        for i in 0..8 {
            cache.get_with(Namespace::FilteredLists, &format!("k{i}"), || i);
            clock.advance(Duration::from_secs(1));
        }

        let dropped = cache.report_memory_pressure(MemoryPressure::Critical);
        assert_eq!(dropped, 6);
        assert_eq!(cache.len(Namespace::FilteredLists), 2);
        assert!(cache.contains(Namespace::FilteredLists, "k6"));
        assert!(cache.contains(Namespace::FilteredLists, "k7"));

        let stats = cache.stats();
        assert_eq!(stats.tier, MemoryPressure::Critical);
        assert_eq!(stats.namespaces[0].max_entries, 2);
        assert_eq!(stats.namespaces[0].ttl_secs, 150);
    }

    #[test]
    fn warning_pressure_halves_ttl() {
        let (cache, clock) = manual(small(8, 100));
        cache.get_with(Namespace::Aggregates, "k", || 1);
        clock.advance(Duration::from_secs(60));
        cache.report_memory_pressure(MemoryPressure::Warning);
        assert!(!cache.contains(Namespace::Aggregates, "k"));
    }

    #[test]
    fn scaled_limits_never_reach_zero() {
        let limits = NamespaceLimits::new(2, 2);
        assert_eq!(
            limits.scaled(MemoryPressure::Critical),
            (1, Duration::from_secs(1))
        );
    }

    #[test]
    fn weigher_feeds_cost_stats() {
        let cache: CacheManager<Vec<u8>> =
            CacheManager::new(small(4, 60)).with_weigher(|v: &Vec<u8>| v.len());
        cache.get_with(Namespace::CategoryLists, "k", || vec![0; 5]);
        let stats = cache.stats();
        let lists = stats
            .namespaces
            .iter()
            .find(|n| n.namespace == Namespace::CategoryLists)
            .unwrap();
        assert_eq!(lists.cost, 5);
    }
}
