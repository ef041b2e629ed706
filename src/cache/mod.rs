//! In-process TTL cache protecting store reads.
//!
//! Keys are namespaced by [`CacheClass`] prefix so a store write can drop
//! every event-derived entry in one pass.

pub mod cached_store;

use crate::domain::Event;
use crate::observability::metrics;
use crate::storage::InvalidationHook;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use cached_store::{CachedEventStore, EventsSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheClass {
    Events,
    MapData,
    Locations,
    Stats,
    Scheduler,
}

impl CacheClass {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheClass::Events => "events:",
            CacheClass::MapData => "map:",
            CacheClass::Locations => "locations:",
            CacheClass::Stats => "stats:",
            CacheClass::Scheduler => "scheduler:",
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(match self {
            CacheClass::Events => 300,
            CacheClass::MapData => 600,
            CacheClass::Locations => 1800,
            CacheClass::Stats => 180,
            CacheClass::Scheduler => 60,
        })
    }

    pub fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix(), suffix)
    }

    /// Classes whose entries are derived from stored events
    pub fn event_derived() -> [CacheClass; 3] {
        [CacheClass::Events, CacheClass::MapData, CacheClass::Stats]
    }
}

/// Values the application caches
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Events(Vec<Event>),
    Event(Option<Event>),
    Summary(EventsSummary),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_items: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub set_count: u64,
    pub hit_rate_percent: f64,
    pub total_requests: u64,
    pub expired_evictions: u64,
    pub oldest_item_age_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub statistics: CacheStats,
    pub cache_type: &'static str,
    pub default_ttl: u64,
}

struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct State<V> {
    items: HashMap<String, Entry<V>>,
    hit_count: u64,
    miss_count: u64,
    set_count: u64,
    expired_evictions: u64,
    /// Bumped by every clear or invalidation
    generation: u64,
}

/// Key-value cache with per-entry expiry, evicted lazily on read or sweep.
pub struct TtlCache<V> {
    state: Mutex<State<V>>,
    default_ttl: Duration,
    max_items_warning: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration, max_items_warning: usize) -> Self {
        info!("🗄️ Memory cache initialized with default TTL: {}s", default_ttl.as_secs());
        Self {
            state: Mutex::new(State {
                items: HashMap::new(),
                hit_count: 0,
                miss_count: 0,
                set_count: 0,
                expired_evictions: 0,
                generation: 0,
            }),
            default_ttl,
            max_items_warning,
        }
    }

    // A panic while holding the lock cannot leave an entry half-written,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.lock();
        let hit = match state.items.get(key).map(|e| e.is_expired(now)) {
            Some(false) => state.items.get(key).map(|e| e.value.clone()),
            Some(true) => {
                state.items.remove(key);
                state.expired_evictions += 1;
                None
            }
            None => None,
        };
        if hit.is_some() {
            state.hit_count += 1;
            metrics::cache::hit();
            debug!("🎯 Cache HIT for key: {}", key);
        } else {
            state.miss_count += 1;
            metrics::cache::miss();
            debug!("Cache MISS for key: {}", key);
        }
        hit
    }

    /// Invalidation counter; read it before loading a value to cache.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn insert(state: &mut State<V>, key: String, value: V, ttl: Duration) {
        let now = Instant::now();
        debug!("💾 Cache SET for key: {}, TTL: {}s", key, ttl.as_secs());
        state.items.insert(key, Entry { value, created_at: now, expires_at: now + ttl });
        state.set_count += 1;
    }

    /// Stores `value`; `None` uses the cache-wide default TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        Self::insert(&mut self.lock(), key.into(), value, ttl);
    }

    /// Stores `value` only if nothing was invalidated since `generation`
    /// was read. Returns whether the value was stored.
    pub fn set_if_generation(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, generation: u64) -> bool {
        let key = key.into();
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Cache SET skipped for key: {} (invalidated while loading)", key);
            return false;
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        Self::insert(&mut state, key, value, ttl);
        true
    }

    /// Stores under the class prefix with the class TTL.
    pub fn set_in(&self, class: CacheClass, suffix: &str, value: V) {
        self.set(class.key(suffix), value, Some(class.ttl()));
    }

    /// [`set_in`](Self::set_in) guarded by [`set_if_generation`](Self::set_if_generation).
    pub fn set_in_if_generation(&self, class: CacheClass, suffix: &str, value: V, generation: u64) -> bool {
        self.set_if_generation(class.key(suffix), value, Some(class.ttl()), generation)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().items.remove(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.items.len();
        state.items.clear();
        state.generation += 1;
        info!("🧹 Cache cleared ({} items)", removed);
        removed
    }

    /// Drops every key starting with one of `prefixes`.
    pub fn invalidate_prefixes(&self, prefixes: &[&str]) -> usize {
        let mut state = self.lock();
        let before = state.items.len();
        state.items.retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p)));
        state.generation += 1;
        let removed = before - state.items.len();
        metrics::cache::invalidated(removed);
        removed
    }

    /// Drops everything derived from stored events.
    pub fn invalidate_events(&self) -> usize {
        let prefixes: Vec<&str> = CacheClass::event_derived().iter().map(|c| c.prefix()).collect();
        let removed = self.invalidate_prefixes(&prefixes);
        info!("🗑️ Invalidated {} event cache keys", removed);
        removed
    }

    /// Evicts expired entries now instead of on next read.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.items.len();
        state.items.retain(|_, e| !e.is_expired(now));
        let removed = before - state.items.len();
        state.expired_evictions += removed as u64;
        if removed > 0 {
            debug!("🧹 Cleaned up {} expired cache items", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.sweep();
        let now = Instant::now();
        let state = self.lock();
        let total_requests = state.hit_count + state.miss_count;
        let hit_rate = if total_requests > 0 {
            state.hit_count as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            total_items: state.items.len(),
            hit_count: state.hit_count,
            miss_count: state.miss_count,
            set_count: state.set_count,
            hit_rate_percent: (hit_rate * 100.0).round() / 100.0,
            total_requests,
            expired_evictions: state.expired_evictions,
            oldest_item_age_seconds: state
                .items
                .values()
                .map(|e| now.duration_since(e.created_at).as_secs_f64())
                .fold(None, |acc: Option<f64>, age| Some(acc.map_or(age, |a| a.max(age)))),
        }
    }

    pub fn health(&self) -> CacheHealth {
        let statistics = self.stats();
        let status = if statistics.total_items > self.max_items_warning
            || (statistics.hit_rate_percent < 50.0 && statistics.total_requests > 100)
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        CacheHealth { status, statistics, cache_type: "memory", default_ttl: self.default_ttl.as_secs() }
    }
}

impl<V: Clone + Send> InvalidationHook for TtlCache<V> {
    fn events_changed(&self) {
        self.invalidate_events();
    }
}
