//! A single named cache store

use crate::metrics::CacheMetrics;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct StoreState<V> {
    // Unbounded; capacity is enforced in `set_with_ttl`, where an expired
    // tail entry is counted as an expiration rather than an eviction.
    entries: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Point-in-time counters for one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Entries physically held, including expired ones not yet purged
    pub size: usize,
    pub max_entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

/// A bounded key/value store with per-entry TTL and LRU eviction
///
/// All operations take the store's mutex for a constant number of map
/// operations, so concurrent writers are linearized and the last write wins.
#[derive(Debug)]
pub struct CacheStore<V> {
    name: String,
    max_entries: usize,
    default_ttl: Duration,
    state: Mutex<StoreState<V>>,
    metrics: Option<CacheMetrics>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(name: impl Into<String>, max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            max_entries,
            default_ttl,
            state: Mutex::new(StoreState {
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            metrics: None,
        }
    }

    pub(crate) fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        metrics.set_entries(&self.name, 0);
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key` with the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, Duration::ZERO);
    }

    /// Store `value` under `key`; a zero `ttl` falls back to the default TTL
    ///
    /// Overwriting an existing key replaces its value and makes it the most
    /// recently used entry without evicting anything. Inserting a new key into
    /// a full store pops the least recently used entry; if that entry had
    /// already expired it counts as an expiration, otherwise as an eviction.
    /// Expired entries elsewhere in the store are left to `purge_expired`.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl).unwrap_or_else(|| far_future(now)),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        if self.max_entries == 0 {
            state.evictions += 1;
            tracing::trace!(store = %self.name, key = %key, "Zero-capacity store dropped entry");
            self.record(|m| m.record_evictions(&self.name, 1));
            return;
        }

        let mut expired = 0;
        let mut evicted = 0;
        while state.entries.len() >= self.max_entries {
            let tail_expired = match state.entries.peek_lru() {
                Some((_, entry)) => entry.is_expired(now),
                None => break,
            };
            if let Some((popped, _)) = state.entries.pop_lru() {
                if tail_expired {
                    expired += 1;
                    tracing::trace!(store = %self.name, key = %popped, "Dropped expired entry");
                } else {
                    evicted += 1;
                    tracing::trace!(store = %self.name, key = %popped, "Evicted least recently used entry");
                }
            }
        }
        state.expirations += expired;
        state.evictions += evicted;
        state.entries.put(key, entry);
        let len = state.entries.len();
        drop(guard);

        self.record(|m| {
            m.record_expirations(&self.name, expired);
            m.record_evictions(&self.name, evicted);
            m.set_entries(&self.name, len);
        });
    }

    /// Look up `key`, refreshing its recency on a hit
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.misses += 1;
                drop(guard);
                self.record(|m| m.record_miss(&self.name));
                return None;
            }
        };

        if expired {
            state.entries.pop(key);
            state.misses += 1;
            state.expirations += 1;
            let len = state.entries.len();
            drop(guard);
            self.record(|m| {
                m.record_miss(&self.name);
                m.record_expirations(&self.name, 1);
                m.set_entries(&self.name, len);
            });
            return None;
        }

        let value = state.entries.get(key).map(|entry| entry.value.clone());
        state.hits += 1;
        drop(guard);
        self.record(|m| m.record_hit(&self.name));
        value
    }

    /// Remove `key`, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key).is_some();
        let len = state.entries.len();
        drop(state);
        if removed {
            self.record(|m| m.set_entries(&self.name, len));
        }
        removed
    }

    /// Remove every entry; counters are kept
    pub fn clear(&self) {
        self.state.lock().entries.clear();
        self.record(|m| m.set_entries(&self.name, 0));
    }

    /// Number of entries held, including expired ones not yet purged
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let purged = purge(&mut state.entries, Instant::now());
        state.expirations += purged;
        let len = state.entries.len();
        drop(state);
        if purged > 0 {
            self.record(|m| {
                m.record_expirations(&self.name, purged);
                m.set_entries(&self.name, len);
            });
        }
        usize::try_from(purged).unwrap_or(usize::MAX)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            name: self.name.clone(),
            hit_count: state.hits,
            miss_count: state.misses,
            size: state.entries.len(),
            max_entries: self.max_entries,
            evictions: state.evictions,
            expirations: state.expirations,
        }
    }

    fn record(&self, f: impl FnOnce(&CacheMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

fn purge<V>(entries: &mut LruCache<String, CacheEntry<V>>, now: Instant) -> u64 {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len() as u64
}

// Effectively never expires; used when `now + ttl` overflows.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(100 * 365 * 24 * 60 * 60)
}
