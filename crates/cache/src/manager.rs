//! Named store ownership and pass-through operations

use crate::metrics::CacheMetrics;
use crate::store::{CacheStats, CacheStore};
use dashmap::DashMap;
use prometheus::Registry;
use rmx_config::CacheConfig;
use rmx_core::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Owns a set of named [`CacheStore`]s
///
/// Pass-through operations on a store that does not exist are no-ops: writes
/// return `false` and reads return `None`.
#[derive(Debug)]
pub struct CacheManager<V> {
    stores: DashMap<String, Arc<CacheStore<V>>>,
    metrics: CacheMetrics,
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(namespace: &str) -> Result<Self> {
        Ok(Self {
            stores: DashMap::new(),
            metrics: CacheMetrics::new(namespace)?,
        })
    }

    /// Create a manager with every store listed in `config`
    pub fn from_config(namespace: &str, config: &CacheConfig) -> Result<Self> {
        let manager = Self::new(namespace)?;
        for store in &config.stores {
            manager.create_store(&store.name, store.max_entries, store.default_ttl());
        }
        Ok(manager)
    }

    /// Create a store, or return the existing one with the same name
    ///
    /// An existing store keeps its original capacity and default TTL.
    pub fn create_store(
        &self,
        name: &str,
        max_entries: usize,
        default_ttl: Duration,
    ) -> Arc<CacheStore<V>> {
        let store = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    store = %name,
                    max_entries,
                    default_ttl_ms = default_ttl.as_millis() as u64,
                    "Created cache store"
                );
                Arc::new(
                    CacheStore::new(name, max_entries, default_ttl)
                        .with_metrics(self.metrics.clone()),
                )
            })
            .value()
            .clone();

        if store.max_entries() != max_entries || store.default_ttl() != default_ttl {
            tracing::debug!(store = %name, "Cache store already exists, keeping its settings");
        }
        store
    }

    pub fn get_store(&self, name: &str) -> Option<Arc<CacheStore<V>>> {
        self.stores.get(name).map(|store| Arc::clone(store.value()))
    }

    /// Store a value with the store's default TTL
    pub fn set(&self, store: &str, key: impl Into<String>, value: V) -> bool {
        self.set_with_ttl(store, key, value, Duration::ZERO)
    }

    pub fn set_with_ttl(&self, store: &str, key: impl Into<String>, value: V, ttl: Duration) -> bool {
        match self.get_store(store) {
            Some(s) => {
                s.set_with_ttl(key, value, ttl);
                true
            }
            None => {
                tracing::debug!(store = %store, "Set on unknown cache store ignored");
                false
            }
        }
    }

    pub fn get(&self, store: &str, key: &str) -> Option<V> {
        self.get_store(store)?.get(key)
    }

    pub fn delete(&self, store: &str, key: &str) -> bool {
        self.get_store(store).is_some_and(|s| s.delete(key))
    }

    /// Clear one store, returning whether it exists
    pub fn clear(&self, store: &str) -> bool {
        match self.get_store(store) {
            Some(s) => {
                s.clear();
                true
            }
            None => false,
        }
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    /// Statistics of every store, keyed by store name
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.stores
            .iter()
            .map(|s| (s.key().clone(), s.value().stats()))
            .collect()
    }

    /// Drop expired entries from every store
    pub fn purge_expired(&self) -> usize {
        // Collect first so no shard lock is held while a store mutex is taken
        let stores: Vec<Arc<CacheStore<V>>> =
            self.stores.iter().map(|s| Arc::clone(s.value())).collect();
        stores.iter().map(|s| s.purge_expired()).sum()
    }

    /// Register the cache metrics with `registry`
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }

    /// Periodically purge expired entries until `token` is cancelled
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Cache janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = manager.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
