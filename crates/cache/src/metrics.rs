//! Prometheus metrics for cache operations

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use rmx_core::{Error, Result};

/// Prometheus metrics shared by every store of one manager
#[derive(Clone)]
pub struct CacheMetrics {
    hits: IntCounterVec,
    misses: IntCounterVec,
    evictions: IntCounterVec,
    expirations: IntCounterVec,
    entries: IntGaugeVec,
}

impl CacheMetrics {
    /// Create the metric vectors under `namespace`; nothing is registered yet
    pub fn new(namespace: &str) -> Result<Self> {
        let counter = |name: &str, help: &str| {
            IntCounterVec::new(Opts::new(name, help).namespace(namespace), &["store"])
                .map_err(|e| Error::metrics("create cache counter", e))
        };

        Ok(Self {
            hits: counter("cache_hits_total", "Total number of cache hits")?,
            misses: counter("cache_misses_total", "Total number of cache misses")?,
            evictions: counter(
                "cache_evictions_total",
                "Total number of entries evicted to make room",
            )?,
            expirations: counter(
                "cache_expirations_total",
                "Total number of entries removed after their TTL passed",
            )?,
            entries: IntGaugeVec::new(
                Opts::new("cache_entries", "Entries currently held, including expired ones")
                    .namespace(namespace),
                &["store"],
            )
            .map_err(|e| Error::metrics("create cache gauge", e))?,
        })
    }

    /// Register every metric with `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.hits.clone()))
            .map_err(|e| Error::metrics("register cache hits", e))?;
        registry
            .register(Box::new(self.misses.clone()))
            .map_err(|e| Error::metrics("register cache misses", e))?;
        registry
            .register(Box::new(self.evictions.clone()))
            .map_err(|e| Error::metrics("register cache evictions", e))?;
        registry
            .register(Box::new(self.expirations.clone()))
            .map_err(|e| Error::metrics("register cache expirations", e))?;
        registry
            .register(Box::new(self.entries.clone()))
            .map_err(|e| Error::metrics("register cache entries", e))?;
        Ok(())
    }

    pub fn record_hit(&self, store: &str) {
        self.hits.with_label_values(&[store]).inc();
    }

    pub fn record_miss(&self, store: &str) {
        self.misses.with_label_values(&[store]).inc();
    }

    pub fn record_evictions(&self, store: &str, count: u64) {
        if count > 0 {
            self.evictions.with_label_values(&[store]).inc_by(count);
        }
    }

    pub fn record_expirations(&self, store: &str, count: u64) {
        if count > 0 {
            self.expirations.with_label_values(&[store]).inc_by(count);
        }
    }

    pub fn set_entries(&self, store: &str, entries: usize) {
        self.entries
            .with_label_values(&[store])
            .set(i64::try_from(entries).unwrap_or(i64::MAX));
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics").finish_non_exhaustive()
    }
}
