//! Named, bounded cache stores for rmx collectors
//!
//! A [`CacheStore`] maps string keys to cloneable values with a per-entry TTL
//! and least-recently-used eviction once the store is full. Expiry is lazy: an
//! expired entry is reported as a miss and removed when it is next touched, or
//! by [`CacheStore::purge_expired`] when a janitor is configured.
//!
//! A [`CacheManager`] owns any number of stores, keyed by name, and records
//! their activity as Prometheus metrics.

pub mod manager;
pub mod metrics;
pub mod store;

pub use manager::CacheManager;
pub use metrics::CacheMetrics;
pub use store::{CacheStats, CacheStore};
