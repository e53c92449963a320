//! Cardinality control for rmx
//!
//! The [`CardinalityOptimizer`] decides whether an observation of a
//! `(metric name, label set)` pair may be exported. Series already seen are
//! always admitted; new series are admitted freely below the configured
//! ceiling and, at the ceiling, either rejected or admitted with the current
//! sample probability. A periodic maintenance pass lowers that probability in
//! proportion to any overage and forgets every tracked series once the
//! housekeeping threshold is crossed.

pub mod hashing;
pub mod metrics;
pub mod optimizer;

pub use hashing::series_hash;
pub use metrics::CardinalityMetrics;
pub use optimizer::{CardinalityOptimizer, CardinalityStats, MetricCardinality, OptimizationReport};
