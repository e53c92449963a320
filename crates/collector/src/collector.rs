//! The collector capability contract

use async_trait::async_trait;
use rmx_core::{CollectContext, MetricSink, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// A pluggable source producing metrics from one polling pass
///
/// Implementations are shared across tasks as `Arc<dyn Collector>`.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable, unique identifier
    fn name(&self) -> &str;

    /// Emit the shape of every metric this collector can produce
    ///
    /// Must not perform I/O.
    fn describe(&self, sink: &MetricSink);

    /// Emit current metric values
    ///
    /// Implementations should return promptly once `ctx` is done. Returning an
    /// error after emitting some values marks the collection as partial; those
    /// values are still exported.
    async fn collect(&self, ctx: &CollectContext, sink: &MetricSink) -> Result<()>;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);
}

/// Runtime on/off switch for collector implementations
#[derive(Debug)]
pub struct Toggle(AtomicBool);

impl Toggle {
    pub const fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Self::new(true)
    }
}
