//! Append-only output for metric shapes and values.
//!
//! Collectors emit `prometheus` descriptors from `describe` and metric families
//! from `collect`. The sink is cheap to clone and safe to write from any task;
//! the lock is held only for the duration of a `Vec` push.

use parking_lot::Mutex;
use prometheus::core::{Collector as PromCollector, Desc};
use prometheus::proto::MetricFamily;
use std::sync::Arc;

#[derive(Debug, Default)]
struct SinkBuffer {
    descs: Vec<Desc>,
    families: Vec<MetricFamily>,
}

/// Shared, append-only metric sink
#[derive(Debug, Clone, Default)]
pub struct MetricSink {
    inner: Arc<Mutex<SinkBuffer>>,
}

impl MetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the static shape of a metric
    pub fn describe(&self, desc: Desc) {
        self.inner.lock().descs.push(desc);
    }

    /// Record the descriptors of a `prometheus` collector (e.g. a `GaugeVec`)
    pub fn describe_collector(&self, collector: &dyn PromCollector) {
        let descs: Vec<Desc> = collector.desc().into_iter().cloned().collect();
        self.inner.lock().descs.extend(descs);
    }

    /// Record one metric family
    pub fn emit(&self, family: MetricFamily) {
        self.inner.lock().families.push(family);
    }

    pub fn emit_all(&self, families: impl IntoIterator<Item = MetricFamily>) {
        let families: Vec<MetricFamily> = families.into_iter().collect();
        if families.is_empty() {
            return;
        }
        self.inner.lock().families.extend(families);
    }

    /// Record the current values of a `prometheus` collector
    pub fn emit_collector(&self, collector: &dyn PromCollector) {
        self.emit_all(collector.collect());
    }

    /// Number of metric families emitted so far
    pub fn len(&self) -> usize {
        self.inner.lock().families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of individual samples across all emitted families
    pub fn sample_count(&self) -> usize {
        self.inner
            .lock()
            .families
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }

    pub fn take_families(&self) -> Vec<MetricFamily> {
        std::mem::take(&mut self.inner.lock().families)
    }

    pub fn take_descs(&self) -> Vec<Desc> {
        std::mem::take(&mut self.inner.lock().descs)
    }

    /// Move everything this sink holds into `target`
    pub fn drain_into(&self, target: &MetricSink) {
        if Arc::ptr_eq(&self.inner, &target.inner) {
            return;
        }
        let (descs, families) = {
            let mut buffer = self.inner.lock();
            (
                std::mem::take(&mut buffer.descs),
                std::mem::take(&mut buffer.families),
            )
        };
        let mut target = target.inner.lock();
        target.descs.extend(descs);
        target.families.extend(families);
    }
}
