//! Collectors shipped with the exporter itself

use crate::collector::{Collector, Toggle};
use async_trait::async_trait;
use prometheus::{Gauge, GaugeVec, Opts};
use rmx_cardinality::CardinalityOptimizer;
use rmx_core::{CollectContext, Error, MetricSink, Result};
use std::sync::Arc;
use std::time::Instant;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reports the exporter's build and uptime
///
/// Every series passes through the cardinality optimizer when one is attached.
pub struct ExporterCollector {
    enabled: Toggle,
    started: Instant,
    build_info: GaugeVec,
    uptime: Gauge,
    optimizer: Option<Arc<CardinalityOptimizer>>,
}

impl ExporterCollector {
    pub const NAME: &'static str = "exporter";

    pub fn new(namespace: &str) -> Result<Self> {
        let build_info = GaugeVec::new(
            Opts::new("exporter_build_info", "Build information, always 1").namespace(namespace),
            &["version"],
        )
        .map_err(|e| Error::metrics("create exporter build info", e))?;
        let uptime = Gauge::with_opts(
            Opts::new("exporter_uptime_seconds", "Seconds since the exporter started")
                .namespace(namespace),
        )
        .map_err(|e| Error::metrics("create exporter uptime", e))?;

        Ok(Self {
            enabled: Toggle::default(),
            started: Instant::now(),
            build_info,
            uptime,
            optimizer: None,
        })
    }

    pub fn with_optimizer(mut self, optimizer: Arc<CardinalityOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    fn admit<'a>(&self, metric: &str, labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        match &self.optimizer {
            Some(optimizer) => optimizer.should_collect_metric(metric, labels),
            None => true,
        }
    }
}

#[async_trait]
impl Collector for ExporterCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self, sink: &MetricSink) {
        sink.describe_collector(&self.build_info);
        sink.describe_collector(&self.uptime);
    }

    async fn collect(&self, ctx: &CollectContext, sink: &MetricSink) -> Result<()> {
        if let Some(reason) = ctx.err() {
            return Err(Error::collection_with_source(
                Self::NAME,
                "context finished before collection",
                reason,
            ));
        }

        if self.admit("exporter_build_info", [("version", VERSION)]) {
            self.build_info.with_label_values(&[VERSION]).set(1.0);
            sink.emit_collector(&self.build_info);
        }

        if self.admit("exporter_uptime_seconds", std::iter::empty()) {
            self.uptime.set(self.started.elapsed().as_secs_f64());
            sink.emit_collector(&self.uptime);
        }

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}
