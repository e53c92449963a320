//! Self-instrumentation of the cardinality optimizer

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
};
use rmx_core::{Error, Result};

/// Prometheus metrics describing admission decisions and tracked series
#[derive(Clone)]
pub struct CardinalityMetrics {
    pub(crate) series: IntGauge,
    pub(crate) series_by_metric: IntGaugeVec,
    pub(crate) max_series: IntGauge,
    pub(crate) sample_rate: Gauge,
    pub(crate) admitted: IntCounter,
    pub(crate) sampled: IntCounter,
    pub(crate) dropped: IntCounter,
    pub(crate) resets: IntCounter,
    pub(crate) cleanup_duration: Histogram,
}

impl CardinalityMetrics {
    pub fn new(namespace: &str) -> Result<Self> {
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(namespace);
        let create = |e| Error::metrics("create cardinality metric", e);

        Ok(Self {
            series: IntGauge::with_opts(opts(
                "cardinality_series",
                "Distinct series currently tracked",
            ))
            .map_err(create)?,
            series_by_metric: IntGaugeVec::new(
                opts(
                    "cardinality_series_by_metric",
                    "Distinct series tracked for the metrics with the most series",
                ),
                &["metric"],
            )
            .map_err(create)?,
            max_series: IntGauge::with_opts(opts(
                "cardinality_max_series",
                "Configured ceiling on distinct series",
            ))
            .map_err(create)?,
            sample_rate: Gauge::with_opts(opts(
                "cardinality_sample_rate",
                "Probability of admitting a new series at the ceiling",
            ))
            .map_err(create)?,
            admitted: IntCounter::with_opts(opts(
                "cardinality_admitted_total",
                "New series admitted",
            ))
            .map_err(create)?,
            sampled: IntCounter::with_opts(opts(
                "cardinality_sampled_total",
                "New series admitted by sampling at the ceiling",
            ))
            .map_err(create)?,
            dropped: IntCounter::with_opts(opts(
                "cardinality_dropped_total",
                "New series rejected at the ceiling",
            ))
            .map_err(create)?,
            resets: IntCounter::with_opts(opts(
                "cardinality_resets_total",
                "Times every tracked series was forgotten",
            ))
            .map_err(create)?,
            cleanup_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "cardinality_cleanup_duration_seconds",
                    "Duration of the cardinality maintenance pass",
                )
                .namespace(namespace)
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            )
            .map_err(create)?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        let register = |e| Error::metrics("register cardinality metric", e);
        registry.register(Box::new(self.series.clone())).map_err(register)?;
        registry
            .register(Box::new(self.series_by_metric.clone()))
            .map_err(register)?;
        registry
            .register(Box::new(self.max_series.clone()))
            .map_err(register)?;
        registry
            .register(Box::new(self.sample_rate.clone()))
            .map_err(register)?;
        registry.register(Box::new(self.admitted.clone())).map_err(register)?;
        registry.register(Box::new(self.sampled.clone())).map_err(register)?;
        registry.register(Box::new(self.dropped.clone())).map_err(register)?;
        registry.register(Box::new(self.resets.clone())).map_err(register)?;
        registry
            .register(Box::new(self.cleanup_duration.clone()))
            .map_err(register)?;
        Ok(())
    }
}

impl std::fmt::Debug for CardinalityMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardinalityMetrics")
            .field("admitted", &self.admitted.get())
            .field("sampled", &self.sampled.get())
            .field("dropped", &self.dropped.get())
            .finish_non_exhaustive()
    }
}
