//! Prometheus view of the collector state table

use crate::state::{CollectionStatus, CollectorState};
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use rmx_core::{Error, Result};
use std::time::Duration;

/// Diagnostic metrics derived from each collector's state
#[derive(Clone)]
pub struct RegistryDiagnostics {
    enabled: IntGaugeVec,
    up: IntGaugeVec,
    last_duration: GaugeVec,
    consecutive_errors: IntGaugeVec,
    last_success: GaugeVec,
    runs: IntCounterVec,
    collect_all_duration: Histogram,
    // Also set by a pass with no enabled collectors
    last_pass_collectors: Gauge,
}

impl RegistryDiagnostics {
    pub fn new(namespace: &str) -> Result<Self> {
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(namespace);
        let create = |e| Error::metrics("create collector diagnostics", e);
        let labels = &["collector"];

        Ok(Self {
            enabled: IntGaugeVec::new(
                opts("collector_enabled", "Whether the collector is enabled"),
                labels,
            )
            .map_err(create)?,
            up: IntGaugeVec::new(
                opts("collector_up", "Whether the collector's last run succeeded"),
                labels,
            )
            .map_err(create)?,
            last_duration: GaugeVec::new(
                opts(
                    "collector_last_duration_seconds",
                    "Duration of the collector's last run",
                ),
                labels,
            )
            .map_err(create)?,
            consecutive_errors: IntGaugeVec::new(
                opts(
                    "collector_consecutive_errors",
                    "Failed runs since the collector last succeeded",
                ),
                labels,
            )
            .map_err(create)?,
            last_success: GaugeVec::new(
                opts(
                    "collector_last_success_timestamp_seconds",
                    "Unix time of the collector's last successful run",
                ),
                labels,
            )
            .map_err(create)?,
            runs: IntCounterVec::new(
                opts("collector_runs_total", "Collector runs by outcome"),
                &["collector", "status"],
            )
            .map_err(create)?,
            collect_all_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "collect_all_duration_seconds",
                    "Duration of a full collection pass",
                )
                .namespace(namespace)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            )
            .map_err(create)?,
            last_pass_collectors: Gauge::with_opts(opts(
                "collect_all_collectors",
                "Collectors run by the last collection pass",
            ))
            .map_err(create)?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        let register = |e| Error::metrics("register collector diagnostics", e);
        registry.register(Box::new(self.enabled.clone())).map_err(register)?;
        registry.register(Box::new(self.up.clone())).map_err(register)?;
        registry
            .register(Box::new(self.last_duration.clone()))
            .map_err(register)?;
        registry
            .register(Box::new(self.consecutive_errors.clone()))
            .map_err(register)?;
        registry
            .register(Box::new(self.last_success.clone()))
            .map_err(register)?;
        registry.register(Box::new(self.runs.clone())).map_err(register)?;
        registry
            .register(Box::new(self.collect_all_duration.clone()))
            .map_err(register)?;
        registry
            .register(Box::new(self.last_pass_collectors.clone()))
            .map_err(register)?;
        Ok(())
    }

    /// Reflect a freshly registered or toggled collector
    pub fn observe_enabled(&self, name: &str, enabled: bool) {
        self.enabled
            .with_label_values(&[name])
            .set(i64::from(enabled));
    }

    /// Reflect the outcome of one run
    pub fn observe_run(&self, state: &CollectorState) {
        let name = state.name.as_str();
        self.observe_enabled(name, state.enabled);
        self.up
            .with_label_values(&[name])
            .set(i64::from(state.last_status == CollectionStatus::Success));
        self.consecutive_errors
            .with_label_values(&[name])
            .set(i64::from(state.consecutive_errors));
        if let Some(duration) = state.last_duration {
            self.last_duration
                .with_label_values(&[name])
                .set(duration.as_secs_f64());
        }
        if let Some(success) = state.last_success {
            self.last_success
                .with_label_values(&[name])
                .set(success.timestamp_millis() as f64 / 1000.0);
        }
        self.runs
            .with_label_values(&[name, state.last_status.as_str()])
            .inc();
    }

    pub fn observe_pass(&self, duration: Duration, collectors: usize) {
        self.collect_all_duration.observe(duration.as_secs_f64());
        self.last_pass_collectors.set(collectors as f64);
    }
}

impl std::fmt::Debug for RegistryDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDiagnostics").finish_non_exhaustive()
    }
}
