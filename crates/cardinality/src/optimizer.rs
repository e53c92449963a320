//! Series admission and adaptive sampling

use crate::hashing::series_hash;
use crate::metrics::CardinalityMetrics;
use parking_lot::Mutex;
use prometheus::Registry;
use rmx_config::CardinalityConfig;
use rmx_core::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Distinct series tracked for one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricCardinality {
    pub metric_name: String,
    pub cardinality: usize,
}

/// Snapshot of the optimizer's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardinalityStats {
    pub total_cardinality: usize,
    pub max_cardinality: usize,
    pub sample_rate: f64,
    pub sampling_enabled: bool,
    pub metric_counts: BTreeMap<String, usize>,
    /// Highest counts first, ties broken by name
    pub top_metrics: Vec<MetricCardinality>,
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    pub total_before: usize,
    pub sample_rate: f64,
    pub sampling_enabled: bool,
    pub reset: bool,
}

#[derive(Debug)]
struct OptimizerState {
    max_cardinality: usize,
    sample_rate: f64,
    sampling_enabled: bool,
    metric_cardinality: HashMap<String, usize>,
    seen: HashSet<u64>,
    rng: fastrand::Rng,
}

impl OptimizerState {
    fn record(&mut self, hash: u64, metric_name: &str) {
        self.seen.insert(hash);
        match self.metric_cardinality.get_mut(metric_name) {
            Some(count) => *count += 1,
            None => {
                self.metric_cardinality.insert(metric_name.to_string(), 1);
            }
        }
    }

    fn top_metrics(&self, n: usize) -> Vec<MetricCardinality> {
        let mut metrics: Vec<MetricCardinality> = self
            .metric_cardinality
            .iter()
            .map(|(name, count)| MetricCardinality {
                metric_name: name.clone(),
                cardinality: *count,
            })
            .collect();
        metrics.sort_by(|a, b| {
            b.cardinality
                .cmp(&a.cardinality)
                .then_with(|| a.metric_name.cmp(&b.metric_name))
        });
        metrics.truncate(n);
        metrics
    }
}

enum Admission {
    Known,
    Admitted,
    Sampled,
    Dropped,
}

/// Tracks distinct series per metric and decides which new series to admit
pub struct CardinalityOptimizer {
    state: Mutex<OptimizerState>,
    min_sample_rate: f64,
    reset_threshold: usize,
    warn_limit: usize,
    max_labels: usize,
    max_label_size: usize,
    top_n: usize,
    metrics: CardinalityMetrics,
}

impl CardinalityOptimizer {
    pub fn new(namespace: &str, config: &CardinalityConfig) -> Result<Self> {
        Self::build(namespace, config, fastrand::Rng::new())
    }

    /// Like [`CardinalityOptimizer::new`] with a deterministic sampling sequence
    pub fn with_seed(namespace: &str, config: &CardinalityConfig, seed: u64) -> Result<Self> {
        Self::build(namespace, config, fastrand::Rng::with_seed(seed))
    }

    fn build(namespace: &str, config: &CardinalityConfig, rng: fastrand::Rng) -> Result<Self> {
        validate_rate(config.sample_rate)?;
        if !(config.min_sample_rate > 0.0 && config.min_sample_rate <= config.sample_rate) {
            return Err(Error::configuration(format!(
                "minimum sample rate {} must be in (0, {}]",
                config.min_sample_rate, config.sample_rate
            )));
        }
        let metrics = CardinalityMetrics::new(namespace)?;
        metrics.max_series.set(to_i64(config.max_series));
        metrics.sample_rate.set(config.sample_rate);

        Ok(Self {
            state: Mutex::new(OptimizerState {
                max_cardinality: config.max_series,
                sample_rate: config.sample_rate,
                sampling_enabled: config.sample_rate < 1.0,
                metric_cardinality: HashMap::new(),
                seen: HashSet::new(),
                rng,
            }),
            min_sample_rate: config.min_sample_rate,
            reset_threshold: config.reset_threshold,
            warn_limit: config.warn_limit,
            max_labels: config.max_labels,
            max_label_size: config.max_label_size,
            top_n: config.top_n,
            metrics,
        })
    }

    /// Decide whether one observation of `metric_name` with `labels` may be exported
    ///
    /// An observation carrying more than `max_labels` labels, or a label value
    /// longer than `max_label_size` bytes, is dropped outright; a limit of 0
    /// disables that check. A series seen before is always admitted. A new series is admitted while
    /// the tracked total is below the ceiling. At the ceiling it is rejected,
    /// unless sampling is enabled, in which case it is admitted with
    /// probability `sample_rate` and tracked like any other series.
    pub fn should_collect_metric<I, K, V>(&self, metric_name: &str, labels: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let labels: Vec<(K, V)> = labels.into_iter().collect();
        if let Some(reason) = self.label_violation(&labels) {
            self.metrics.dropped.inc();
            tracing::trace!(metric = %metric_name, reason, "Series dropped by label limits");
            return false;
        }
        let hash = series_hash(
            metric_name,
            labels.iter().map(|(k, v)| (k.as_ref(), v.as_ref())),
        );

        let admission = {
            let mut state = self.state.lock();
            if state.seen.contains(&hash) {
                Admission::Known
            } else if state.seen.len() < state.max_cardinality {
                state.record(hash, metric_name);
                Admission::Admitted
            } else if state.sampling_enabled && state.rng.f64() < state.sample_rate {
                state.record(hash, metric_name);
                Admission::Sampled
            } else {
                Admission::Dropped
            }
        };

        match admission {
            Admission::Known => true,
            Admission::Admitted => {
                self.metrics.admitted.inc();
                true
            }
            Admission::Sampled => {
                self.metrics.admitted.inc();
                self.metrics.sampled.inc();
                true
            }
            Admission::Dropped => {
                self.metrics.dropped.inc();
                tracing::trace!(metric = %metric_name, "Series dropped at cardinality ceiling");
                false
            }
        }
    }

    fn label_violation<K, V>(&self, labels: &[(K, V)]) -> Option<&'static str>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.max_labels > 0 && labels.len() > self.max_labels {
            return Some("too many labels");
        }
        if self.max_label_size > 0
            && labels
                .iter()
                .any(|(_, value)| value.as_ref().len() > self.max_label_size)
        {
            return Some("label value too long");
        }
        None
    }

    /// Set the admission probability at the ceiling
    ///
    /// A rate of exactly `1.0` disables sampling, so new series at the ceiling
    /// are rejected; any rate in `(0, 1)` enables it.
    pub fn set_sample_rate(&self, rate: f64) -> Result<()> {
        validate_rate(rate)?;
        {
            let mut state = self.state.lock();
            state.sample_rate = rate;
            state.sampling_enabled = rate < 1.0;
        }
        self.metrics.sample_rate.set(rate);
        tracing::debug!(sample_rate = rate, "Updated cardinality sample rate");
        Ok(())
    }

    pub fn set_max_cardinality(&self, max: usize) {
        self.state.lock().max_cardinality = max;
        self.metrics.max_series.set(to_i64(max));
        tracing::debug!(max_cardinality = max, "Updated cardinality ceiling");
    }

    /// Run one maintenance pass
    ///
    /// When the tracked total exceeds the ceiling the sample rate is scaled by
    /// `max / total`. The result never drops below the configured floor, and
    /// a rate already under the floor is left as it is. When the tracked total
    /// exceeds the housekeeping threshold every series is forgotten.
    pub fn optimize_cardinality(&self) -> OptimizationReport {
        let start = Instant::now();
        let mut state = self.state.lock();
        let total = state.seen.len();

        if total > state.max_cardinality {
            let ratio = state.max_cardinality as f64 / total as f64;
            let floor = self.min_sample_rate.min(state.sample_rate);
            let rate = (state.sample_rate * ratio).max(floor).min(1.0);
            state.sample_rate = rate;
            state.sampling_enabled = rate < 1.0;
            tracing::info!(
                total,
                max = state.max_cardinality,
                sample_rate = rate,
                "Cardinality above ceiling, reduced sample rate"
            );
        }

        if total >= self.warn_limit {
            tracing::warn!(
                total,
                warn_limit = self.warn_limit,
                max = state.max_cardinality,
                "Series count is approaching the cardinality ceiling"
            );
        }

        let reset = total > self.reset_threshold;
        if reset {
            state.seen.clear();
            state.metric_cardinality.clear();
            tracing::info!(
                total,
                threshold = self.reset_threshold,
                "Reset cardinality tracking"
            );
        }

        let top = state.top_metrics(self.top_n);
        let report = OptimizationReport {
            total_before: total,
            sample_rate: state.sample_rate,
            sampling_enabled: state.sampling_enabled,
            reset,
        };
        let tracked = state.seen.len();
        drop(state);

        if reset {
            self.metrics.resets.inc();
        }
        self.metrics.series.set(to_i64(tracked));
        self.metrics.sample_rate.set(report.sample_rate);
        self.metrics.series_by_metric.reset();
        for metric in &top {
            self.metrics
                .series_by_metric
                .with_label_values(&[metric.metric_name.as_str()])
                .set(to_i64(metric.cardinality));
        }
        self.metrics
            .cleanup_duration
            .observe(start.elapsed().as_secs_f64());

        report
    }

    pub fn stats(&self) -> CardinalityStats {
        let state = self.state.lock();
        CardinalityStats {
            total_cardinality: state.seen.len(),
            max_cardinality: state.max_cardinality,
            sample_rate: state.sample_rate,
            sampling_enabled: state.sampling_enabled,
            metric_counts: state
                .metric_cardinality
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
            top_metrics: state.top_metrics(self.top_n),
        }
    }

    /// The `n` metrics with the most tracked series
    pub fn top_metrics(&self, n: usize) -> Vec<MetricCardinality> {
        self.state.lock().top_metrics(n)
    }

    pub fn total_cardinality(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.state.lock().sample_rate
    }

    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }

    /// Run [`CardinalityOptimizer::optimize_cardinality`] every `interval` until
    /// `token` is cancelled
    pub fn spawn_optimizer(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let optimizer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Cardinality optimizer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        optimizer.optimize_cardinality();
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for CardinalityOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardinalityOptimizer")
            .field("reset_threshold", &self.reset_threshold)
            .field("min_sample_rate", &self.min_sample_rate)
            .field("max_labels", &self.max_labels)
            .field("max_label_size", &self.max_label_size)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if rate > 0.0 && rate <= 1.0 {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "sample rate {rate} must be in (0, 1]"
        )))
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
