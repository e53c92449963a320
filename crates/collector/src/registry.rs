//! Collector registration and concurrent, isolated collection

use crate::collector::Collector;
use crate::diagnostics::RegistryDiagnostics;
use crate::state::{CollectionStatus, CollectorState};
use chrono::Utc;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use prometheus::Registry;
use rmx_config::CollectorsConfig;
use rmx_core::{CollectContext, ContextError, Error, MetricSink, Result};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;


/// Registry-wide collection settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryOptions {
    /// Timeout for collectors registered without one; `None` inherits the
    /// caller's deadline only
    pub default_timeout: Option<Duration>,
    /// Maximum collectors running at once; 0 means unbounded
    pub max_concurrency: usize,
}

impl RegistryOptions {
    pub fn from_config(config: &CollectorsConfig) -> Self {
        Self {
            default_timeout: Some(Duration::from_millis(config.default_timeout_ms)),
            max_concurrency: config.max_concurrency,
        }
    }
}

/// Counts for one `collect_all` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub collectors: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub panicked: usize,
}

impl CollectionSummary {
    /// Runs that did not succeed outright
    pub fn failures(&self) -> usize {
        self.partial + self.failed + self.timed_out + self.panicked
    }
}

struct Entry {
    collector: Arc<dyn Collector>,
    timeout: Option<Duration>,
    state: CollectorState,
}

enum UnitOutcome {
    Success,
    Failed(Error),
    Panicked(String),
    Ended(ContextError),
}

struct UnitReport {
    name: String,
    started_at: chrono::DateTime<Utc>,
    elapsed: Duration,
    outcome: UnitOutcome,
    sink: MetricSink,
}

/// Owns the registered collectors and their state
///
/// There is no global instance; construct one and share it by `Arc`.
pub struct CollectorRegistry {
    entries: RwLock<IndexMap<String, Entry>>,
    default_timeout: Option<Duration>,
    limiter: Option<Arc<Semaphore>>,
    diagnostics: RegistryDiagnostics,
}

impl CollectorRegistry {
    pub fn new(namespace: &str) -> Result<Self> {
        Self::with_options(namespace, RegistryOptions::default())
    }

    pub fn with_options(namespace: &str, options: RegistryOptions) -> Result<Self> {
        Ok(Self {
            entries: RwLock::new(IndexMap::new()),
            default_timeout: options.default_timeout,
            limiter: (options.max_concurrency > 0)
                .then(|| Arc::new(Semaphore::new(options.max_concurrency))),
            diagnostics: RegistryDiagnostics::new(namespace)?,
        })
    }

    /// Register `collector` under its name with the default timeout
    pub fn register(&self, collector: Arc<dyn Collector>) -> Result<()> {
        self.insert(collector, self.default_timeout)
    }

    /// Register `collector` with its own timeout, which only ever narrows the
    /// caller's deadline
    pub fn register_with_timeout(&self, collector: Arc<dyn Collector>, timeout: Duration) -> Result<()> {
        self.insert(collector, Some(timeout))
    }

    fn insert(&self, collector: Arc<dyn Collector>, timeout: Option<Duration>) -> Result<()> {
        let name = collector.name().to_string();
        let enabled = collector.is_enabled();
        {
            let mut entries = self.entries.write();
            if entries.contains_key(&name) {
                return Err(Error::duplicate_collector(name));
            }
            entries.insert(
                name.clone(),
                Entry {
                    collector,
                    timeout,
                    state: CollectorState::new(name.clone(), enabled),
                },
            );
        }

        self.diagnostics.observe_enabled(&name, enabled);
        tracing::debug!(collector = %name, enabled, timeout_ms = timeout.map(|t| t.as_millis() as u64), "Registered collector");
        Ok(())
    }

    /// Enable or disable a registered collector
    ///
    /// A pass already in flight is unaffected.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| Error::collector_not_found(name))?;
            entry.collector.set_enabled(enabled);
            entry.state.enabled = enabled;
        }
        self.diagnostics.observe_enabled(name, enabled);
        tracing::info!(collector = %name, enabled, "Collector toggled");
        Ok(())
    }

    /// Let every enabled collector describe its metrics
    pub fn describe_all(&self, sink: &MetricSink) {
        for (_, collector, _) in self.enabled_collectors() {
            collector.describe(sink);
        }
    }

    /// Registered collector names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every collector's state, in registration order
    pub fn stats(&self) -> IndexMap<String, CollectorState> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| {
                let mut state = entry.state.clone();
                state.enabled = entry.collector.is_enabled();
                (name.clone(), state)
            })
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<CollectorState> {
        self.entries.read().get(name).map(|entry| {
            let mut state = entry.state.clone();
            state.enabled = entry.collector.is_enabled();
            state
        })
    }

    /// Ready when at least one enabled collector has fewer than
    /// `error_threshold` consecutive errors
    pub fn is_ready(&self, error_threshold: u32) -> bool {
        self.entries.read().values().any(|entry| {
            entry.collector.is_enabled() && entry.state.consecutive_errors < error_threshold
        })
    }

    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.diagnostics.register(registry)
    }

    fn enabled_collectors(&self) -> Vec<(String, Arc<dyn Collector>, Option<Duration>)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.collector.is_enabled())
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.collector), entry.timeout))
            .collect()
    }

    /// Run every enabled collector concurrently and merge their output into `sink`
    ///
    /// Each collector runs in its own task under a child of `ctx`, narrowed by
    /// its timeout. The pass returns once every collector has finished or `ctx`
    /// ends, whichever comes first; collectors still running are abandoned and
    /// recorded as timed out (or cancelled), and whatever they emit is
    /// discarded. A failing or panicking collector only affects its own state.
    ///
    /// Returns an error only when every enabled collector failed.
    pub async fn collect_all(&self, ctx: &CollectContext, sink: &MetricSink) -> Result<CollectionSummary> {
        let span = tracing::info_span!("collect_all");
        self.run_pass(ctx, sink).instrument(span).await
    }

    async fn run_pass(&self, ctx: &CollectContext, sink: &MetricSink) -> Result<CollectionSummary> {
        let started = Instant::now();
        let collectors = self.enabled_collectors();
        let mut summary = CollectionSummary {
            collectors: collectors.len(),
            ..CollectionSummary::default()
        };

        if collectors.is_empty() {
            tracing::debug!("No enabled collectors");
            self.diagnostics.observe_pass(started.elapsed(), 0);
            return Ok(summary);
        }

        // Scope for this pass; cancelling it releases every unit
        let pass = ctx.child();
        let mut pending: HashSet<String> = HashSet::with_capacity(collectors.len());
        let mut units = JoinSet::new();

        {
            let now = Utc::now();
            let mut entries = self.entries.write();
            for (name, _, _) in &collectors {
                if let Some(entry) = entries.get_mut(name) {
                    entry.state.last_collection_start = Some(now);
                }
            }
        }

        for (name, collector, timeout) in collectors {
            pending.insert(name.clone());
            let unit_ctx = pass.child_with_timeout(timeout);
            let limiter = self.limiter.clone();
            let span = tracing::debug_span!("collector", name = %name);
            units.spawn(run_unit(name, collector, unit_ctx, limiter).instrument(span));
        }

        let mut failures = Vec::new();
        let ended = loop {
            tokio::select! {
                biased;
                joined = units.join_next() => match joined {
                    Some(Ok(report)) => {
                        pending.remove(&report.name);
                        if let Some(failure) = self.apply(report, sink, &mut summary) {
                            failures.push(failure);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Collection task failed outside its collector");
                    }
                    None => break None,
                },
                reason = ctx.done() => break Some(reason),
            }
        };

        pass.cancel();
        units.abort_all();

        if !pending.is_empty() {
            let elapsed = started.elapsed();
            let mut names: Vec<String> = pending.into_iter().collect();
            names.sort();
            for name in names {
                let (status, error) = match ended {
                    Some(ContextError::DeadlineExceeded) => {
                        summary.timed_out += 1;
                        (
                            CollectionStatus::Timeout,
                            Error::collector_timeout(&name, elapsed),
                        )
                    }
                    Some(ContextError::Cancelled) => {
                        summary.failed += 1;
                        (
                            CollectionStatus::Error,
                            Error::cancelled(format!("collect {name}")),
                        )
                    }
                    // The task died without reporting
                    None => {
                        summary.panicked += 1;
                        (
                            CollectionStatus::Panic,
                            Error::collector_panic(&name, "collection task aborted"),
                        )
                    }
                };
                tracing::warn!(collector = %name, error = %error, "Collector abandoned");
                failures.push((name.clone(), error.to_string()));
                self.record(&name, |state| {
                    state.record_failure(Utc::now(), elapsed, status, error)
                });
            }
        }

        let elapsed = started.elapsed();
        self.diagnostics.observe_pass(elapsed, summary.collectors);
        tracing::info!(
            collectors = summary.collectors,
            succeeded = summary.succeeded,
            failures = summary.failures(),
            duration_ms = elapsed.as_millis() as u64,
            "Collection pass finished"
        );

        if summary.succeeded == 0 && failures.len() == summary.collectors {
            return Err(Error::AllCollectorsFailed { failures });
        }
        Ok(summary)
    }

    /// Record a unit's outcome and merge its output; returns the failure, if any
    fn apply(
        &self,
        report: UnitReport,
        sink: &MetricSink,
        summary: &mut CollectionSummary,
    ) -> Option<(String, String)> {
        let UnitReport {
            name,
            started_at,
            elapsed,
            outcome,
            sink: unit_sink,
        } = report;
        let end = Utc::now();

        let failure = match outcome {
            UnitOutcome::Success => {
                unit_sink.drain_into(sink);
                summary.succeeded += 1;
                tracing::debug!(collector = %name, duration_ms = elapsed.as_millis() as u64, "Collector succeeded");
                self.record(&name, |state| {
                    state.last_collection_start = Some(started_at);
                    state.record_success(end, elapsed);
                });
                return None;
            }
            UnitOutcome::Failed(error) => {
                // Values emitted before the error are still exported
                let status = if error.is_timeout() {
                    summary.timed_out += 1;
                    CollectionStatus::Timeout
                } else if unit_sink.sample_count() == 0 {
                    summary.failed += 1;
                    CollectionStatus::Error
                } else {
                    summary.partial += 1;
                    CollectionStatus::Partial
                };
                unit_sink.drain_into(sink);
                tracing::warn!(collector = %name, status = %status, error = %error, "Collector failed");
                (status, error)
            }
            UnitOutcome::Panicked(message) => {
                summary.panicked += 1;
                tracing::error!(collector = %name, panic = %message, "Collector panicked");
                (CollectionStatus::Panic, Error::collector_panic(&name, message))
            }
            UnitOutcome::Ended(ContextError::DeadlineExceeded) => {
                summary.timed_out += 1;
                let error = Error::collector_timeout(&name, elapsed);
                tracing::warn!(collector = %name, error = %error, "Collector timed out");
                (CollectionStatus::Timeout, error)
            }
            UnitOutcome::Ended(ContextError::Cancelled) => {
                summary.failed += 1;
                let error = Error::cancelled(format!("collect {name}"));
                tracing::warn!(collector = %name, "Collector cancelled");
                (CollectionStatus::Error, error)
            }
        };

        let (status, error) = failure;
        let message = error.to_string();
        self.record(&name, |state| {
            state.last_collection_start = Some(started_at);
            state.record_failure(end, elapsed, status, error);
        });
        Some((name, message))
    }

    fn record(&self, name: &str, update: impl FnOnce(&mut CollectorState)) {
        let snapshot = {
            let mut entries = self.entries.write();
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            update(&mut entry.state);
            entry.state.enabled = entry.collector.is_enabled();
            entry.state.clone()
        };
        self.diagnostics.observe_run(&snapshot);
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.names())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

async fn run_unit(
    name: String,
    collector: Arc<dyn Collector>,
    ctx: CollectContext,
    limiter: Option<Arc<Semaphore>>,
) -> UnitReport {
    let sink = MetricSink::new();
    let queued = Utc::now();

    let _permit = match limiter {
        Some(limiter) => match ctx.run(limiter.acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            // The semaphore is never closed
            Ok(Err(_)) => None,
            Err(reason) => {
                return UnitReport {
                    name,
                    started_at: queued,
                    elapsed: Duration::ZERO,
                    outcome: UnitOutcome::Ended(reason),
                    sink,
                };
            }
        },
        None => None,
    };

    let started_at = Utc::now();
    let start = Instant::now();
    let result = ctx
        .run(AssertUnwindSafe(collector.collect(&ctx, &sink)).catch_unwind())
        .await;

    let outcome = match result {
        Ok(Ok(Ok(()))) => UnitOutcome::Success,
        // A collector that gives up because its deadline passed timed out
        Ok(Ok(Err(_))) if ctx.err() == Some(ContextError::DeadlineExceeded) => {
            UnitOutcome::Ended(ContextError::DeadlineExceeded)
        }
        Ok(Ok(Err(error))) => UnitOutcome::Failed(error),
        Ok(Err(payload)) => UnitOutcome::Panicked(panic_message(payload.as_ref())),
        Err(reason) => UnitOutcome::Ended(reason),
    };

    UnitReport {
        name,
        started_at,
        elapsed: start.elapsed(),
        outcome,
        sink,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
