//! Integration tests for concurrent collection

use async_trait::async_trait;
use prometheus::{IntGauge, IntGaugeVec, Opts};
use rmx_collector::{
    CollectionStatus, Collector, CollectorRegistry, RegistryOptions, Toggle,
};
use rmx_core::{CollectContext, Error, MetricSink, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Partial,
    EmptyThenFail,
    Panic,
    Hang,
    Sleep(Duration),
    Block(Duration),
}

struct TestCollector {
    name: String,
    behavior: Behavior,
    enabled: Toggle,
    calls: AtomicUsize,
    running: Option<Arc<(AtomicUsize, AtomicUsize)>>,
}

impl TestCollector {
    fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            enabled: Toggle::default(),
            calls: AtomicUsize::new(0),
            running: None,
        })
    }

    fn tracking(name: &str, behavior: Behavior, running: Arc<(AtomicUsize, AtomicUsize)>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            enabled: Toggle::default(),
            calls: AtomicUsize::new(0),
            running: Some(running),
        })
    }

    fn emit(&self, sink: &MetricSink) {
        let gauge = IntGauge::new(format!("{}_value", self.name), "test value").unwrap();
        gauge.set(1);
        sink.emit_collector(&gauge);
    }
}

#[async_trait]
impl Collector for TestCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self, _sink: &MetricSink) {}

    async fn collect(&self, _ctx: &CollectContext, sink: &MetricSink) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(running) = &self.running {
            let now = running.0.fetch_add(1, Ordering::SeqCst) + 1;
            running.1.fetch_max(now, Ordering::SeqCst);
        }

        let result = match self.behavior {
            Behavior::Succeed => {
                self.emit(sink);
                Ok(())
            }
            Behavior::Fail => Err(Error::collection(&self.name, "upstream unavailable")),
            Behavior::Partial => {
                self.emit(sink);
                Err(Error::collection(&self.name, "second page failed"))
            }
            Behavior::EmptyThenFail => {
                let by_state = IntGaugeVec::new(
                    Opts::new(format!("{}_by_state", self.name), "test"),
                    &["state"],
                )?;
                sink.emit_collector(&by_state);
                Err(Error::collection(&self.name, "no states returned"))
            }
            Behavior::Panic => panic!("boom"),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                self.emit(sink);
                Ok(())
            }
            Behavior::Block(duration) => {
                std::thread::sleep(duration);
                self.emit(sink);
                Ok(())
            }
        };

        if let Some(running) = &self.running {
            running.0.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

fn registry() -> CollectorRegistry {
    CollectorRegistry::new("rmx").unwrap()
}

fn family_names(sink: &MetricSink) -> Vec<String> {
    let mut names: Vec<String> = sink
        .take_families()
        .iter()
        .map(|f| f.get_name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failure_does_not_fail_the_pass() {
    let registry = registry();
    registry.register(TestCollector::new("a", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("b", Behavior::Fail)).unwrap();
    registry.register(TestCollector::new("c", Behavior::Succeed)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let sink = MetricSink::new();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let stats = registry.stats();
    assert!(stats["a"].last_error.is_none());
    assert!(stats["c"].last_error.is_none());
    assert!(stats["b"].last_error.is_some());
    assert_eq!(stats["b"].consecutive_errors, 1);
    assert_eq!(stats["b"].last_status, CollectionStatus::Error);
    assert!(stats["a"].last_collection_end.is_some());
    assert!(stats["a"].last_duration.is_some());

    assert_eq!(family_names(&sink), vec!["a_value", "c_value"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panic_is_isolated() {
    let registry = registry();
    registry.register(TestCollector::new("ok", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("bad", Behavior::Panic)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let sink = MetricSink::new();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert_eq!(summary.panicked, 1);
    let state = registry.state("bad").unwrap();
    assert_eq!(state.last_status, CollectionStatus::Panic);
    let error = state.last_error.unwrap();
    assert!(error.is_panic());
    assert!(error.to_string().contains("boom"));
    assert_eq!(registry.state("ok").unwrap().last_status, CollectionStatus::Success);
    assert_eq!(family_names(&sink), vec!["ok_value"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pass_returns_by_the_deadline() {
    let registry = registry();
    registry.register(TestCollector::new("fast", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("stuck", Behavior::Hang)).unwrap();
    registry
        .register(TestCollector::new("late", Behavior::Sleep(Duration::from_secs(2))))
        .unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_millis(100));
    let sink = MetricSink::new();
    let start = Instant::now();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.timed_out, 2);

    let stuck = registry.state("stuck").unwrap();
    assert_eq!(stuck.last_status, CollectionStatus::Timeout);
    assert!(stuck.last_error.unwrap().is_timeout());

    // Output of abandoned collectors is discarded
    assert_eq!(family_names(&sink), vec!["fast_value"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_collector_does_not_hold_the_pass() {
    let registry = registry();
    registry.register(TestCollector::new("fast", Behavior::Succeed)).unwrap();
    registry
        .register(TestCollector::new("blocking", Behavior::Block(Duration::from_millis(600))))
        .unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_millis(100));
    let sink = MetricSink::new();
    let start = Instant::now();
    registry.collect_all(&ctx, &sink).await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(
        registry.state("blocking").unwrap().last_status,
        CollectionStatus::Timeout
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_collector_timeout_narrows_deadline() {
    let registry = registry();
    registry.register(TestCollector::new("fast", Behavior::Succeed)).unwrap();
    registry
        .register_with_timeout(
            TestCollector::new("slow", Behavior::Sleep(Duration::from_secs(2))),
            Duration::from_millis(50),
        )
        .unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(10));
    let sink = MetricSink::new();
    let start = Instant::now();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.timed_out, 1);
    assert_eq!(registry.state("slow").unwrap().last_status, CollectionStatus::Timeout);
    assert_eq!(registry.state("fast").unwrap().last_status, CollectionStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_output_is_kept() {
    let registry = registry();
    registry.register(TestCollector::new("ok", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("half", Behavior::Partial)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let sink = MetricSink::new();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert_eq!(summary.partial, 1);
    let state = registry.state("half").unwrap();
    assert_eq!(state.last_status, CollectionStatus::Partial);
    assert_eq!(state.consecutive_errors, 1);
    assert_eq!(family_names(&sink), vec!["half_value", "ok_value"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_with_only_empty_families_is_an_error() {
    let registry = registry();
    registry.register(TestCollector::new("ok", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("bare", Behavior::EmptyThenFail)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let sink = MetricSink::new();
    let summary = registry.collect_all(&ctx, &sink).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.partial, 0);
    let state = registry.state("bare").unwrap();
    assert_eq!(state.last_status, CollectionStatus::Error);
    assert_eq!(state.consecutive_errors, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disabled_collectors_are_skipped() {
    let registry = registry();
    let enabled = TestCollector::new("on", Behavior::Succeed);
    let disabled = TestCollector::new("off", Behavior::Succeed);
    registry.register(enabled.clone()).unwrap();
    registry.register(disabled.clone()).unwrap();
    registry.set_enabled("off", false).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let summary = registry.collect_all(&ctx, &MetricSink::new()).await.unwrap();

    assert_eq!(summary.collectors, 1);
    assert_eq!(enabled.calls.load(Ordering::SeqCst), 1);
    assert_eq!(disabled.calls.load(Ordering::SeqCst), 0);
    assert_eq!(registry.state("off").unwrap().last_status, CollectionStatus::NeverRun);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_failed_is_an_aggregate_error() {
    let registry = registry();
    registry.register(TestCollector::new("x", Behavior::Fail)).unwrap();
    registry.register(TestCollector::new("y", Behavior::Panic)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let err = registry
        .collect_all(&ctx, &MetricSink::new())
        .await
        .unwrap_err();

    match err {
        Error::AllCollectorsFailed { failures } => {
            let mut names: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["x", "y"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_no_enabled_collectors_is_success() {
    let registry = registry();
    let ctx = CollectContext::with_timeout(Duration::from_secs(1));
    let summary = registry.collect_all(&ctx, &MetricSink::new()).await.unwrap();
    assert_eq!(summary.collectors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_is_respected() {
    let running = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));
    let registry = CollectorRegistry::with_options(
        "rmx",
        RegistryOptions {
            default_timeout: None,
            max_concurrency: 1,
        },
    )
    .unwrap();
    for name in ["a", "b", "c"] {
        registry
            .register(TestCollector::tracking(
                name,
                Behavior::Sleep(Duration::from_millis(30)),
                Arc::clone(&running),
            ))
            .unwrap();
    }

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    let summary = registry.collect_all(&ctx, &MetricSink::new()).await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(running.1.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelling_the_caller_ends_the_pass() {
    let registry = registry();
    registry.register(TestCollector::new("stuck", Behavior::Hang)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(30));
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = registry.collect_all(&ctx, &MetricSink::new()).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(result, Err(Error::AllCollectorsFailed { .. })));
    assert_eq!(registry.state("stuck").unwrap().last_status, CollectionStatus::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_consecutive_errors_drive_readiness() {
    let registry = registry();
    registry.register(TestCollector::new("flaky", Behavior::Fail)).unwrap();
    assert!(registry.is_ready(2));

    for _ in 0..2 {
        let ctx = CollectContext::with_timeout(Duration::from_secs(5));
        let _ = registry.collect_all(&ctx, &MetricSink::new()).await;
    }

    let state = registry.state("flaky").unwrap();
    assert_eq!(state.consecutive_errors, 2);
    assert_eq!(state.total_runs, 2);
    assert!(!registry.is_ready(2));
    assert!(registry.is_ready(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stats_are_readable_during_a_pass() {
    let registry = Arc::new(registry());
    registry
        .register(TestCollector::new("slow", Behavior::Sleep(Duration::from_millis(200))))
        .unwrap();

    let running = Arc::clone(&registry);
    let pass = tokio::spawn(async move {
        let ctx = CollectContext::with_timeout(Duration::from_secs(5));
        running.collect_all(&ctx, &MetricSink::new()).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let in_flight = registry.state("slow").unwrap();
    assert!(in_flight.last_collection_start.is_some());
    assert!(in_flight.last_collection_end.is_none());

    pass.await.unwrap().unwrap();
    assert_eq!(registry.state("slow").unwrap().last_status, CollectionStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diagnostics_are_exported() {
    let prom = prometheus::Registry::new();
    let registry = registry();
    registry.register_metrics(&prom).unwrap();
    registry.register(TestCollector::new("a", Behavior::Succeed)).unwrap();
    registry.register(TestCollector::new("b", Behavior::Fail)).unwrap();

    let ctx = CollectContext::with_timeout(Duration::from_secs(5));
    registry.collect_all(&ctx, &MetricSink::new()).await.unwrap();

    let families = prom.gather();
    let find = |name: &str| families.iter().find(|f| f.get_name() == name);

    let up = find("rmx_collector_up").unwrap();
    let value_for = |collector: &str| {
        up.get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.get_value() == collector))
            .map(|m| m.get_gauge().get_value())
    };
    assert_eq!(value_for("a"), Some(1.0));
    assert_eq!(value_for("b"), Some(0.0));

    let runs = find("rmx_collector_runs_total").unwrap();
    assert_eq!(runs.get_metric().len(), 2);
    assert!(find("rmx_collect_all_duration_seconds").is_some());
}
