//! Construction and ownership of the exporter's components

use rmx_cache::CacheManager;
use rmx_cardinality::CardinalityOptimizer;
use rmx_collector::{Collector, CollectorRegistry, ExporterCollector, RegistryOptions};
use rmx_config::Config;
use rmx_core::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything a running exporter owns
pub struct App {
    pub config: Arc<Config>,
    pub registry: Arc<CollectorRegistry>,
    pub caches: Arc<CacheManager<serde_json::Value>>,
    pub optimizer: Arc<CardinalityOptimizer>,
    /// Self-metrics: cache, cardinality and collector diagnostics
    pub metrics: prometheus::Registry,
    pub shutdown: CancellationToken,
}

impl App {
    /// Build every component from `config` and register the built-in collectors
    pub fn build(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let namespace = config.metrics.namespace.as_str();
        let metrics = prometheus::Registry::new();

        let registry = Arc::new(CollectorRegistry::with_options(
            namespace,
            RegistryOptions::from_config(&config.collectors),
        )?);
        registry.register_metrics(&metrics)?;

        let caches = Arc::new(CacheManager::from_config(namespace, &config.cache)?);
        caches.register_metrics(&metrics)?;

        let optimizer = Arc::new(CardinalityOptimizer::new(
            namespace,
            &config.metrics.cardinality,
        )?);
        optimizer.register_metrics(&metrics)?;

        let app = Self {
            registry,
            caches,
            optimizer: Arc::clone(&optimizer),
            metrics,
            shutdown,
            config: Arc::new(config),
        };

        let exporter =
            ExporterCollector::new(&app.config.metrics.namespace)?.with_optimizer(optimizer);
        app.register_collector(Arc::new(exporter))?;

        tracing::info!(
            collectors = app.registry.len(),
            stores = app.caches.store_names().len(),
            "Exporter initialised"
        );
        Ok(app)
    }

    /// Register a collector, applying any per-collector configuration
    pub fn register_collector(&self, collector: Arc<dyn Collector>) -> Result<()> {
        let name = collector.name().to_string();
        if let Some(enabled) = self.config.collectors.enabled_override(&name) {
            collector.set_enabled(enabled);
        }
        let timeout = self.config.collectors.timeout_for(&name);
        self.registry.register_with_timeout(collector, timeout)
    }

    /// Start the cache janitor and cardinality optimizer, when configured
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(interval) = self.config.cache.cleanup_interval() {
            tracing::debug!(interval_secs = interval.as_secs(), "Starting cache janitor");
            handles.push(
                self.caches
                    .spawn_janitor(interval, self.shutdown.child_token()),
            );
        }

        if let Some(interval) = self.config.metrics.cardinality.optimize_interval() {
            tracing::debug!(interval_secs = interval.as_secs(), "Starting cardinality optimizer");
            handles.push(
                self.optimizer
                    .spawn_optimizer(interval, self.shutdown.child_token()),
            );
        }

        handles
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("registry", &self.registry)
            .field("optimizer", &self.optimizer)
            .finish_non_exhaustive()
    }
}
