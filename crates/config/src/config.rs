//! Configuration model for rmx
//!
//! Every section deserializes with `#[serde(default)]`, so a configuration file
//! only needs to name the values it changes. Durations are expressed as integer
//! milliseconds or seconds, with the unit in the field name.

use rmx_core::{
    Error, Result, DEFAULT_COLLECTOR_TIMEOUT_MS, DEFAULT_ERROR_THRESHOLD, DEFAULT_LISTEN_ADDRESS,
    DEFAULT_MAX_LABELS, DEFAULT_MAX_LABEL_SIZE, DEFAULT_MAX_SERIES, DEFAULT_METRICS_PATH, DEFAULT_MIN_SAMPLE_RATE, DEFAULT_NAMESPACE,
    DEFAULT_RESET_THRESHOLD, DEFAULT_SCRAPE_TIMEOUT_MS, DEFAULT_TOP_METRICS, DEFAULT_WARN_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub collectors: CollectorsConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP exposition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub address: String,
    /// Path serving the metrics exposition
    pub metrics_path: String,
    /// Deadline for one scrape, across all collectors
    pub scrape_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            scrape_timeout_ms: DEFAULT_SCRAPE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.scrape_timeout_ms)
    }
}

/// Collector orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// Per-collector timeout applied when no override is present
    pub default_timeout_ms: u64,
    /// Maximum collectors running at once; 0 means one task per collector
    pub max_concurrency: usize,
    /// Consecutive failures after which a collector no longer counts towards readiness
    pub error_threshold: u32,
    /// Per-collector overrides keyed by collector name
    pub overrides: BTreeMap<String, CollectorOverride>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_COLLECTOR_TIMEOUT_MS,
            max_concurrency: 0,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            overrides: BTreeMap::new(),
        }
    }
}

impl CollectorsConfig {
    /// Effective timeout for the named collector
    pub fn timeout_for(&self, name: &str) -> Duration {
        let millis = self
            .overrides
            .get(name)
            .and_then(|o| o.timeout_ms)
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(millis)
    }

    /// Explicit enabled flag for the named collector, if configured
    pub fn enabled_override(&self, name: &str) -> Option<bool> {
        self.overrides.get(name).and_then(|o| o.enabled)
    }
}

/// Settings for a single collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOverride {
    pub enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval of the eager expiry sweep; 0 keeps expiry purely lazy
    pub cleanup_interval_secs: u64,
    /// Stores created at startup
    pub stores: Vec<StoreConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 0,
            stores: vec![StoreConfig::default()],
        }
    }
}

impl CacheConfig {
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

/// One named cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub max_entries: usize,
    pub default_ttl_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "upstream".to_string(),
            max_entries: 1024,
            default_ttl_ms: 30_000,
        }
    }
}

impl StoreConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

/// Metric naming and cardinality settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix for every metric the exporter itself produces
    pub namespace: String,
    pub cardinality: CardinalityConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cardinality: CardinalityConfig::default(),
        }
    }
}

/// Cardinality control settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    /// Ceiling on distinct series before sampling or rejection
    pub max_series: usize,
    /// Series count that triggers a warning during maintenance
    pub warn_limit: usize,
    /// Most labels one observation may carry; 0 means unlimited
    pub max_labels: usize,
    /// Longest label value in bytes; 0 means unlimited
    pub max_label_size: usize,
    /// Initial admission probability at the ceiling; 1.0 disables sampling
    pub sample_rate: f64,
    /// Floor for the adaptive sample rate
    pub min_sample_rate: f64,
    /// Tracked series count above which maintenance forgets every series
    pub reset_threshold: usize,
    /// Number of metrics reported by cardinality statistics
    pub top_n: usize,
    /// Interval of the maintenance pass; 0 disables it
    pub optimize_interval_secs: u64,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            max_series: DEFAULT_MAX_SERIES,
            warn_limit: DEFAULT_WARN_LIMIT,
            max_labels: DEFAULT_MAX_LABELS,
            max_label_size: DEFAULT_MAX_LABEL_SIZE,
            sample_rate: 1.0,
            min_sample_rate: DEFAULT_MIN_SAMPLE_RATE,
            reset_threshold: DEFAULT_RESET_THRESHOLD,
            top_n: DEFAULT_TOP_METRICS,
            optimize_interval_secs: 60,
        }
    }
}

impl CardinalityConfig {
    pub fn optimize_interval(&self) -> Option<Duration> {
        (self.optimize_interval_secs > 0).then(|| Duration::from_secs(self.optimize_interval_secs))
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::configuration(format!(
                "unknown log format '{other}', expected 'text' or 'json'"
            ))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

// Routes the HTTP server registers besides the metrics path
const RESERVED_PATHS: &[&str] = &["/", "/health", "/ready", "/stats"];

impl Config {
    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.collectors.validate()?;
        self.cache.validate()?;
        self.metrics.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::configuration("server.address must not be empty"));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(Error::configuration(format!(
                "server.metrics_path '{}' must start with '/'",
                self.metrics_path
            )));
        }
        if RESERVED_PATHS.contains(&self.metrics_path.as_str()) {
            return Err(Error::configuration(format!(
                "server.metrics_path '{}' is already served by the exporter",
                self.metrics_path
            )));
        }
        if self.scrape_timeout_ms == 0 {
            return Err(Error::configuration(
                "server.scrape_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}

impl CollectorsConfig {
    fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == 0 {
            return Err(Error::configuration(
                "collectors.default_timeout_ms must be positive",
            ));
        }
        if self.error_threshold == 0 {
            return Err(Error::configuration(
                "collectors.error_threshold must be positive",
            ));
        }
        for (name, o) in &self.overrides {
            if o.timeout_ms == Some(0) {
                return Err(Error::configuration(format!(
                    "collectors.overrides.{name}.timeout_ms must be positive"
                )));
            }
        }
        Ok(())
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(Error::configuration("cache store name must not be empty"));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(Error::configuration(format!(
                    "cache store '{}' is defined more than once",
                    store.name
                )));
            }
            if store.default_ttl_ms == 0 {
                return Err(Error::configuration(format!(
                    "cache store '{}' default_ttl_ms must be positive",
                    store.name
                )));
            }
        }
        Ok(())
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<()> {
        let valid_namespace = !self.namespace.is_empty()
            && self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.namespace.starts_with(|c: char| c.is_ascii_digit());
        if !valid_namespace {
            return Err(Error::configuration(format!(
                "metrics.namespace '{}' is not a valid metric name prefix",
                self.namespace
            )));
        }
        self.cardinality.validate()
    }
}

impl CardinalityConfig {
    fn validate(&self) -> Result<()> {
        if self.max_series == 0 {
            return Err(Error::configuration(
                "cardinality.max_series must be positive",
            ));
        }
        if self.warn_limit > self.max_series {
            return Err(Error::configuration(
                "cardinality.warn_limit cannot be greater than max_series",
            ));
        }
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(Error::configuration(format!(
                "cardinality.sample_rate {} must be in (0, 1]",
                self.sample_rate
            )));
        }
        if !(self.min_sample_rate > 0.0 && self.min_sample_rate <= self.sample_rate) {
            return Err(Error::configuration(format!(
                "cardinality.min_sample_rate {} must be in (0, sample_rate]",
                self.min_sample_rate
            )));
        }
        if self.reset_threshold == 0 {
            return Err(Error::configuration(
                "cardinality.reset_threshold must be positive",
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        // Bare levels only; richer directives belong in RUST_LOG.
        let level = self.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::configuration(format!(
                "logging.level '{}' must be one of {}",
                self.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}
