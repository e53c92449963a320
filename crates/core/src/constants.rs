/// Constants used throughout the rmx codebase

// Metric naming
pub const DEFAULT_NAMESPACE: &str = "rmx";

// Environment variables
pub const RMX_ENV_PREFIX: &str = "RMX_";
pub const RMX_CONFIG_VAR: &str = "RMX_CONFIG";

// Configuration file
pub const CONFIG_DIR_NAME: &str = "rmx";
pub const CONFIG_FILE_NAME: &str = "config.json";

// Server defaults
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9341";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_SCRAPE_TIMEOUT_MS: u64 = 30_000;

// Collector defaults
pub const DEFAULT_COLLECTOR_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

// Cardinality defaults
pub const DEFAULT_MAX_SERIES: usize = 10_000;
pub const DEFAULT_WARN_LIMIT: usize = 8_000;
pub const DEFAULT_MAX_LABELS: usize = 100;
pub const DEFAULT_MAX_LABEL_SIZE: usize = 1024;
pub const DEFAULT_RESET_THRESHOLD: usize = 100_000;
pub const DEFAULT_MIN_SAMPLE_RATE: f64 = 0.01;
pub const DEFAULT_TOP_METRICS: usize = 10;
