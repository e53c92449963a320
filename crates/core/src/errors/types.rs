use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for rmx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rmx operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A collector with the same name is already registered
    #[error("collector '{name}' is already registered")]
    DuplicateCollector { name: String },

    /// No collector is registered under this name
    #[error("collector '{name}' is not registered")]
    CollectorNotFound { name: String },

    /// A collector returned an error from its collection pass
    #[error("collector '{collector}' failed: {message}")]
    Collection {
        collector: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A collector did not finish before its deadline
    #[error("collector '{collector}' timed out after {elapsed:?}")]
    CollectorTimeout { collector: String, elapsed: Duration },

    /// A collector panicked while collecting
    #[error("collector '{collector}' panicked: {message}")]
    CollectorPanic { collector: String, message: String },

    /// The collection context was cancelled by its owner
    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// Every enabled collector failed during one pass
    #[error("all {} enabled collectors failed: {}", .failures.len(), format_failures(.failures))]
    AllCollectorsFailed { failures: Vec<(String, String)> },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Prometheus metric construction or registration errors
    #[error("metrics error in {operation}: {source}")]
    Metrics {
        operation: String,
        #[source]
        source: prometheus::Error,
    },

    /// HTTP server errors
    #[error("server error on '{address}': {message}")]
    Server { address: String, message: String },
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, message)| format!("{name}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(error: prometheus::Error) -> Self {
        Error::Metrics {
            operation: "unknown".to_string(),
            source: error,
        }
    }
}
