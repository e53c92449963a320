//! Builder methods for creating errors with context

use super::types::Error;
use std::path::PathBuf;
use std::time::Duration;

impl Error {
    /// Create a duplicate registration error
    #[must_use]
    pub fn duplicate_collector(name: impl Into<String>) -> Self {
        Error::DuplicateCollector { name: name.into() }
    }

    /// Create a collector-not-found error
    #[must_use]
    pub fn collector_not_found(name: impl Into<String>) -> Self {
        Error::CollectorNotFound { name: name.into() }
    }

    /// Create a collection failure for a collector
    #[must_use]
    pub fn collection(collector: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Collection {
            collector: collector.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a collection failure with an underlying source error
    #[must_use]
    pub fn collection_with_source(
        collector: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Collection {
            collector: collector.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a collector timeout error
    #[must_use]
    pub fn collector_timeout(collector: impl Into<String>, elapsed: Duration) -> Self {
        Error::CollectorTimeout {
            collector: collector.into(),
            elapsed,
        }
    }

    /// Create a collector panic error
    #[must_use]
    pub fn collector_panic(collector: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CollectorPanic {
            collector: collector.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a metrics error for a named operation
    #[must_use]
    pub fn metrics(operation: impl Into<String>, source: prometheus::Error) -> Self {
        Error::Metrics {
            operation: operation.into(),
            source,
        }
    }

    /// Create a server error
    #[must_use]
    pub fn server(address: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Server {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a collector running out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CollectorTimeout { .. })
    }

    /// Whether this error represents a collector panic
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::CollectorPanic { .. })
    }
}
