//! Per-collector run bookkeeping

use chrono::{DateTime, Utc};
use rmx_core::Error;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a collector's most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    NeverRun,
    Success,
    /// Returned an error after emitting some values
    Partial,
    Error,
    Timeout,
    Panic,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::NeverRun => "never_run",
            CollectionStatus::Success => "success",
            CollectionStatus::Partial => "partial",
            CollectionStatus::Error => "error",
            CollectionStatus::Timeout => "timeout",
            CollectionStatus::Panic => "panic",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, CollectionStatus::NeverRun | CollectionStatus::Success)
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one registered collector
///
/// Created on registration and updated after every collection attempt.
/// Snapshots are cheap to clone; the last error is shared.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorState {
    pub name: String,
    pub enabled: bool,
    pub last_collection_start: Option<DateTime<Utc>>,
    pub last_collection_end: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<Arc<Error>>,
    #[serde(rename = "last_duration_seconds", serialize_with = "serialize_duration")]
    pub last_duration: Option<Duration>,
    pub consecutive_errors: u32,
    pub last_status: CollectionStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub total_errors: u64,
}

impl CollectorState {
    pub(crate) fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            last_collection_start: None,
            last_collection_end: None,
            last_error: None,
            last_duration: None,
            consecutive_errors: 0,
            last_status: CollectionStatus::NeverRun,
            last_success: None,
            total_runs: 0,
            total_errors: 0,
        }
    }

    pub(crate) fn record_success(&mut self, end: DateTime<Utc>, duration: Duration) {
        self.finish(end, duration, CollectionStatus::Success);
        self.consecutive_errors = 0;
        self.last_success = Some(end);
    }

    /// Record a failed run; `status` must be a failure status
    pub(crate) fn record_failure(
        &mut self,
        end: DateTime<Utc>,
        duration: Duration,
        status: CollectionStatus,
        error: Error,
    ) {
        debug_assert!(status.is_failure());
        self.finish(end, duration, status);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.total_errors += 1;
        self.last_error = Some(Arc::new(error));
    }

    fn finish(&mut self, end: DateTime<Utc>, duration: Duration, status: CollectionStatus) {
        self.last_collection_end = Some(end);
        self.last_duration = Some(duration);
        self.last_status = status;
        self.total_runs += 1;
    }

    /// Enabled and below `error_threshold` consecutive failures
    pub fn is_healthy(&self, error_threshold: u32) -> bool {
        self.enabled && self.consecutive_errors < error_threshold
    }
}

fn serialize_error<S: Serializer>(error: &Option<Arc<Error>>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => s.serialize_some(&error.to_string()),
        None => s.serialize_none(),
    }
}

fn serialize_duration<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => s.serialize_some(&duration.as_secs_f64()),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_accumulate_and_success_resets() {
        let mut state = CollectorState::new("nodes", true);
        let now = Utc::now();

        state.record_failure(
            now,
            Duration::from_millis(5),
            CollectionStatus::Error,
            Error::collection("nodes", "upstream unavailable"),
        );
        state.record_failure(
            now,
            Duration::from_millis(5),
            CollectionStatus::Timeout,
            Error::collector_timeout("nodes", Duration::from_secs(1)),
        );
        assert_eq!(state.consecutive_errors, 2);
        assert_eq!(state.last_status, CollectionStatus::Timeout);
        assert!(!state.is_healthy(2));

        state.record_success(now, Duration::from_millis(3));
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.total_runs, 3);
        assert_eq!(state.total_errors, 2);
        assert_eq!(state.last_success, Some(now));
        // The last error is kept for diagnosis after recovery
        assert!(state.last_error.is_some());
        assert!(state.is_healthy(2));
    }

    #[test]
    fn test_serializes_error_as_message() {
        let mut state = CollectorState::new("jobs", true);
        state.record_failure(
            Utc::now(),
            Duration::from_millis(1500),
            CollectionStatus::Error,
            Error::collection("jobs", "bad response"),
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["last_error"], "collector 'jobs' failed: bad response");
        assert_eq!(json["last_duration_seconds"], 1.5);
        assert_eq!(json["last_status"], "error");
    }
}
