//! Deadline-bearing, cancellable context handed to collectors.
//!
//! A [`CollectContext`] couples an absolute deadline with a
//! [`CancellationToken`]. Child contexts inherit the parent's deadline (or a
//! tighter one) and a child token, so cancelling a parent cancels every
//! context derived from it while a child can never outlive its parent.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The deadline passed
    DeadlineExceeded,
    /// The owner cancelled the context
    Cancelled,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::DeadlineExceeded => write!(f, "deadline exceeded"),
            ContextError::Cancelled => write!(f, "context cancelled"),
        }
    }
}

impl std::error::Error for ContextError {}

/// Context for one collection pass
#[derive(Debug, Clone)]
pub struct CollectContext {
    deadline: Instant,
    token: CancellationToken,
}

impl CollectContext {
    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            token: CancellationToken::new(),
        }
    }

    /// Derive a child sharing this context's deadline
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// Derive a child whose deadline is the earlier of the parent's and `now + timeout`
    pub fn child_with_timeout(&self, timeout: Option<Duration>) -> Self {
        let deadline = match timeout {
            Some(timeout) => self.deadline.min(Instant::now() + timeout),
            None => self.deadline,
        };
        Self {
            deadline,
            token: self.token.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// `None` while live, otherwise the reason it ended
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => ContextError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => ContextError::DeadlineExceeded,
        }
    }

    /// Drive `future` until it completes or the context ends
    pub async fn run<F>(&self, future: F) -> std::result::Result<F::Output, ContextError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }
}
