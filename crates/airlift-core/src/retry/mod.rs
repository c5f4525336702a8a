//! Retry execution engine with policy-based configuration
//!
//! A reusable loop-and-sleep executor for async operations. The policy
//! decides how many attempts to make and how long to wait between them, a
//! predicate decides whether a given error is worth another attempt, and an
//! observer receives callbacks for logging or counting.
//!
//! # Example
//!
//! ```rust,no_run
//! use airlift_core::retry::{RetryRunner, BackoffPolicy};
//!
//! async fn example() {
//!     let runner = RetryRunner::<std::io::Error>::new(BackoffPolicy::default());
//!
//!     let result = runner.run(|| async {
//!         // Your fallible operation here
//!         Ok::<_, std::io::Error>("success")
//!     }).await;
//! }
//! ```

mod executor;
mod observer;
mod policy;

pub use executor::{RetryError, RetryRunner};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use policy::{delay_for_attempt, BackoffPolicy, BackoffStrategy};

use std::error::Error;

/// A predicate that determines whether an error should be retried
///
/// By default all errors are retryable. Implement this to short-circuit
/// retries for known non-recoverable errors.
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// A predicate that always returns true (all errors are retryable)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate that uses a closure to determine retryability
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Retries only transient airlift errors (network and IO failures)
///
/// Configuration and update errors are permanent by taxonomy and fail fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientOnly;

impl RetryPredicate<crate::Error> for TransientOnly {
    fn should_retry(&self, error: &crate::Error) -> bool {
        error.is_transient()
    }
}

/// A predicate that retries on common transient error messages
#[derive(Debug, Clone)]
pub struct MessagePredicate {
    retryable_patterns: Vec<String>,
}

impl MessagePredicate {
    /// Create a new message predicate with the given patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            retryable_patterns: patterns,
        }
    }

    /// Create a predicate for common network errors
    pub fn network_errors() -> Self {
        Self::new(vec![
            "timeout".to_string(),
            "timed out".to_string(),
            "connection reset".to_string(),
            "connection refused".to_string(),
            "network unreachable".to_string(),
            "temporary failure".to_string(),
        ])
    }
}

impl<E: Error> RetryPredicate<E> for MessagePredicate {
    fn should_retry(&self, error: &E) -> bool {
        let error_msg = error.to_string().to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| error_msg.contains(&pattern.to_lowercase()))
    }
}
