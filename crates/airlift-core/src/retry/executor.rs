//! Retry execution engine

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use super::observer::{NoOpObserver, RetryObserver};
use super::policy::{delay_for_attempt, BackoffPolicy};
use super::{AlwaysRetry, RetryPredicate};

/// Errors that can occur during retry execution
///
/// Generic over `E`, the underlying error type from the retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// All attempts have been exhausted
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Total duration spent across all attempts
        total_duration: Duration,
    },

    /// The predicate determined the error should not be retried
    NonRetryable(E),

    /// The retry loop never ran an attempt (max_attempts of zero)
    Aborted,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => {
                write!(
                    f,
                    "retry exhausted after {} attempts over {:.2}s: {}",
                    attempts,
                    total_duration.as_secs_f64(),
                    source
                )
            }
            RetryError::NonRetryable(source) => {
                write!(f, "non-retryable error: {}", source)
            }
            RetryError::Aborted => write!(f, "retry aborted before any attempt"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for RetryError<E> {}

impl<E> RetryError<E> {
    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable(_) => 1,
            RetryError::Aborted => 0,
        }
    }

    /// Check if this error indicates all retries were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error is non-retryable
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable(_))
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable(source) => Some(source),
            RetryError::Aborted => None,
        }
    }
}

/// A retry runner with configurable policy, predicate, and observer
///
/// ```rust,no_run
/// use airlift_core::retry::{RetryRunner, BackoffPolicy, TracingObserver};
///
/// let runner = RetryRunner::<std::io::Error>::new(BackoffPolicy::default())
///     .with_observer(TracingObserver::new("download"))
///     .with_jitter(false);
/// ```
pub struct RetryRunner<E, P = AlwaysRetry, O = NoOpObserver> {
    policy: BackoffPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    _phantom: PhantomData<E>,
}

impl<E> RetryRunner<E, AlwaysRetry, NoOpObserver> {
    /// Create a new runner with default predicate and observer
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
            _phantom: PhantomData,
        }
    }
}

impl<E, P, O> RetryRunner<E, P, O> {
    /// Set the retry predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryRunner<E, P2, O> {
        RetryRunner {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
            _phantom: PhantomData,
        }
    }

    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryRunner<E, P, O2> {
        RetryRunner {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
            _phantom: PhantomData,
        }
    }

    /// Enable or disable jitter (enabled by default)
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl<E, P, O> RetryRunner<E, P, O>
where
    E: fmt::Display + Send + 'static,
    P: RetryPredicate<E>,
    O: RetryObserver,
{
    /// Execute an operation with retry logic
    ///
    /// Returns the operation's result, or a `RetryError` when the predicate
    /// rejects the error or all attempts are spent.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();

        for attempt in 1..=self.policy.max_attempts {
            self.observer
                .on_attempt_start(attempt, self.policy.max_attempts);

            match op().await {
                Ok(result) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(result);
                }
                Err(err) => {
                    if !self.predicate.should_retry(&err) {
                        self.observer.on_non_retryable(attempt, &err.to_string());
                        return Err(RetryError::NonRetryable(err));
                    }

                    if attempt >= self.policy.max_attempts {
                        self.observer.on_exhausted(attempt, &err.to_string());
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: err,
                            total_duration: start.elapsed(),
                        });
                    }

                    let delay = delay_for_attempt(&self.policy, attempt, self.jitter);
                    self.observer
                        .on_attempt_failed(attempt, &err.to_string(), delay);

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(RetryError::Aborted)
    }
}
