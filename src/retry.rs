//! Retry logic with exponential backoff
//!
//! This module wraps remote calls with bounded retry for transient failures.
//! It implements exponential backoff with optional jitter, honors
//! server-supplied retry-after hints, and can be interrupted between attempts
//! by a cancellation token.
//!
//! # Example
//!
//! ```no_run
//! use review_batch::retry::{IsRetryable, RetryPolicy};
//! use review_batch::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(RetryConfig::default());
//! let result = policy.execute(|| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await;
//! assert_eq!(result.map(|done| done.attempts).ok(), Some(1));
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, RemoteError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (rate limiting, timeouts, server faults, connection
/// drops) should return `true`. Permanent failures (not found, permission
/// denied, rejected input) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Minimum wait before the next attempt, if the server asked for one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for RemoteError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_transient(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // gh reports its own network trouble on stderr
            Error::ExternalTool(msg) => msg.contains("timeout") || msg.contains("temporary"),
            Error::Config { .. }
            | Error::InvalidIdentifier { .. }
            | Error::UnsupportedIdentifierKind { .. }
            | Error::InvalidInput { .. }
            | Error::Serialization(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Remote(e) => e.retry_after,
            _ => None,
        }
    }
}

/// A successful result together with the number of attempts it took
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempted<T> {
    /// The value returned by the successful attempt
    pub value: T,
    /// Total attempts made, including the successful one
    pub attempts: u32,
}

/// Why the retry loop gave up
#[derive(Clone, Debug, PartialEq)]
pub enum RetryFailure<E> {
    /// The error was permanent; no retry was attempted
    Permanent {
        /// The error returned by the last attempt
        error: E,
        /// Attempts made
        attempts: u32,
    },
    /// Every allowed attempt failed with a transient error
    Exhausted {
        /// The error returned by the last attempt
        error: E,
        /// Attempts made
        attempts: u32,
    },
    /// Cancellation arrived while waiting to retry
    Cancelled {
        /// The error returned by the last attempt
        error: E,
        /// Attempts made
        attempts: u32,
    },
}

impl<E> RetryFailure<E> {
    /// The error returned by the last attempt
    pub fn error(&self) -> &E {
        match self {
            RetryFailure::Permanent { error, .. }
            | RetryFailure::Exhausted { error, .. }
            | RetryFailure::Cancelled { error, .. } => error,
        }
    }

    /// Consume the failure, keeping the last error
    pub fn into_error(self) -> E {
        match self {
            RetryFailure::Permanent { error, .. }
            | RetryFailure::Exhausted { error, .. }
            | RetryFailure::Cancelled { error, .. } => error,
        }
    }

    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Permanent { attempts, .. }
            | RetryFailure::Exhausted { attempts, .. }
            | RetryFailure::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Add attempts spent on earlier calls of the same logical step
    pub fn with_prior_attempts(self, prior: u32) -> Self {
        match self {
            RetryFailure::Permanent { error, attempts } => RetryFailure::Permanent {
                error,
                attempts: attempts + prior,
            },
            RetryFailure::Exhausted { error, attempts } => RetryFailure::Exhausted {
                error,
                attempts: attempts + prior,
            },
            RetryFailure::Cancelled { error, attempts } => RetryFailure::Cancelled {
                error,
                attempts: attempts + prior,
            },
        }
    }

    /// Whether the loop gave up after retrying a transient error
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryFailure::Exhausted { .. })
    }

    /// Whether the loop was interrupted by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryFailure::Cancelled { .. })
    }
}

/// Retry policy built from a [`RetryConfig`]
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy runs with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an async operation with exponential backoff retry logic
    ///
    /// The operation is attempted at most `max_attempts` times in total.
    /// Permanent errors are returned after the first attempt.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<Attempted<T>, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        self.run(None, operation).await
    }

    /// Like [`execute`](Self::execute), but a cancelled token interrupts the
    /// wait between attempts
    ///
    /// An attempt already in flight is never interrupted.
    pub async fn execute_cancellable<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<Attempted<T>, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        self.run(Some(cancel), operation).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<Attempted<T>, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        let config = &self.config;
        let max_attempts = config.max_attempts.max(1);
        let mut attempt = 0;
        let mut delay = config.initial_delay;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(error = %e, attempts = attempt, "Operation failed with non-retryable error");
                    return Err(RetryFailure::Permanent {
                        error: e,
                        attempts: attempt,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(RetryFailure::Exhausted {
                        error: e,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let backoff = if config.jitter {
                        add_jitter(delay).min(config.max_delay)
                    } else {
                        delay
                    };
                    let wait = match e.retry_after() {
                        Some(hint) => backoff.max(hint),
                        None => backoff,
                    };

                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = wait.as_millis(),
                        "Operation failed, retrying"
                    );

                    if let Some(cancel) = cancel {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                tracing::debug!(attempts = attempt, "Retry wait interrupted by cancellation");
                                return Err(RetryFailure::Cancelled {
                                    error: e,
                                    attempts: attempt,
                                });
                            }
                            _ = tokio::time::sleep(wait) => {}
                        }
                    } else {
                        tokio::time::sleep(wait).await;
                    }

                    let next_delay =
                        Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                    delay = next_delay.min(config.max_delay);
                }
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
