//! Bounded retries with exponential backoff.
//!
//! A [`RetryPolicy`] wraps a fallible operation and re-runs it while it
//! fails with a [`Retryable`] error, up to a fixed number of attempts. The
//! policy holds no mutable state: every call to [`RetryPolicy::run`] gets
//! its own attempt counter, so one policy can be shared by any number of
//! concurrent evaluations.

use crate::{config::Config, transport::TransportFailure};
use std::fmt;
use std::time::Duration;

/// Classifies errors as retryable or terminal.
///
/// # Examples
///
/// ```
/// use pdp_client::retry::Retryable;
///
/// #[derive(Debug)]
/// enum LookupError {
///     Unreachable,
///     Rejected,
/// }
///
/// impl Retryable for LookupError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, LookupError::Unreachable)
///     }
/// }
///
/// assert!(LookupError::Unreachable.is_retryable());
/// assert!(!LookupError::Rejected.is_retryable());
/// ```
pub trait Retryable {
    /// Returns `true` if another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportFailure {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// The result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Outcome<T, E> {
    /// The final success, or the error from the last attempt.
    pub result: Result<T, E>,
    /// How many times the operation was invoked.
    pub attempts: u32,
}

/// Exponential backoff over a fixed number of attempts.
///
/// The delay before attempt `n` (`n >= 2`) is
/// `min(backoff * 2^(n - 2), backoff * max_attempts + 1ms)`. The first
/// attempt runs immediately.
///
/// # Examples
///
/// ```
/// use pdp_client::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(4, Duration::from_millis(100));
///
/// assert_eq!(policy.delay_before_attempt(1), None);
/// assert_eq!(policy.delay_before_attempt(2), Some(Duration::from_millis(100)));
/// assert_eq!(policy.delay_before_attempt(3), Some(Duration::from_millis(200)));
/// assert_eq!(policy.delay_before_attempt(4), Some(Duration::from_millis(400)));
/// assert_eq!(policy.delay_before_attempt(5), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy. A `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Creates a policy from the retry settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_max_attempts, config.retry_backoff())
    }

    /// Returns the maximum number of attempts, always at least one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base backoff.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Returns the cap applied to every backoff delay.
    pub fn max_delay(&self) -> Duration {
        self.backoff
            .saturating_mul(self.max_attempts)
            .saturating_add(Duration::from_millis(1))
    }

    /// Returns the delay to wait before `attempt` (1-indexed), or `None`
    /// for the first attempt and for attempts beyond the limit.
    pub fn delay_before_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt < 2 || attempt > self.max_attempts {
            return None;
        }

        let multiplier = 2u32.checked_pow(attempt - 2).unwrap_or(u32::MAX);
        let delay = self.backoff.saturating_mul(multiplier);
        Some(delay.min(self.max_delay()))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt limit is reached.
    ///
    /// `operation` receives the 1-indexed attempt number. Backoff delays are
    /// slept on the calling thread.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdp_client::retry::RetryPolicy;
    /// use pdp_client::transport::{FailureKind, TransportFailure};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_millis(1));
    ///
    /// let outcome = policy.run(|attempt| {
    ///     if attempt < 3 {
    ///         Err(TransportFailure::new(FailureKind::ConnectionReset, "reset"))
    ///     } else {
    ///         Ok("allowed")
    ///     }
    /// });
    ///
    /// assert_eq!(outcome.attempts, 3);
    /// assert_eq!(outcome.result.unwrap(), "allowed");
    /// ```
    pub fn run<T, E, F>(&self, mut operation: F) -> Outcome<T, E>
    where
        E: Retryable + fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation(attempt) {
                Ok(value) => {
                    return Outcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(error) => error,
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                max_attempts = self.max_attempts,
                "Attempt failed"
            );

            if !error.is_retryable() {
                return Outcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            match self.delay_before_attempt(attempt + 1) {
                Some(delay) => {
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt,
                        "Retrying after backoff"
                    );
                    std::thread::sleep(delay);
                }
                None => {
                    return Outcome {
                        result: Err(error),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
