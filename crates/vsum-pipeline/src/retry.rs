//! Retry utilities with exponential backoff.
//!
//! Wraps calls to flaky collaborators (object store, remote service). A
//! caller-supplied predicate decides which errors are transient; anything
//! else is returned on the first occurrence.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::metrics::record_retry;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Delay after the first failure; doubles on each further failure.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Same policy under another operation name.
    pub fn named(&self, operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..self.clone()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not transient; returned without retrying.
    Rejected(E),
    /// Every attempt failed with a transient error.
    Exhausted {
        operation: String,
        attempts: u32,
        source: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Rejected(e) => e,
            RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Rejected(e) => write!(f, "{}", e),
            RetryError::Exhausted {
                operation,
                attempts,
                source,
            } => write!(f, "{} failed after {} attempts: {}", operation, attempts, source),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Rejected(e) => e.source(),
            RetryError::Exhausted { source, .. } => Some(source),
        }
    }
}

/// Execute an async operation, retrying transient failures.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new("publish").with_max_retries(3);
/// let url = retry_async(&config, PipelineError::is_transient, || async {
///     store.publish(&path, &name, ttl).await
/// })
/// .await?;
/// ```
pub async fn retry_async<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_transient: P,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    retry_async_with(config, is_transient, |_: &T| false, operation).await
}

/// Like [`retry_async`], but a successful value may also ask for a retry.
///
/// Used for services that answer with a success status but embed an error
/// code in the body. Such results count against `max_retries`; once the
/// budget is spent the last result is returned as-is and the caller decides
/// what to do with it.
pub async fn retry_async_with<F, Fut, T, E, P, R>(
    config: &RetryConfig,
    is_transient: P,
    should_retry_result: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    R: Fn(&T) -> bool,
    E: fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) if should_retry_result(&value) => {
                if attempt > config.max_retries {
                    warn!(
                        operation = %config.operation_name,
                        attempts = attempt,
                        "Retry budget spent, returning last result"
                    );
                    return Ok(value);
                }
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} returned a retryable result, retrying in {:?}",
                    config.operation_name, attempt, delay
                );
                record_retry(&config.operation_name);
                tokio::time::sleep(delay).await;
            }
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(RetryError::Rejected(e)),
            Err(e) if attempt > config.max_retries => {
                return Err(RetryError::Exhausted {
                    operation: config.operation_name.clone(),
                    attempts: attempt,
                    source: e,
                })
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %config.operation_name,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    e
                );
                record_retry(&config.operation_name);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
