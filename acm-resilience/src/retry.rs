//! Retry logic with exponential backoff and full jitter (spec.md §7).
//!
//! Distinct from the subprocess runner's retry loop in `acm-generators`
//! (which sits above a hard kill boundary per spec.md §4.7): this module is
//! the general-purpose executor used for judge calls and any other
//! retryable operation that classifies its own errors via `ErrorKind`.

use acm_contracts::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry configuration. Defaults match spec.md §7: exponential backoff with
/// full jitter, starting at 1–5s, capped at 30–300s, 3 attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Errors produced by the retry executor itself, distinct from the
/// operation's own error type.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempt(s)")]
    Exhausted { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Decides whether a given error classification should be retried. The
/// default implementation defers to `ErrorKind::is_retryable`.
pub trait RetryClassifier<E> {
    fn classify(&self, error: &E) -> ErrorKind;

    fn should_retry(&self, attempt: u32, max_attempts: u32, error: &E) -> bool {
        attempt < max_attempts && self.classify(error).is_retryable()
    }
}

/// Executes an async operation with full-jitter exponential backoff,
/// retrying only while `classifier` says the error is retryable.
pub struct RetryExecutor<E, C: RetryClassifier<E>> {
    config: RetryConfig,
    classifier: C,
    _marker: std::marker::PhantomData<E>,
}

impl<E, C: RetryClassifier<E>> RetryExecutor<E, C> {
    pub fn new(config: RetryConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` up to `max_attempts` times, sleeping with full
    /// jitter between attempts. `operation` is re-invoked from scratch on
    /// each attempt (no partial state carried across attempts).
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self
                        .classifier
                        .should_retry(attempt, self.config.max_attempts, &error)
                    {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                    let delay = self.full_jitter_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Full jitter: `sleep(random(0, min(max_delay, base * mult^(attempt-1))))`.
    fn full_jitter_delay(&self, attempt: u32) -> Duration {
        full_jitter_delay(&self.config, attempt)
    }
}

/// Full-jitter exponential backoff delay for a given attempt (1-indexed),
/// shared with the subprocess runner's above-the-kill-boundary retry loop
/// (spec.md §4.7), which needs the same formula without the rest of
/// `RetryExecutor`'s single-shot-operation framing.
pub fn full_jitter_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base =
        config.initial_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32 - 1);
    let capped = base.min(config.max_delay_ms as f64);
    let jittered = rand::thread_rng().gen_range(0.0..=capped);
    Duration::from_millis(jittered.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysRetryable;
    impl RetryClassifier<&'static str> for AlwaysRetryable {
        fn classify(&self, _error: &&'static str) -> ErrorKind {
            ErrorKind::NetworkError
        }
    }

    struct NeverRetryable;
    impl RetryClassifier<&'static str> for NeverRetryable {
        fn classify(&self, _error: &&'static str) -> ErrorKind {
            ErrorKind::AuthError
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let executor = RetryExecutor::new(RetryConfig::default(), AlwaysRetryable);
        let result: Result<i32, RetryError<&'static str>> =
            executor.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        };
        let executor = RetryExecutor::new(config, AlwaysRetryable);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts2 = attempts.clone();

        let result = executor
            .execute(move || {
                let attempts = attempts2.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let executor = RetryExecutor::new(RetryConfig::default(), NeverRetryable);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let result: Result<i32, _> = executor
            .execute(move || {
                let attempts = attempts2.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent")
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let executor = RetryExecutor::new(config, AlwaysRetryable);
        let result: Result<i32, _> = executor.execute(|| async { Err("nope") }).await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            Ok(_) => panic!("expected exhaustion"),
        }
    }
}
