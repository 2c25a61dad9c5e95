//! Retry with exponential backoff for classified failures.
//!
//! [`RetryPolicy`] wraps any zero-argument fallible async operation. Which
//! failures are worth another attempt is decided by a predicate, waiting goes
//! through a [`Sleeper`] and progress is reported to a [`RetryObserver`], so
//! nothing here depends on ambient global state.

use async_trait::async_trait;
use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ApiError, ErrorKind};

/// Maximum number of attempts (the first call included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Wait before the second attempt; doubled for every attempt after that.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Add up to half of `base_delay` on top of every wait.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Wait that follows the failed attempt `attempt` (0-indexed):
    /// `base_delay * 2^attempt`, plus jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);

        if self.jitter {
            delay.saturating_add(jitter(self.base_delay / 2))
        } else {
            delay
        }
    }
}

/// Pseudo-random duration in `[0, span)`.
fn jitter(span: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    span.mul_f64((nanos % 1000) as f64 / 1000.0)
}

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives retry progress. Attempt numbers are 1-based.
pub trait RetryObserver: Send + Sync {
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &dyn Display,
    );

    fn on_give_up(&self, operation: &str, attempts: u32, error: &dyn Display);

    fn on_fatal(&self, operation: &str, attempt: u32, error: &dyn Display);
}

/// Reports through the `log` facade.
pub struct LogObserver;

impl RetryObserver for LogObserver {
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &dyn Display,
    ) {
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {:?}...",
            operation, attempt, max_attempts, error, delay
        );
    }

    fn on_give_up(&self, operation: &str, attempts: u32, error: &dyn Display) {
        warn!(
            "{}: giving up after {} attempts: {}",
            operation, attempts, error
        );
    }

    fn on_fatal(&self, operation: &str, attempt: u32, error: &dyn Display) {
        debug!(
            "{}: non-retryable error on attempt {}: {}",
            operation, attempt, error
        );
    }
}

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

pub struct RetryPolicy<E> {
    config: RetryConfig,
    retryable: RetryPredicate<E>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn RetryObserver>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            retryable: Arc::clone(&self.retryable),
            sleeper: Arc::clone(&self.sleeper),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<E> RetryPolicy<E> {
    /// Creates a policy that retries every error for which `retryable` holds.
    pub fn new<P>(config: RetryConfig, retryable: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            retryable: Arc::new(retryable),
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` attempts have failed. The last error is returned
    /// unchanged.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.is_retryable(&error) {
                self.observer.on_fatal(operation_name, attempt + 1, &error);
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                self.observer
                    .on_give_up(operation_name, attempt + 1, &error);
                return Err(error);
            }

            let delay = self.config.delay_for_attempt(attempt);
            self.observer
                .on_retry(operation_name, attempt + 1, max_attempts, delay, &error);
            drop(error);

            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

impl RetryPolicy<ApiError> {
    /// Retries exactly the listed error kinds.
    pub fn for_kinds(config: RetryConfig, kinds: &[ErrorKind]) -> Self {
        let kinds = kinds.to_vec();
        Self::new(config, move |error: &ApiError| kinds.contains(&error.kind()))
    }
}
