//! Bounded retries for calls made outside the controller's requeue loop
//!
//! Reconcilers normally surface errors and let the controller requeue them.
//! Two things retry in place instead: read-modify-write updates that lose an
//! optimistic-concurrency race ([`retry_on_conflict`]), and startup calls made
//! before any controller runs ([`retry_with_backoff`]).
//!
//! ```ignore
//! use berth_common::retry::retry_on_conflict;
//!
//! retry_on_conflict("update_statefulset", || async {
//!     let current = client.get(ns, name).await?;
//!     client.update(&mutate(current)).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use crate::Error;

/// Attempts made for a conflicting update before giving up
pub const CONFLICT_ATTEMPTS: u32 = 5;

/// Pause between conflicting update attempts
pub const CONFLICT_DELAY: Duration = Duration::from_millis(10);

/// How often and how patiently an operation is retried
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Attempts before the last error is returned; 0 retries forever
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Randomize each delay between half and one and a half times its value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default schedule capped at `attempts`
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Fixed, short schedule for optimistic-concurrency conflicts
    pub fn conflict() -> Self {
        Self {
            max_attempts: CONFLICT_ATTEMPTS,
            initial_delay: CONFLICT_DELAY,
            max_delay: CONFLICT_DELAY,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            current: self.initial_delay,
        }
    }
}

/// Delays between attempts, growing geometrically up to `max_delay`
struct Backoff<'a> {
    config: &'a RetryConfig,
    current: Duration,
}

impl Backoff<'_> {
    fn next_delay(&mut self) -> Duration {
        let delay = if self.config.jitter {
            self.current.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
        } else {
            self.current
        };
        self.current = self
            .current
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);
        delay
    }
}

/// Retry `operation` on any error until it succeeds or attempts run out
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_when(config, operation_name, |_| true, operation).await
}

/// Retry `operation` while `retryable` accepts its error
///
/// The first rejected error is returned as is.
pub async fn retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut backoff = config.backoff();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable(&err) {
            debug!(operation = %operation_name, attempt, error = %err, "not retrying");
            return Err(err);
        }
        if config.exhausted(attempt) {
            error!(operation = %operation_name, attempt, error = %err, "giving up");
            return Err(err);
        }

        let delay = backoff.next_delay();
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Re-run a read-modify-write operation while it hits 409 Conflict
///
/// The operation must re-read the object on every attempt; anything other
/// than a conflict is returned immediately.
pub async fn retry_on_conflict<F, Fut, T>(operation_name: &str, operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    retry_when(
        &RetryConfig::conflict(),
        operation_name,
        Error::is_conflict,
        operation,
    )
    .await
}
