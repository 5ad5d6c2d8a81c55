//! Exponential-backoff retry driven by an error classifier.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use ratsarchiv_shared::ErrorClass;
use tracing::{debug, warn};

/// Boxed future borrowing the retry target, as produced by `async_trait` methods.
pub type Attempt<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Up to `max_attempts` tries, sleeping `initial_delay * multiplier^(n-1)` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Decide whether attempt `attempt` (1-based) that failed with `class` gets another go.
    fn should_retry(&self, attempt: u32, class: ErrorClass) -> bool {
        class == ErrorClass::Retryable && attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut, C>(&self, classify: C, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let class = classify(&e);
                    if !self.should_retry(attempt, class) {
                        debug!(attempt, ?class, error = %e, "giving up");
                        return Err(e);
                    }
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`run`](Self::run), for operations that borrow `target` mutably on each attempt.
    pub async fn run_on<S, T, E, F, C>(&self, target: &mut S, classify: C, mut op: F) -> Result<T, E>
    where
        S: ?Sized,
        F: for<'a> FnMut(&'a mut S) -> Attempt<'a, T, E>,
        C: Fn(&E) -> ErrorClass,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(&mut *target).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let class = classify(&e);
                    if !self.should_retry(attempt, class) {
                        debug!(attempt, ?class, error = %e, "giving up");
                        return Err(e);
                    }
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
