//! Bounded retry of transport calls.

use std::future::Future;
use std::time::Duration;

use fetchcache_core::TransportError;
use tracing::debug;

/// Retries failed attempts whose error kind is retryable, with a fixed delay.
///
/// Only name resolution failures qualify; everything else ends the loop
/// immediately. With `max_retries = n` the operation runs at most `n + 1`
/// times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

/// Result of [`RetryPolicy::run`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Result of the last attempt.
    pub result: Result<T, TransportError>,
    /// Retries performed, `0` when the first attempt was final.
    pub retries: u32,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. The closure receives the zero-based attempt
    /// number.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut retries = 0;
        loop {
            match attempt(retries).await {
                Err(error) if error.kind.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    debug!(
                        retry = retries,
                        max_retries = self.max_retries,
                        error = %error,
                        "Retrying transport call"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                result => return RetryOutcome { result, retries },
            }
        }
    }
}
