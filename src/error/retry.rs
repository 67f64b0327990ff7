use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::ChatError;
use crate::models::cancellation::CancellationToken;

/// How often the backoff delay re-checks the cancellation flag.
const DELAY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Retry wrapper for transient failures: bounded attempts with exponential
/// backoff, a caller-supplied retry predicate, and a delay that aborts as
/// soon as the shared cancellation token is set.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given attempt (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// A failed attempt is retried only if `should_retry` approves the error
    /// and the token has not been cancelled; `on_retry` fires once per
    /// scheduled retry (attempt number, error that caused it). On
    /// exhaustion the last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        token: &CancellationToken,
        should_retry: impl Fn(&ChatError) -> bool,
        mut on_retry: impl FnMut(u32, &ChatError),
        mut f: F,
    ) -> Result<T, ChatError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChatError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }

            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    on_retry(attempt, &err);

                    if !delay_cancellable(delay, token).await {
                        debug!(operation = operation, "retry delay cancelled");
                        return Err(ChatError::Cancelled);
                    }
                }
            }
        }
    }
}

/// Sleep for `duration`, polling the token between short naps.
/// Returns false if cancellation was observed before the delay elapsed.
async fn delay_cancellable(duration: Duration, token: &CancellationToken) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if token.is_cancelled() {
            return false;
        }
        let nap = remaining.min(DELAY_POLL_INTERVAL);
        tokio::time::sleep(nap).await;
        remaining = remaining.saturating_sub(nap);
    }
    !token.is_cancelled()
}

/// Race an operation against a deadline, mapping elapse to a timeout error.
pub async fn with_timeout<T, Fut>(
    operation: &str,
    deadline: Duration,
    fut: Fut,
) -> Result<T, ChatError>
where
    Fut: Future<Output = Result<T, ChatError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout {
            message: format!("{} exceeded {:?}", operation, deadline),
        }),
    }
}
