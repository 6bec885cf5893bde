//! Bounded polling and retry.
//!
//! The original control logic was full of ad hoc `deadline = now + t`
//! sleep loops. They are collapsed into one combinator shared by the
//! locator, playback confirmation, and speed setting: an operation is
//! polled at a fixed interval until it yields a value, an attempt
//! timeout expires, or the attempt budget runs out.

use crate::error::{VatioError, VatioResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Retry policy: attempt budget, per-attempt timeout, poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of attempts before giving up
    pub max_attempts: u32,
    /// Wall-clock budget for a single attempt
    pub attempt_timeout: Duration,
    /// Pause between polls within an attempt
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt timeout.
    #[must_use]
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll `op` until it yields `Some`, the per-attempt timeout expires,
    /// or the attempt budget is exhausted. Exhaustion returns `Ok(None)`;
    /// callers decide whether that is fatal.
    ///
    /// Errors from `op` propagate immediately.
    pub async fn poll_until<T, F, Fut>(&self, mut op: F) -> VatioResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VatioResult<Option<T>>>,
    {
        for _ in 0..self.max_attempts {
            let deadline = Instant::now() + self.attempt_timeout;
            loop {
                if let Some(value) = op().await? {
                    return Ok(Some(value));
                }
                if Instant::now() + self.poll_interval > deadline {
                    break;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Ok(None)
    }

    /// Like [`poll_until`](Self::poll_until) but exhaustion is a
    /// [`VatioError::Timeout`] carrying the total budget.
    pub async fn require<T, F, Fut>(&self, op: F) -> VatioResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VatioResult<Option<T>>>,
    {
        match self.poll_until(op).await? {
            Some(value) => Ok(value),
            None => Err(VatioError::Timeout {
                ms: self.total_budget().as_millis() as u64,
            }),
        }
    }

    /// Total wall-clock budget across all attempts.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        self.attempt_timeout * self.max_attempts
    }
}
