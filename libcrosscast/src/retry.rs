//! Bounded exponential backoff
//!
//! Two flavours: [`RetryPolicy::retry`] repeats a call while it fails with a
//! transient error (a timeout), and [`RetryPolicy::poll`] repeats a status
//! check while the remote side reports "not ready yet".

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{CrosscastError, PlatformError, Result};

/// Attempts for calls that may time out
pub const NETWORK_MAX_ATTEMPTS: u32 = 7;

/// Attempts for media processing polls; transcoding time is unpredictable
pub const MEDIA_POLL_MAX_ATTEMPTS: u32 = 42;

/// Check if an error is transient and should be retried
///
/// Only timeouts qualify. Authentication failures, API errors and everything
/// else propagate on the first occurrence.
pub fn is_transient_error(error: &CrosscastError) -> bool {
    matches!(error, CrosscastError::Platform(PlatformError::Timeout(_)))
}

/// Answer of a single readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
}

/// Final answer of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::network()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn network() -> Self {
        Self::new(NETWORK_MAX_ATTEMPTS, Duration::from_millis(500))
    }

    pub fn media_polling() -> Self {
        Self::new(MEDIA_POLL_MAX_ATTEMPTS, Duration::from_millis(500))
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay after the given (1-based) failed attempt: base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of
    /// attempts; in the last case the final transient error is returned
    pub async fn retry<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if is_transient_error(&e) && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Transient error in {} (attempt {}/{}): {}. Retrying in {:?}...",
                        what, attempt, self.max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if is_transient_error(&e) {
                        warn!("{} failed after {} attempts: {}", what, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Call `check` until it reports [`PollStatus::Ready`] or attempts run
    /// out; errors from `check` stop the loop immediately
    pub async fn poll<T, F, Fut>(&self, what: &str, mut check: F) -> Result<PollOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>>>,
    {
        for attempt in 1..=self.max_attempts {
            match check().await? {
                PollStatus::Ready(value) => return Ok(PollOutcome::Ready(value)),
                PollStatus::Pending if attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "{} not ready (attempt {}/{}), checking again in {:?}",
                        what, attempt, self.max_attempts, delay
                    );
                    sleep(delay).await;
                }
                PollStatus::Pending => {}
            }
        }

        warn!("{} still not ready after {} attempts", what, self.max_attempts);
        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
