//! Exponential backoff for transient API failures.
//!
//! Only errors classified as transient by [`LicenseKitError::is_retryable`]
//! (network failures, timeouts, 5xx, 429) are retried. Everything else is
//! returned on the first attempt.

use crate::LicenseKitError;
use std::time::Duration;

/// Retry behavior for the HTTP transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Zero disables retrying.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay, including server-requested ones.
    pub max_delay: Duration,

    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// Three retries: 500ms, 1s, 2s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            // `max_delay` near `Duration::MAX` rounds past what a Duration can hold.
            Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
        } else {
            Duration::ZERO
        }
    }

    /// How long to wait after `error` before retry number `attempt`, or
    /// `None` if the error should not be retried.
    pub fn delay_for(&self, error: &LicenseKitError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries || !error.is_retryable() {
            return None;
        }

        let backoff = self.backoff(attempt);
        let delay = match error {
            LicenseKitError::RateLimit(info) => match info.retry_after {
                Some(requested) => requested.max(backoff).min(self.max_delay),
                None => backoff,
            },
            _ => backoff,
        };
        Some(delay)
    }

    /// Run `op` until it succeeds, fails terminally, or retries run out.
    ///
    /// `sleep` is called between attempts.
    pub fn run<T, F, S>(&self, mut op: F, mut sleep: S) -> Result<T, LicenseKitError>
    where
        F: FnMut(u32) -> Result<T, LicenseKitError>,
        S: FnMut(Duration),
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => match self.delay_for(&error, attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            error = %error,
                            "request failed, retrying in {delay:?}"
                        );
                        sleep(delay);
                        attempt += 1;
                    }
                    None => return Err(error),
                },
            }
        }
    }
}
