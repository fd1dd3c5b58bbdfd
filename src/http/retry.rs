//! Retry policy with bounded exponential backoff.

use std::time::Duration;

use super::error::{ApiError, ErrorKind};

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Base delay before the first retry, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Growth factor of the delay between consecutive retries.
pub const RETRY_MULTIPLIER: u32 = 2;

/// How many times a call is retried and how long to wait in between.
///
/// The wait before retry `i` (0-indexed) is `delay * multiplier^i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: Duration::from_millis(RETRY_DELAY_MS),
            multiplier: RETRY_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            delay,
            multiplier,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total number of network attempts a failing call makes.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
    }
}

/// Whether the client should try a failed attempt again.
///
/// Timeouts, 401 and every other 4xx except 429 are terminal. Anything else
/// is retried: network failures, 5xx, 429, unreadable bodies, unexpected
/// statuses such as 3xx and requests that could not be built.
pub fn should_retry(error: &ApiError) -> bool {
    match error.kind() {
        ErrorKind::Timeout | ErrorKind::Authentication => false,
        ErrorKind::RateLimit { .. } => true,
        _ => !error.is_client_error(),
    }
}
