//! Retry policy for queued emails.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, queue::retry::backoff_delay};

/// Longest backoff a policy may configure (30 days)
pub const MAX_RETRY_DELAY_LIMIT_SECS: u64 = 30 * 24 * 60 * 60;

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total delivery passes (including the initial one) before an email is
    /// marked failed.
    ///
    /// Default: 5 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (in seconds).
    ///
    /// The actual delay is calculated as: `base * 2^(attempts - 1)`
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    /// Maximum retry delay (in seconds).
    ///
    /// Default: 3600 seconds (1 hour)
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Jitter factor for randomizing retry delays, ±`jitter_factor`.
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values that would make [`retry_delay`](Self::retry_delay) panic
    /// or schedule an email beyond any reasonable horizon.
    ///
    /// # Errors
    ///
    /// Returns an error if the jitter factor is not a finite value in
    /// `0.0..=1.0` or the maximum delay exceeds
    /// [`MAX_RETRY_DELAY_LIMIT_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(ConfigError::InvalidJitterFactor(self.retry_jitter_factor));
        }

        if self.max_retry_delay_secs > MAX_RETRY_DELAY_LIMIT_SECS {
            return Err(ConfigError::RetryDelayTooLarge {
                secs: self.max_retry_delay_secs,
                limit: MAX_RETRY_DELAY_LIMIT_SECS,
            });
        }

        Ok(())
    }

    /// Check if another pass should be attempted after `attempt_count`
    /// failed passes.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// How long an email that has failed `attempt_count` passes waits before
    /// its next one.
    #[must_use]
    pub fn retry_delay(&self, attempt_count: u32) -> Duration {
        backoff_delay(
            attempt_count,
            self.base_retry_delay_secs,
            self.max_retry_delay_secs,
            self.retry_jitter_factor,
        )
    }

    /// Get the number of remaining attempts.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn base_retry_delay_secs() -> u64 {
        30
    }

    pub const fn max_retry_delay_secs() -> u64 {
        3600 // 1 hour
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.0
    }
}
