//! Dispatch configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::DispatchError, outcome::DEFAULT_SAMPLE_ERRORS};

const fn default_max_concurrency() -> usize {
    10
}

const fn default_throughput_per_second() -> f64 {
    1.0 // Conservative: providers throttle bulk senders hard
}

const fn default_send_timeout() -> u64 {
    15
}

const fn default_sample_errors() -> usize {
    DEFAULT_SAMPLE_ERRORS
}

/// Limits applied to one campaign's queue.
///
/// `max_concurrency` and `throughput_per_second` are independent ceilings.
/// Effective throughput is `min(max_concurrency / average_send_latency,
/// throughput_per_second)`: at 1/sec with a concurrency of 10, send starts
/// are still one second apart while up to 10 sends overlap.
///
/// Failures never adjust these limits for later jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Most sends allowed in flight at once
    ///
    /// Default: 10
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Send starts per second; consecutive starts are at least
    /// `1 / throughput_per_second` seconds apart
    ///
    /// Default: 1.0
    #[serde(default = "default_throughput_per_second")]
    pub throughput_per_second: f64,

    /// Upper bound on a single send, after which it counts as failed
    ///
    /// Default: 15 seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// How many failure reasons a campaign outcome keeps
    ///
    /// Default: 10
    #[serde(default = "default_sample_errors")]
    pub sample_errors: usize,

    /// Resubmission of temporary failures, layered above the queue
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            throughput_per_second: default_throughput_per_second(),
            send_timeout_secs: default_send_timeout(),
            sample_errors: default_sample_errors(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchConfig {
    /// Check that the limits can drive a queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_concurrency == 0 {
            return Err(DispatchError::Configuration {
                field: "max_concurrency",
                reason: "must allow at least one send in flight".to_string(),
            });
        }

        if !self.throughput_per_second.is_finite() || self.throughput_per_second <= 0.0 {
            return Err(DispatchError::Configuration {
                field: "throughput_per_second",
                reason: format!(
                    "must be a positive number, got {}",
                    self.throughput_per_second
                ),
            });
        }

        if self.send_timeout_secs == 0 {
            return Err(DispatchError::Configuration {
                field: "send_timeout_secs",
                reason: "must be at least one second".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(DispatchError::Configuration {
                field: "retry.max_attempts",
                reason: "must make at least one attempt".to_string(),
            });
        }

        Ok(())
    }

    /// Minimum spacing between two send starts.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.throughput_per_second)
    }

    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Retry passes for temporary failures.
///
/// The queue never retries on its own. When `max_attempts` is above one, a
/// campaign collects the temporary failures of a pass and resubmits them
/// through a fresh queue, so retries obey the same rate and concurrency
/// limits as first attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per recipient, including the first
    ///
    /// Default: 1 (no retries)
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Pause between the end of one pass and the start of the next
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::pass_delay_secs")]
    pub pass_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            pass_delay_secs: defaults::pass_delay_secs(),
        }
    }
}

impl RetryPolicy {
    /// Whether a recipient that has had `attempts` tries gets another.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    pub const fn pass_delay(&self) -> Duration {
        Duration::from_secs(self.pass_delay_secs)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        1
    }

    pub const fn pass_delay_secs() -> u64 {
        30
    }
}
