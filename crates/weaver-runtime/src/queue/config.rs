//! Queue configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Default maximum number of runs executing at once.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

/// Default number of attempts per job, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for retry behavior on failed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Attempts per job, including the first. Values below 1 mean 1.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-max-attempts",
            env = "WEAVER_QUEUE_MAX_ATTEMPTS",
            default_value_t = DEFAULT_MAX_ATTEMPTS
        )
    )]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-initial-backoff-ms",
            env = "WEAVER_QUEUE_INITIAL_BACKOFF_MS",
            default_value_t = 500
        )
    )]
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound of the backoff, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-max-backoff-ms",
            env = "WEAVER_QUEUE_MAX_BACKOFF_MS",
            default_value_t = 30_000
        )
    )]
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Multiplier applied to the backoff after each attempt.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-backoff-multiplier",
            env = "WEAVER_QUEUE_BACKOFF_MULTIPLIER",
            default_value_t = 2.0
        )
    )]
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: duration_ms(initial_backoff),
            ..Self::default()
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the maximum backoff.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = duration_ms(max_backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the number of attempts per job.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns the backoff after the given zero-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = (self.initial_backoff_ms as f64) * self.backoff_multiplier.powi(exponent);
        let millis = if millis.is_finite() { millis as u64 } else { u64::MAX };
        Duration::from_millis(millis.min(self.max_backoff_ms))
    }
}

/// Configuration of the execution queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Maximum number of runs executing at once.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-max-concurrent-runs",
            env = "WEAVER_QUEUE_MAX_CONCURRENT_RUNS",
            default_value_t = DEFAULT_MAX_CONCURRENT_RUNS
        )
    )]
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Per-attempt timeout in seconds. Zero disables the timeout.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "queue-task-timeout-secs",
            env = "WEAVER_QUEUE_TASK_TIMEOUT_SECS",
            default_value_t = DEFAULT_TASK_TIMEOUT_SECS
        )
    )]
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Retry behavior.
    #[cfg_attr(feature = "config", command(flatten))]
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_concurrent_runs() -> usize {
    DEFAULT_MAX_CONCURRENT_RUNS
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            retry: RetryConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Sets the concurrency limit.
    pub fn with_max_concurrent_runs(mut self, max_concurrent_runs: usize) -> Self {
        self.max_concurrent_runs = max_concurrent_runs;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the retry behavior.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the per-attempt timeout, if enabled.
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
