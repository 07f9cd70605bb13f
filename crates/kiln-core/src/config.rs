use std::time::Duration;

use kiln_model::TimeoutMs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Exponential backoff between transient retries inside `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffStrategy {
    /// Delay before the second attempt.
    pub first_ms: TimeoutMs,
    /// Upper bound for any delay.
    pub max_ms: TimeoutMs,
    /// Multiplier applied per attempt.
    pub factor: f64,
}

impl BackoffStrategy {
    /// Delay to wait after `attempt` (1-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.first_ms as f64 * self.factor.powi(exp);
        let capped = raw.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            first_ms: 500,
            max_ms: 10_000,
            factor: 2.0,
        }
    }
}

/// How many times a `Failed`/`TimedOut` task may be re-entered into `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self { max_retries: 0 }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// How a re-push of the same build stays idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PushIdempotency {
    /// Tag derived from the build fingerprint; a re-push writes identical content.
    ContentAddressed,
    /// A moving tag that every push overwrites.
    TagOverwrite,
}

impl Default for PushIdempotency {
    fn default() -> Self {
        PushIdempotency::ContentAddressed
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Deadline budget while `Pending`.
    pub queue_wait_ms: TimeoutMs,
    /// Deadline budget while `Running`.
    pub build_time_ms: TimeoutMs,
    /// Maximum number of tasks in `Running` at once.
    pub capacity: usize,
    pub sweep_interval_ms: TimeoutMs,
    /// Attempts per stage for transient infrastructure errors.
    pub transient_attempts: u32,
    pub backoff: BackoffStrategy,
    pub retry: RetryPolicy,
    pub credential_ttl_ms: TimeoutMs,
    /// Fallback poll period while waiting for a build.
    pub wait_poll_ms: TimeoutMs,
    pub max_labels: usize,
    pub max_arguments: usize,
    pub push: PushIdempotency,
    /// Tag used under [`PushIdempotency::TagOverwrite`].
    pub moving_tag: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            queue_wait_ms: 10 * 60 * 1000,
            build_time_ms: 30 * 60 * 1000,
            capacity: 4,
            sweep_interval_ms: 1_000,
            transient_attempts: 3,
            backoff: BackoffStrategy::default(),
            retry: RetryPolicy::default(),
            credential_ttl_ms: 30_000,
            wait_poll_ms: 250,
            max_labels: 20,
            max_arguments: 256,
            push: PushIdempotency::default(),
            moving_tag: "latest".to_string(),
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.queue_wait_ms == 0 || self.build_time_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "queue_wait_ms and build_time_ms must be positive".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(CoreError::InvalidConfig("capacity must be positive".into()));
        }
        if self.sweep_interval_ms == 0 || self.wait_poll_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "sweep_interval_ms and wait_poll_ms must be positive".into(),
            ));
        }
        if self.transient_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "transient_attempts must be at least 1".into(),
            ));
        }
        if self.backoff.factor < 1.0 || self.backoff.first_ms > self.backoff.max_ms {
            return Err(CoreError::InvalidConfig(format!(
                "invalid backoff: first_ms={} max_ms={} factor={}",
                self.backoff.first_ms, self.backoff.max_ms, self.backoff.factor
            )));
        }
        if self.moving_tag.trim().is_empty() {
            return Err(CoreError::InvalidConfig("moving_tag cannot be empty".into()));
        }
        Ok(())
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    pub fn build_time(&self) -> Duration {
        Duration::from_millis(self.build_time_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_millis(self.credential_ttl_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}
