//! Runtime configuration for the execution core.
//!
//! Deserialized from `flowline.toml` by the infra loader; every field has a
//! default so a missing or partial file still yields a working configuration.

use serde::Deserialize;

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Retry/backoff policy for execution-level retries.
    pub retry: RetrySettings,
    /// Minutes without progress before a `Running` execution counts as stuck.
    pub stuck_threshold_minutes: u32,
    /// Days a terminal execution is kept before bulk cleanup may delete it.
    pub cleanup_retention_days: u32,
    /// Queue executions are enqueued on by default.
    pub default_queue: String,
    /// Hard ceiling on per-step in-invocation retry attempts, regardless of
    /// what an individual step requests.
    pub step_retry_limit: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            stuck_threshold_minutes: 30,
            cleanup_retention_days: 30,
            default_queue: "workflow-executions".to_string(),
            step_retry_limit: 3,
        }
    }
}

/// Exponential backoff settings for execution-level retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Default ceiling on automatic attempts per execution.
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_secs: u64,
    /// Multiplier applied per subsequent retry.
    pub multiplier: f64,
    /// Cap on the computed delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 30,
            multiplier: 2.0,
            max_delay_secs: 3600,
        }
    }
}
