//! Error classification and retry backoff policy.
//!
//! Execution errors carry a leading code token (`"TIMEOUT: upstream..."`).
//! Classification is denylist-based: an error is `Permanent` only when it
//! names a code on the permanent list; everything else -- including codes
//! this module has never seen -- classifies as `Transient`. Permanence must
//! be proven, because a permanent verdict forfeits the execution's remaining
//! attempts.

use std::time::Duration;

use flowline_types::config::RetrySettings;

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Error codes that are never retried, regardless of remaining attempts.
pub const PERMANENT_ERROR_CODES: &[&str] = &[
    "INVALID_API_KEY",
    "INVALID_CREDENTIALS",
    "PERMISSION_DENIED",
    "NOT_FOUND",
    "INVALID_CONFIGURATION",
    "VALIDATION_ERROR",
];

/// Error codes known to be temporary. Kept explicit for documentation and
/// tests; membership is not required for an error to be retried.
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "RATE_LIMITED",
    "TIMEOUT",
    "NETWORK_ERROR",
    "SERVICE_UNAVAILABLE",
    "INTERNAL_ERROR",
];

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Assumed recoverable by retrying later.
    Transient,
    /// Requires human or configuration intervention; never auto-retried.
    Permanent,
}

/// Classify an error string by its code content.
pub fn classify(error: &str) -> ErrorClass {
    if PERMANENT_ERROR_CODES.iter().any(|code| error.contains(code)) {
        ErrorClass::Permanent
    } else {
        ErrorClass::Transient
    }
}

/// Convenience predicate for retry-eligibility checks.
pub fn is_transient(error: &str) -> bool {
    classify(error) == ErrorClass::Transient
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Deterministic exponential backoff for execution-level retries.
///
/// Attempt 1 waits `base_delay`; each subsequent attempt multiplies the
/// previous delay by `multiplier`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from explicit knobs.
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: multiplier.max(1.0),
            max_delay,
        }
    }

    /// Build a policy from configuration.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            Duration::from_secs(settings.base_delay_secs),
            settings.multiplier,
            Duration::from_secs(settings.max_delay_secs),
        )
    }

    /// Delay to wait before the given retry attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
