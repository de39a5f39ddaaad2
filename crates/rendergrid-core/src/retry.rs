//! Bounded exponential backoff shared by provisioning, chunk dispatch and
//! webhook delivery.

use std::time::Duration;

use crate::config::RenderConfig;

/// Attempt budget plus a doubling delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            base,
            max,
        }
    }

    /// Policy for worker provisioning calls.
    pub const fn provisioning() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_secs(4))
    }

    /// Policy for chunk invocations, from `[render]`.
    pub fn for_chunks(render: &RenderConfig) -> Self {
        Self::new(
            render.max_attempts,
            Duration::from_millis(render.retry_base_ms),
            Duration::from_millis(render.retry_max_ms),
        )
    }

    /// Delay before the attempt following `failed_attempt` (1-indexed).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::provisioning()
    }
}
