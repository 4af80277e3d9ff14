use std::time::Duration;

use crate::config::QueueSettings;

/// Exponential delay between attempts of the same job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            base: settings.retry_delay,
            multiplier: settings.backoff_multiplier,
            max: settings.max_retry_delay,
        }
    }

    /// Delay before the attempt that follows attempt number `attempts`.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempts.saturating_sub(1).min(32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}
