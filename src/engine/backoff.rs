//! Retry delay policy

use crate::config::ResilienceConfig;
use std::time::Duration;

/// Exponent ceiling, far past any realistic cap
const MAX_EXPONENT: u32 = 30;

/// Computes the wait after a failed poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    poll_interval: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, poll_interval: Duration) -> Self {
        Self {
            base,
            cap,
            poll_interval,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.backoff_base_secs),
            Duration::from_secs_f64(config.backoff_cap_secs),
            config.poll_interval(),
        )
    }

    /// `min(base * 2^consecutive_errors, cap)`
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        let factor = 2u32.pow(consecutive_errors.min(MAX_EXPONENT));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Wait before the next poll after a failure
    ///
    /// Rate limits back off right away. Otherwise the first failure in a run
    /// retries at the poll interval and later ones back off. Never shorter
    /// than the poll interval or a server-sent `retry_after`, which may
    /// exceed the cap.
    pub fn after_failure(
        &self,
        consecutive_errors: u32,
        rate_limited: bool,
        retry_after: Option<Duration>,
    ) -> Duration {
        let delay = if !rate_limited && consecutive_errors <= 1 {
            self.poll_interval
        } else {
            self.delay(consecutive_errors).max(self.poll_interval)
        };
        delay.max(retry_after.unwrap_or_default())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
