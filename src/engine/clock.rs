//! Session clock

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock timestamps driven by the tokio clock
///
/// Anchored to the wall clock once at start and advanced by
/// `tokio::time::Instant`, so cooldowns follow paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_start: DateTime<Utc>,
    instant_start: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            wall_start: Utc::now(),
            instant_start: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant_start.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_start + elapsed
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}
