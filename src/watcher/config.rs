// ============================================================================
// chatmod-core - Insertion Watcher Configuration
// ============================================================================

use std::time::Duration;

use serde::Deserialize;

use crate::core::constants::{
    MAX_READINESS_ATTEMPTS, READINESS_POLL_INTERVAL, SIGNAL_ANIMATION_DURATION,
};

/// Options for an [`InsertionWatcher`](super::InsertionWatcher).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay between stylesheet readiness checks.
    pub poll_interval: Duration,

    /// Readiness checks before pending selectors are dropped.
    pub max_poll_attempts: u32,

    /// `animation-duration` of the generated style rules.
    pub animation_duration: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: READINESS_POLL_INTERVAL,
            max_poll_attempts: MAX_READINESS_ATTEMPTS,
            animation_duration: SIGNAL_ANIMATION_DURATION.to_string(),
        }
    }
}

impl WatcherConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_animation_duration(mut self, duration: impl Into<String>) -> Self {
        self.animation_duration = duration.into();
        self
    }

    /// Total time the watcher waits for its stylesheet.
    pub fn readiness_budget(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}
