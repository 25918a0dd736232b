// ============================================================================
// chatmod-core - Event Bus Configuration
// ============================================================================

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::core::constants::{AGGREGATION_IDLE_TIMEOUT, AGGREGATION_WINDOW};

/// Options for an [`EventBus`](super::EventBus).
///
/// Diagnostics are off unless `debug` is set. Noisy events are opt-in: with
/// `debug` on, an event listed here gets one aggregated summary per burst
/// instead of a diagnostic per publish.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events whose per-publish diagnostics are replaced by one summary.
    pub noisy_events: HashSet<String>,

    /// Quiet period that ends an aggregation window.
    pub aggregation_window: Duration,

    /// Idle slot the summary may wait for after the window; `None` emits it
    /// as soon as the window ends.
    pub aggregation_idle: Option<Duration>,

    /// Emit a `Published` diagnostic (with subscriber keys) for every
    /// publish of a non-noisy event.
    pub debug: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            noisy_events: HashSet::new(),
            aggregation_window: AGGREGATION_WINDOW,
            aggregation_idle: Some(AGGREGATION_IDLE_TIMEOUT),
            debug: false,
        }
    }
}

impl BusConfig {
    pub fn with_noisy<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.noisy_events.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.aggregation_window = window;
        self
    }

    pub fn with_idle(mut self, idle: Option<Duration>) -> Self {
        self.aggregation_idle = idle;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_noisy(&self, event: &str) -> bool {
        self.noisy_events.contains(event)
    }
}
