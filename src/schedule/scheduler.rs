// ============================================================================
// chatmod-core - Scheduler Trait
// ============================================================================
//
// The components never block. The only places where control is handed back
// to the host are:
// - the next display refresh (request_frame)
// - a fixed delay (set_timeout)
// - an idle slot with an upper bound (request_idle)
// ============================================================================

use std::time::Duration;

use crate::core::types::Task;

/// Handle for a pending timer or idle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Host scheduling capability.
///
/// Implemented by [`ManualScheduler`](super::ManualScheduler) for tests and
/// headless hosts, and by `WebScheduler` (feature `web`) in the browser.
pub trait Scheduler: 'static {
    /// Run `task` before the next repaint.
    fn request_frame(&self, task: Task);

    /// Run `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn clear_timeout(&self, id: TimerId);

    /// Run `task` when the host is idle, but no later than `timeout`.
    ///
    /// Hosts without an idle notion run it as a zero-delay timer.
    fn request_idle(&self, timeout: Duration, task: Task) -> TimerId {
        let _ = timeout;
        self.set_timeout(Duration::ZERO, task)
    }

    /// Cancel an idle request.
    fn cancel_idle(&self, id: TimerId) {
        self.clear_timeout(id);
    }
}
