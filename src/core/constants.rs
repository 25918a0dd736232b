// ============================================================================
// chatmod-core - Constants
// Default timings, limits and reserved names shared by the components
// ============================================================================

use std::time::Duration;

// =============================================================================
// EVENT BUS
// =============================================================================

/// Quiet period after the last publish of a noisy event before its
/// aggregated diagnostic is emitted.
pub const AGGREGATION_WINDOW: Duration = Duration::from_millis(500);

/// Upper bound on how long an aggregated diagnostic may wait for an idle
/// slot once the quiet period has elapsed.
pub const AGGREGATION_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);

// =============================================================================
// INSERTION WATCHER
// =============================================================================

/// Delay between two stylesheet readiness checks.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of readiness checks before pending selectors are dropped.
/// Together with [`READINESS_POLL_INTERVAL`] this is a ~15 second budget.
pub const MAX_READINESS_ATTEMPTS: u32 = 300;

/// Duration written into every generated style rule. Must be non-zero or
/// some engines never fire `animationstart`.
pub const SIGNAL_ANIMATION_DURATION: &str = "0.001s";

/// Infix between a watcher namespace and the per-selector counter in
/// generated animation names.
pub const SIGNAL_INFIX: &str = "-sig-";

/// DOM event carrying the insertion signal.
pub const ANIMATION_START_EVENT: &str = "animationstart";

// =============================================================================
// PATH STORE
// =============================================================================

/// Path separator for store addresses.
pub const PATH_SEPARATOR: char = '.';

/// Keys that must never be written through a path. They name internals of
/// the script object model the stored blob round-trips through.
pub const RESERVED_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// How far past the end of an existing array a write may reach. The gap is
/// filled with `null`; indices further out are rejected.
pub const MAX_ARRAY_PADDING: usize = 1024;

// =============================================================================
// CONFIG BRIDGE
// =============================================================================

/// Event published on the bus when storage reports a change made elsewhere.
pub const REMOTE_CHANGE_EVENT: &str = "config:remote-change";

/// Settle delay before a local store change is persisted.
pub const SAVE_DELAY: Duration = Duration::from_millis(300);

/// Idle fallback for the persisted write.
pub const SAVE_IDLE_TIMEOUT: Duration = Duration::from_millis(2000);
