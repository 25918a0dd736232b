// ============================================================================
// chatmod-core - Scheduling
// Host scheduling capability, a deterministic implementation, and the
// cancellable settle/idle debouncer built on top of it
// ============================================================================

mod debounce;
mod manual;
mod scheduler;

pub use debounce::Debouncer;
pub use manual::ManualScheduler;
pub use scheduler::{Scheduler, TimerId};
