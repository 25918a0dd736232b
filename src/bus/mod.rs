// ============================================================================
// chatmod-core - Event Bus Module
// Keyed publish/subscribe, noisy-event diagnostics aggregation, and the
// once-per-frame UI work queue
// ============================================================================

mod aggregate;
mod event_bus;
mod config;
mod group;
mod work_queue;

pub use event_bus::{EventBus, Listener};
pub use config::BusConfig;
pub use group::SubscriptionGroup;
pub use work_queue::UiWorkQueue;
