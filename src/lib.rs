// ============================================================================
// chatmod-core - Coordination Substrate for Chat UI Customization
// ============================================================================
//
// Three independent components sharing only `core` and `schedule`:
// - watcher: selector-based insertion detection through animationstart
// - bus:     keyed publish/subscribe, noisy-event aggregation, UI work queue
// - store:   dot-path JSON state with exact-path notifications
//
// `bridge` wires storage, store and bus together at the composition root.
// ============================================================================

pub mod bridge;
pub mod bus;
pub mod core;
pub mod schedule;
pub mod store;
pub mod watcher;

#[cfg(feature = "web")]
pub mod web;

mod macros;

// Re-export the main handles at crate root
pub use crate::core::constants;
pub use crate::core::diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
pub use crate::core::error::{BusError, DomError, StorageError, StoreError, WatcherError};

pub use bridge::{BridgeConfig, ConfigBridge, ConfigStorage, MemoryStorage, RemoteChange};
pub use bus::{BusConfig, EventBus, SubscriptionGroup, UiWorkQueue};
pub use schedule::{Debouncer, ManualScheduler, Scheduler, TimerId};
pub use store::{PathStore, StoreSubscription, path_affects, same_value};
pub use watcher::{
    CssRule, Document, InsertionCallback, InsertionWatcher, StyleSheet, VirtualDocument,
    VirtualElement, WatcherConfig, WatcherRegistry,
};

// =============================================================================
// TESTS
// =============================================================================
