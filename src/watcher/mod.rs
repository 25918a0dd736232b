// ============================================================================
// chatmod-core - Insertion Watcher
// ============================================================================

mod config;
pub mod dom;
mod insertion;
mod namespace;
mod registry;
mod selector;
mod virtual_dom;

pub use config::WatcherConfig;
pub use dom::{AnimationHandler, CssRule, Document, HostHandle, StyleSheet};
pub use insertion::{InsertionCallback, InsertionWatcher};
pub use namespace::validate_namespace;
pub use registry::WatcherRegistry;
pub use selector::SelectorList;
pub use virtual_dom::{VirtualDocument, VirtualElement, VirtualSheet};
