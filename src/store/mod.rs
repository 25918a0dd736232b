// ============================================================================
// chatmod-core - Path Store Module
// Path-addressed JSON state with exact-path change notification
// ============================================================================

pub mod equality;
pub mod path;
mod path_store;

pub use equality::same_value;
pub use path::{path_affects, value_kind};
pub use path_store::{PathStore, StoreListener, StoreSubscription};
