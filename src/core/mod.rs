// ============================================================================
// chatmod-core - Core Module
// Defaults, error types, diagnostics and shared callback types
// ============================================================================

pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
pub use error::{BusError, DomError, StorageError, StoreError, WatcherError};
pub use types::{Task, guarded};
