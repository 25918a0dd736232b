// ============================================================================
// chatmod-core - Errors
// One error enum per component. Every variant is also reported as a
// diagnostic, so callers may ignore the Result without losing the signal.
// ============================================================================

use thiserror::Error;

/// Failures raised by the DOM-binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The engine refused to parse the selector of a style rule.
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    /// The style node exists but its sheet object is not usable.
    #[error("stylesheet is not available")]
    SheetUnavailable,

    /// A rule index was outside the current rule list.
    #[error("rule index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Any other engine-side failure, with the engine's message.
    #[error("dom operation failed: {0}")]
    Host(String),
}

/// Failures of the insertion watcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    /// Namespace strings seed animation names and must be CSS-identifier safe.
    #[error("invalid watcher namespace `{0}`")]
    InvalidNamespace(String),

    /// One of the two rules for a selector could not be inserted. The
    /// registration was rolled back.
    #[error("failed to register selector `{selector}`: {source}")]
    RuleInsertion {
        selector: String,
        #[source]
        source: DomError,
    },

    /// The owned `<style>` node could not be created.
    #[error("failed to create style node: {0}")]
    StyleNode(#[source] DomError),

    /// The stylesheet never became usable; these selectors were dropped.
    #[error("stylesheet not ready after {attempts} attempts, dropped {selectors:?}")]
    ReadinessTimeout {
        attempts: u32,
        selectors: Vec<String>,
    },

    /// The watcher was destroyed.
    #[error("watcher `{0}` has been destroyed")]
    Destroyed(String),
}

/// Misuse of the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Every subscription must carry a key so its owner can remove it.
    #[error("subscription to `{event}` is missing a key")]
    MissingKey { event: String },
}

/// Misuse of the path store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Empty path or empty segment.
    #[error("invalid path `{0}`")]
    InvalidPath(String),

    /// The path walks through a reserved key.
    #[error("path `{path}` uses reserved segment `{segment}`")]
    ReservedSegment { path: String, segment: String },

    /// `replace_state` only accepts objects.
    #[error("replacement state must be an object, got {0}")]
    NotAnObject(&'static str),
}

/// Failures of the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored configuration is malformed: {0}")]
    Malformed(String),
}
