// ============================================================================
// chatmod-core - Diagnostics
//
// Pluggable reporting channel shared by all components.
// Every rejected operation and every isolated callback failure produces a
// Diagnostic; the sink decides where it goes.
// ============================================================================

use std::cell::RefCell;
use std::fmt;

use crate::core::error::{StoreError, WatcherError};

// =============================================================================
// DIAGNOSTIC
// =============================================================================

/// Something a component wants to report without failing its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Per-publish instrumentation for non-noisy events (debug mode only).
    Published {
        event: String,
        listener_keys: Vec<String>,
    },

    /// Summary for a noisy event after its aggregation window went quiet.
    Aggregated { event: String, count: u64 },

    /// A bus listener panicked. Its siblings still ran.
    ListenerPanicked {
        event: String,
        key: String,
        message: String,
    },

    /// A subscription was attempted without a key.
    MissingKey { event: String },

    /// A queued UI work item panicked.
    UiWorkPanicked { message: String },

    /// A store operation was rejected.
    StoreRejected(StoreError),

    /// A store subscriber panicked.
    StoreListenerPanicked { path: String, message: String },

    /// An insertion watcher failure (registration, readiness).
    Watcher(WatcherError),

    /// An insertion callback panicked.
    InsertionCallbackPanicked { selector: String, message: String },

    /// Persisting or loading configuration failed.
    Storage { message: String },
}

impl Diagnostic {
    /// Whether this diagnostic describes a failure rather than instrumentation.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Published { .. } | Self::Aggregated { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published {
                event,
                listener_keys,
            } => write!(f, "publish `{event}` -> {listener_keys:?}"),
            Self::Aggregated { event, count } => {
                write!(f, "`{event}` published {count} times")
            }
            Self::ListenerPanicked {
                event,
                key,
                message,
            } => write!(f, "listener `{key}` for `{event}` panicked: {message}"),
            Self::MissingKey { event } => {
                write!(f, "subscription to `{event}` rejected: missing key")
            }
            Self::UiWorkPanicked { message } => write!(f, "ui work panicked: {message}"),
            Self::StoreRejected(err) => write!(f, "store rejected operation: {err}"),
            Self::StoreListenerPanicked { path, message } => {
                write!(f, "store listener for `{path}` panicked: {message}")
            }
            Self::Watcher(err) => write!(f, "{err}"),
            Self::InsertionCallbackPanicked { selector, message } => {
                write!(f, "insertion callback for `{selector}` panicked: {message}")
            }
            Self::Storage { message } => write!(f, "storage: {message}"),
        }
    }
}

// =============================================================================
// SINK TRAIT
// =============================================================================

/// Destination for diagnostics.
pub trait DiagnosticSink: 'static {
    fn report(&self, diagnostic: Diagnostic);
}

// =============================================================================
// TRACING SINK
// =============================================================================

/// Default sink: forwards to `tracing`. Instrumentation goes out at debug
/// level, failures at warn/error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Published {
                event,
                listener_keys,
            } => tracing::debug!(event = %event, listeners = ?listener_keys, "publish"),
            Diagnostic::Aggregated { event, count } => {
                tracing::debug!(event = %event, count, "aggregated publishes")
            }
            Diagnostic::MissingKey { .. } | Diagnostic::StoreRejected(_) => {
                tracing::warn!("{diagnostic}")
            }
            _ => tracing::error!("{diagnostic}"),
        }
    }
}

// =============================================================================
// RECORDING SINK
// =============================================================================

/// Keeps every diagnostic in memory. Used by tests and by hosts that surface
/// diagnostics in their own UI.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: RefCell<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    /// Remove and return everything reported so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        self.records.take()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Number of records matching `pred`.
    pub fn count(&self, pred: impl Fn(&Diagnostic) -> bool) -> usize {
        self.records.borrow().iter().filter(|d| pred(d)).count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.records.borrow_mut().push(diagnostic);
    }
}

// =============================================================================
// TESTS
// =============================================================================
