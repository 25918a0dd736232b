// ============================================================================
// chatmod-core - Path Store
//
// A JSON tree addressed by dot paths, with exact-path change notification.
//
// Notifications never bubble: set("a.b", ..) reports "a.b" only, not "a"
// and not "a.b.c". Listeners interested in a subtree filter with
// `path_affects`.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use slotmap::{SlotMap, new_key_type};

use crate::core::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::core::error::StoreError;
use crate::core::types::guarded;
use crate::store::equality::same_value;
use crate::store::path::{self, value_kind};

/// Store change callback: `(state, changed_path)`.
pub type StoreListener = Rc<dyn Fn(&Value, &str)>;

new_key_type! {
    struct ListenerKey;
}

struct StoreInner {
    /// Copy-on-write root. Snapshots handed out by `state_ref` keep the old
    /// tree alive; the next write clones it instead of mutating under them.
    state: RefCell<Rc<Value>>,
    listeners: RefCell<SlotMap<ListenerKey, StoreListener>>,
    sink: Rc<dyn DiagnosticSink>,
}

/// Path-addressed reactive store.
///
/// Cloning yields another handle to the same store.
///
/// # Example
///
/// ```
/// use chatmod_core::store::PathStore;
/// use serde_json::json;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = PathStore::new();
/// let changes = Rc::new(RefCell::new(Vec::new()));
///
/// let c = changes.clone();
/// let _sub = store.subscribe(move |_, path| c.borrow_mut().push(path.to_string()));
///
/// store.set("ui.sidebar.width", json!(280)).unwrap();
/// store.set("ui.sidebar.width", json!(280)).unwrap(); // same value: no-op
///
/// assert_eq!(store.get("ui.sidebar"), Some(json!({"width": 280})));
/// assert_eq!(*changes.borrow(), vec!["ui.sidebar.width"]);
/// ```
#[derive(Clone)]
pub struct PathStore {
    inner: Rc<StoreInner>,
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStore {
    /// Empty store reporting through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Rc::new(TracingSink))
    }

    /// Empty store reporting to `sink`.
    pub fn with_sink(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(Rc::new(Value::Object(Map::new()))),
                listeners: RefCell::new(SlotMap::with_key()),
                sink,
            }),
        }
    }

    /// Store seeded with `initial`, which must be an object.
    pub fn with_state(initial: Value, sink: Rc<dyn DiagnosticSink>) -> Result<Self, StoreError> {
        if !initial.is_object() {
            return Err(StoreError::NotAnObject(value_kind(&initial)));
        }
        let store = Self::with_sink(sink);
        *store.inner.state.borrow_mut() = Rc::new(initial);
        Ok(store)
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Value at `path`, or `None` if any segment is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.inner.state.borrow();
        path::lookup(&state, path).cloned()
    }

    /// Whether `path` resolves to a value.
    pub fn contains(&self, path: &str) -> bool {
        let state = self.inner.state.borrow();
        path::lookup(&state, path).is_some()
    }

    /// Deep copy of the whole tree. Safe to keep and mutate.
    pub fn get_data(&self) -> Value {
        Value::clone(&self.inner.state.borrow())
    }

    /// Read-only reference to the live tree, without copying.
    ///
    /// The returned `Rc` is a snapshot: it cannot be mutated, and later
    /// writes to the store do not show through it (the store copies on
    /// write while a snapshot is held). Release it promptly in hot paths so
    /// the next write can mutate in place.
    pub fn state_ref(&self) -> Rc<Value> {
        self.inner.state.borrow().clone()
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Write `value` at `path` and notify listeners with exactly `path`.
    ///
    /// Returns `Ok(false)` without notifying when the current value is the
    /// same value (see [`same_value`]). Rejected paths are reported and leave
    /// the tree untouched.
    pub fn set(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        let segments = match path::parse(path) {
            Ok(segments) => segments,
            Err(err) => return Err(self.reject(err)),
        };

        {
            let state = self.inner.state.borrow();
            if path::lookup(&state, path).is_some_and(|current| same_value(current, &value)) {
                return Ok(false);
            }
            if let Err(err) = path::check_writable(&state, path, &segments) {
                drop(state);
                return Err(self.reject(err));
            }
        }

        {
            let mut state = self.inner.state.borrow_mut();
            path::write(Rc::make_mut(&mut state), &segments, value);
        }

        tracing::trace!(path = %path, "store set");
        self.notify(path);
        Ok(true)
    }

    /// Replace the whole tree with `next`, which must be an object.
    ///
    /// Listeners are notified once per top-level key in the union of the old
    /// and new key sets (old keys first), so removed keys are reported too.
    pub fn replace_state(&self, next: Value) -> Result<(), StoreError> {
        if !next.is_object() {
            return Err(self.reject(StoreError::NotAnObject(value_kind(&next))));
        }

        let keys: Vec<String> = {
            let old = self.inner.state.borrow();
            let mut keys: Vec<String> = top_level_keys(&old);
            for key in top_level_keys(&next) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            keys
        };

        let previous = self.inner.state.replace(Rc::new(next));
        drop(previous);

        tracing::debug!(keys = keys.len(), "store state replaced");
        for key in &keys {
            self.notify(key);
        }
        Ok(())
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Register `callback(state, changed_path)`. No ordering is guaranteed
    /// between subscribers.
    pub fn subscribe(&self, callback: impl Fn(&Value, &str) + 'static) -> StoreSubscription {
        let key = self.inner.listeners.borrow_mut().insert(Rc::new(callback));
        StoreSubscription {
            store: Rc::downgrade(&self.inner),
            key,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self, path: &str) {
        let state = self.state_ref();
        let listeners: Vec<StoreListener> =
            self.inner.listeners.borrow().values().cloned().collect();

        for listener in listeners {
            if let Err(message) = guarded(|| listener(&state, path)) {
                self.inner.sink.report(Diagnostic::StoreListenerPanicked {
                    path: path.to_string(),
                    message,
                });
            }
        }
    }

    fn reject(&self, err: StoreError) -> StoreError {
        self.inner
            .sink
            .report(Diagnostic::StoreRejected(err.clone()));
        err
    }
}

fn top_level_keys(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

/// Handle returned by [`PathStore::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
pub struct StoreSubscription {
    store: Weak<StoreInner>,
    key: ListenerKey,
}

impl StoreSubscription {
    /// Remove the listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.store.upgrade() {
            let removed = inner.listeners.borrow_mut().remove(self.key);
            drop(removed);
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|inner| inner.listeners.borrow().contains_key(self.key))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::RecordingSink;
    use serde_json::json;

    fn store() -> (PathStore, Rc<RecordingSink>) {
        let sink = Rc::new(RecordingSink::new());
        (PathStore::with_sink(sink.clone()), sink)
    }

    fn record(store: &PathStore) -> (Rc<RefCell<Vec<String>>>, StoreSubscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let sub = store.subscribe(move |_, path| l.borrow_mut().push(path.to_string()));
        (log, sub)
    }

    #[test]
    fn get_missing_paths_is_none() {
        let (store, _) = store();
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("a.b.c"), None);
        assert!(!store.contains("a"));
    }

    #[test]
    fn set_twice_notifies_once() {
        let (store, _) = store();
        let (log, _sub) = record(&store);

        assert_eq!(store.set("a.b", json!(1)), Ok(true));
        assert_eq!(store.set("a.b", json!(1)), Ok(false));

        assert_eq!(*log.borrow(), vec!["a.b"]);
        assert_eq!(store.get("a"), Some(json!({"b": 1})));
    }

    #[test]
    fn notifications_do_not_bubble() {
        let (store, _) = store();
        let (log, _sub) = record(&store);

        store.set("theme.colors.bg", json!("#000")).unwrap();
        store.set("theme", json!({"mode": "dark"})).unwrap();

        assert_eq!(*log.borrow(), vec!["theme.colors.bg", "theme"]);
    }

    #[test]
    fn negative_zero_is_a_change() {
        let (store, _) = store();
        let (log, _sub) = record(&store);

        store.set("x", json!(0.0)).unwrap();
        store.set("x", json!(-0.0)).unwrap();
        store.set("x", json!(-0.0)).unwrap();

        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn setting_null_over_missing_is_a_change() {
        let (store, _) = store();
        assert_eq!(store.set("maybe", Value::Null), Ok(true));
        assert_eq!(store.set("maybe", Value::Null), Ok(false));
    }

    #[test]
    fn reserved_segments_are_rejected_without_write() {
        let (store, sink) = store();
        let (log, _sub) = record(&store);

        let err = store.set("a.__proto__.polluted", json!(true)).unwrap_err();
        assert!(matches!(err, StoreError::ReservedSegment { .. }));
        assert!(store.set("constructor", json!(1)).is_err());
        assert!(store.set("", json!(1)).is_err());

        assert_eq!(store.get_data(), json!({}));
        assert!(log.borrow().is_empty());
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn named_key_on_array_is_rejected() {
        let (store, _) = store();
        store.set("list", json!([1, 2])).unwrap();
        assert!(store.set("list.name", json!("x")).is_err());
        assert_eq!(store.get("list"), Some(json!([1, 2])));

        assert_eq!(store.set("list.1", json!(5)), Ok(true));
        assert_eq!(store.get("list"), Some(json!([1, 5])));
    }

    #[test]
    fn far_array_index_is_rejected_without_write() {
        let (store, sink) = store();
        store.set("list", json!([1])).unwrap();
        let (log, _sub) = record(&store);

        let huge = store.set("list.18446744073709551615", json!(1));
        assert!(matches!(huge, Err(StoreError::InvalidPath(_))));
        let far = store.set("list.4000000000", json!(1));
        assert!(matches!(far, Err(StoreError::InvalidPath(_))));

        assert_eq!(store.get("list"), Some(json!([1])));
        assert!(log.borrow().is_empty());
        assert_eq!(
            sink.count(|d| matches!(d, Diagnostic::StoreRejected(StoreError::InvalidPath(_)))),
            2
        );

        assert_eq!(store.set("list.3", json!(4)), Ok(true));
        assert_eq!(store.get("list"), Some(json!([1, null, null, 4])));
    }

    #[test]
    fn get_data_is_a_detached_copy() {
        let (store, _) = store();
        store.set("a", json!(1)).unwrap();

        let mut copy = store.get_data();
        copy["a"] = json!(99);
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn state_ref_is_a_stable_snapshot() {
        let (store, _) = store();
        store.set("a", json!(1)).unwrap();

        let snapshot = store.state_ref();
        store.set("a", json!(2)).unwrap();

        assert_eq!(snapshot["a"], json!(1));
        assert_eq!(store.state_ref()["a"], json!(2));
    }

    #[test]
    fn replace_state_notifies_union_of_keys() {
        let (store, _) = store();
        store.replace_state(json!({"x": 1, "y": 2})).unwrap();

        let (log, _sub) = record(&store);
        store.replace_state(json!({"x": 1, "z": 3})).unwrap();

        assert_eq!(*log.borrow(), vec!["x", "y", "z"]);
        assert_eq!(store.get("y"), None);
    }

    #[test]
    fn replace_state_rejects_non_objects() {
        let (store, sink) = store();
        store.set("keep", json!(true)).unwrap();

        assert_eq!(
            store.replace_state(json!([1, 2])),
            Err(StoreError::NotAnObject("array"))
        );
        assert!(store.replace_state(json!(null)).is_err());
        assert_eq!(store.get("keep"), Some(json!(true)));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn listeners_receive_current_state() {
        let (store, _) = store();
        let seen = Rc::new(RefCell::new(Value::Null));

        let s = seen.clone();
        let _sub = store.subscribe(move |state, _| *s.borrow_mut() = state.clone());
        store.set("count", json!(3)).unwrap();

        assert_eq!(*seen.borrow(), json!({"count": 3}));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let (store, _) = store();
        let (log, sub) = record(&store);

        store.set("a", json!(1)).unwrap();
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        store.set("a", json!(2)).unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let (store, sink) = store();
        let _bad = store.subscribe(|_, _| panic!("render failed"));
        let (log, _sub) = record(&store);

        assert_eq!(store.set("a", json!(1)), Ok(true));
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(
            sink.records(),
            vec![Diagnostic::StoreListenerPanicked {
                path: "a".into(),
                message: "render failed".into(),
            }]
        );
    }

    #[test]
    fn listener_may_write_back_into_the_store() {
        let (store, _) = store();
        let s = store.clone();
        let _sub = store.subscribe(move |_, path| {
            if path == "input" {
                let doubled = s.get("input").and_then(|v| v.as_i64()).unwrap_or(0) * 2;
                s.set("derived", json!(doubled)).unwrap();
            }
        });

        store.set("input", json!(21)).unwrap();
        assert_eq!(store.get("derived"), Some(json!(42)));
    }

    #[test]
    fn with_state_requires_an_object() {
        let sink: Rc<dyn DiagnosticSink> = Rc::new(RecordingSink::new());
        assert!(PathStore::with_state(json!("nope"), sink.clone()).is_err());

        let store = PathStore::with_state(json!({"seed": 1}), sink).unwrap();
        assert_eq!(store.get("seed"), Some(json!(1)));
    }
}
