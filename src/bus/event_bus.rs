// ============================================================================
// chatmod-core - Event Bus
//
// Keyed publish/subscribe. Every subscription is named by (event, key) so
// its owner can always remove exactly its own listener.
//
// Dispatch rules:
// - listeners run synchronously, in subscription order
// - publish iterates over a snapshot, so listeners may (un)subscribe freely
// - a panicking listener is reported and skipped, never propagated
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::bus::aggregate::Aggregator;
use crate::bus::config::BusConfig;
use crate::bus::work_queue::UiWorkQueue;
use crate::core::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::core::error::BusError;
use crate::core::types::guarded;
use crate::schedule::Scheduler;

/// Shared listener callback.
pub type Listener<P> = Rc<dyn Fn(&P)>;

struct Subscription<P> {
    id: u64,
    listener: Listener<P>,
}

impl<P> Clone for Subscription<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: self.listener.clone(),
        }
    }
}

type Buckets<P> = HashMap<String, IndexMap<String, Subscription<P>>>;

struct BusInner<P> {
    buckets: RefCell<Buckets<P>>,
    next_id: Cell<u64>,
    config: BusConfig,
    sink: Rc<dyn DiagnosticSink>,
    aggregator: Aggregator,
    work: UiWorkQueue,
}

impl<P: 'static> BusInner<P> {
    fn alloc_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn insert(&self, event: &str, key: &str, sub: Subscription<P>) {
        let replaced = self
            .buckets
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .insert(key.to_string(), sub);
        if replaced.is_some() {
            tracing::trace!(event = %event, key = %key, "listener replaced");
        }
        // The old listener is dropped here, after the borrow is released.
        drop(replaced);
    }

    /// Remove `(event, key)`; when `only_id` is set, only if the entry is
    /// still that subscription.
    fn remove(&self, event: &str, key: &str, only_id: Option<u64>) -> bool {
        let removed = {
            let mut buckets = self.buckets.borrow_mut();
            let Some(bucket) = buckets.get_mut(event) else {
                return false;
            };
            if let Some(id) = only_id {
                if bucket.get(key).map(|s| s.id) != Some(id) {
                    return false;
                }
            }
            // shift_remove keeps the remaining listeners in subscription order
            let removed = bucket.shift_remove(key);
            if bucket.is_empty() {
                buckets.remove(event);
            }
            removed
        };
        removed.is_some()
    }
}

/// Keyed publish/subscribe bus, generic over the payload type.
///
/// The application defines the vocabulary (usually an enum payload and a set
/// of event-name constants); the bus does not inspect payloads.
///
/// Cloning yields another handle to the same bus.
///
/// # Example
///
/// ```
/// use chatmod_core::bus::{BusConfig, EventBus};
/// use chatmod_core::schedule::ManualScheduler;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let bus: EventBus<u32> = EventBus::new(Rc::new(ManualScheduler::new()), BusConfig::default());
/// let total = Rc::new(Cell::new(0));
///
/// let t = total.clone();
/// bus.subscribe("tokens", "counter", move |n| t.set(t.get() + n)).unwrap();
///
/// bus.publish("tokens", &5);
/// bus.publish("tokens", &7);
/// assert_eq!(total.get(), 12);
///
/// bus.unsubscribe("tokens", "counter");
/// bus.publish("tokens", &100);
/// assert_eq!(total.get(), 12);
/// ```
pub struct EventBus<P> {
    inner: Rc<BusInner<P>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: 'static> EventBus<P> {
    /// Bus reporting diagnostics through `tracing`.
    pub fn new(scheduler: Rc<dyn Scheduler>, config: BusConfig) -> Self {
        Self::with_sink(scheduler, config, Rc::new(TracingSink))
    }

    /// Bus reporting diagnostics to `sink`.
    pub fn with_sink(
        scheduler: Rc<dyn Scheduler>,
        config: BusConfig,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            inner: Rc::new(BusInner {
                buckets: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
                aggregator: Aggregator::new(scheduler.clone(), sink.clone(), config.clone()),
                work: UiWorkQueue::new(scheduler, sink.clone()),
                config,
                sink,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // =========================================================================
    // SUBSCRIPTION
    // =========================================================================

    /// Register `listener` for `event` under `key`.
    ///
    /// An existing listener with the same `(event, key)` is replaced and keeps
    /// its position in the dispatch order. An empty key is rejected.
    pub fn subscribe(
        &self,
        event: &str,
        key: &str,
        listener: impl Fn(&P) + 'static,
    ) -> Result<(), BusError> {
        self.check_key(event, key)?;
        let id = self.inner.alloc_id();
        self.inner.insert(
            event,
            key,
            Subscription {
                id,
                listener: Rc::new(listener),
            },
        );
        Ok(())
    }

    /// Register `listener` to run on the next publish of `event` only.
    ///
    /// The subscription removes itself before the listener body runs, so a
    /// publish re-entered from inside the listener cannot run it again.
    pub fn once(
        &self,
        event: &str,
        key: &str,
        listener: impl Fn(&P) + 'static,
    ) -> Result<(), BusError> {
        self.check_key(event, key)?;
        let id = self.inner.alloc_id();
        let weak: Weak<BusInner<P>> = Rc::downgrade(&self.inner);
        let fired = Cell::new(false);
        let (ev, k) = (event.to_string(), key.to_string());

        let wrapper = move |payload: &P| {
            if fired.replace(true) {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.remove(&ev, &k, Some(id));
            }
            listener(payload);
        };

        self.inner.insert(
            event,
            key,
            Subscription {
                id,
                listener: Rc::new(wrapper),
            },
        );
        Ok(())
    }

    /// Remove the listener under `(event, key)`. Unknown pairs are ignored.
    /// Returns whether something was removed.
    pub fn unsubscribe(&self, event: &str, key: &str) -> bool {
        self.inner.remove(event, key, None)
    }

    fn check_key(&self, event: &str, key: &str) -> Result<(), BusError> {
        if key.trim().is_empty() {
            self.inner.sink.report(Diagnostic::MissingKey {
                event: event.to_string(),
            });
            return Err(BusError::MissingKey {
                event: event.to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Run every listener of `event` with `payload`. Returns how many ran
    /// (panicked listeners included).
    pub fn publish(&self, event: &str, payload: &P) -> usize {
        let snapshot: Vec<(String, Listener<P>)> = self
            .inner
            .buckets
            .borrow()
            .get(event)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(key, sub)| (key.clone(), sub.listener.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if self.inner.config.debug && !self.inner.aggregator.record(event) {
            self.inner.sink.report(Diagnostic::Published {
                event: event.to_string(),
                listener_keys: snapshot.iter().map(|(k, _)| k.clone()).collect(),
            });
        }

        for (key, listener) in &snapshot {
            if let Err(message) = guarded(|| listener(payload)) {
                self.inner.sink.report(Diagnostic::ListenerPanicked {
                    event: event.to_string(),
                    key: key.clone(),
                    message,
                });
            }
        }
        snapshot.len()
    }

    // =========================================================================
    // AGGREGATION CONTROL
    // =========================================================================

    /// Publishes of a noisy `event` not yet summarized.
    pub fn pending_aggregate(&self, event: &str) -> u64 {
        self.inner.aggregator.pending(event)
    }

    /// Drop the pending summary (timer and tally) for `event`.
    pub fn cancel_aggregation(&self, event: &str) {
        self.inner.aggregator.cancel(event);
    }

    /// Drop every pending summary.
    pub fn cancel_all_aggregation(&self) {
        self.inner.aggregator.cancel_all();
    }

    // =========================================================================
    // UI WORK
    // =========================================================================

    /// Queue `work` for the next display refresh. See [`UiWorkQueue`].
    pub fn queue_ui_work(&self, work: impl FnOnce() + 'static) {
        self.inner.work.queue(work);
    }

    pub fn ui_work(&self) -> &UiWorkQueue {
        &self.inner.work
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Keys subscribed to `event`, in dispatch order.
    pub fn listener_keys(&self, event: &str) -> Vec<String> {
        self.inner
            .buckets
            .borrow()
            .get(event)
            .map(|bucket| bucket.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.buckets.borrow().get(event).map_or(0, |b| b.len())
    }

    /// Events that currently have at least one listener.
    pub fn event_count(&self) -> usize {
        self.inner.buckets.borrow().len()
    }

    pub fn has_listener(&self, event: &str, key: &str) -> bool {
        self.inner
            .buckets
            .borrow()
            .get(event)
            .is_some_and(|b| b.contains_key(key))
    }
}

// =============================================================================
// TESTS
// =============================================================================
