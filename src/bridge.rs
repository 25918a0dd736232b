// ============================================================================
// chatmod-core - Config Bridge
//
// Glue between persistent configuration and the substrate:
//
//   storage --(RemoteChange)--> store.replace_state + bus REMOTE_CHANGE_EVENT
//   store --(any local set)--> debounced storage.save
//
// Applying a remote change never schedules a save, so a value written by
// another tab is not echoed back to storage.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::bus::EventBus;
use crate::core::constants::{REMOTE_CHANGE_EVENT, SAVE_DELAY, SAVE_IDLE_TIMEOUT};
use crate::core::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::core::error::StorageError;
use crate::schedule::{Debouncer, Scheduler};
use crate::store::{PathStore, StoreSubscription, value_kind};

// =============================================================================
// STORAGE
// =============================================================================

/// Persistence collaborator holding the configuration as one JSON blob.
pub trait ConfigStorage: 'static {
    /// The stored blob, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Value>, StorageError>;

    fn save(&self, config: &Value) -> Result<(), StorageError>;
}

/// In-memory [`ConfigStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    value: RefCell<Option<Value>>,
    saves: Cell<u32>,
    fail_saves: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            value: RefCell::new(Some(value)),
            ..Self::default()
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> u32 {
        self.saves.get()
    }

    /// Make every following save fail with [`StorageError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.set(failing);
    }
}

impl ConfigStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Value>, StorageError> {
        Ok(self.value.borrow().clone())
    }

    fn save(&self, config: &Value) -> Result<(), StorageError> {
        if self.fail_saves.get() {
            return Err(StorageError::Unavailable("memory storage set to fail".into()));
        }
        *self.value.borrow_mut() = Some(config.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// =============================================================================
// REMOTE CHANGE
// =============================================================================

/// Storage reported that the configuration was changed elsewhere (another
/// tab, a sync service).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteChange {
    pub old_value: Option<Value>,
    pub new_value: Value,
}

impl RemoteChange {
    pub fn new(old_value: Option<Value>, new_value: Value) -> Self {
        Self {
            old_value,
            new_value,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Options for a [`ConfigBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Quiet period after the last local change before saving.
    pub save_delay: Duration,

    /// Idle slot the save may wait for afterwards; `None` saves as soon as
    /// the delay ends.
    pub save_idle: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            save_delay: SAVE_DELAY,
            save_idle: Some(SAVE_IDLE_TIMEOUT),
        }
    }
}

impl BridgeConfig {
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn with_save_idle(mut self, idle: Option<Duration>) -> Self {
        self.save_idle = idle;
        self
    }
}

// =============================================================================
// BRIDGE
// =============================================================================

struct BridgeInner<P: 'static> {
    store: PathStore,
    bus: EventBus<P>,
    storage: Rc<dyn ConfigStorage>,
    saver: Debouncer,
    sink: Rc<dyn DiagnosticSink>,
    applying_remote: Cell<bool>,
    subscription: RefCell<Option<StoreSubscription>>,
}

impl<P: 'static> BridgeInner<P> {
    fn local_change(&self, path: &str) {
        if self.applying_remote.get() {
            return;
        }
        tracing::trace!(path = %path, "local change, save scheduled");

        let store = self.store.clone();
        let storage = self.storage.clone();
        let sink = self.sink.clone();
        self.saver.schedule(move || match storage.save(&store.get_data()) {
            Ok(()) => tracing::debug!("configuration saved"),
            Err(err) => sink.report(Diagnostic::Storage {
                message: err.to_string(),
            }),
        });
    }

    /// Replace the store contents without scheduling a save.
    fn replace_quietly(&self, value: Value) -> Result<(), StorageError> {
        if !value.is_object() {
            let err = StorageError::Malformed(format!(
                "expected an object, got {}",
                value_kind(&value)
            ));
            self.sink.report(Diagnostic::Storage {
                message: err.to_string(),
            });
            return Err(err);
        }

        self.applying_remote.set(true);
        let result = self.store.replace_state(value);
        self.applying_remote.set(false);
        result.map_err(|err| StorageError::Malformed(err.to_string()))
    }

    fn dispose(&self) {
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.saver.cancel();
    }
}

impl<P: 'static> Drop for BridgeInner<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Keeps a [`PathStore`] and a [`ConfigStorage`] in step, and announces
/// remote changes on the bus.
///
/// # Example
///
/// ```
/// use chatmod_core::bridge::{ConfigBridge, ConfigStorage, MemoryStorage, RemoteChange};
/// use chatmod_core::bus::{BusConfig, EventBus};
/// use chatmod_core::schedule::ManualScheduler;
/// use chatmod_core::store::PathStore;
/// use serde_json::json;
/// use std::rc::Rc;
///
/// let sched = Rc::new(ManualScheduler::new());
/// let store = PathStore::new();
/// let bus: EventBus<RemoteChange> = EventBus::new(sched.clone(), BusConfig::default());
/// let storage = Rc::new(MemoryStorage::new());
///
/// let bridge = ConfigBridge::new(store.clone(), bus, storage.clone(), sched.clone());
/// store.set("theme.accent", json!("teal")).unwrap();
/// bridge.flush();
///
/// assert_eq!(storage.load().unwrap(), Some(json!({"theme": {"accent": "teal"}})));
/// ```
pub struct ConfigBridge<P: 'static> {
    inner: Rc<BridgeInner<P>>,
}

impl<P: From<RemoteChange> + 'static> ConfigBridge<P> {
    pub fn new(
        store: PathStore,
        bus: EventBus<P>,
        storage: Rc<dyn ConfigStorage>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self::with_options(
            store,
            bus,
            storage,
            scheduler,
            BridgeConfig::default(),
            Rc::new(TracingSink),
        )
    }

    pub fn with_options(
        store: PathStore,
        bus: EventBus<P>,
        storage: Rc<dyn ConfigStorage>,
        scheduler: Rc<dyn Scheduler>,
        config: BridgeConfig,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        let saver = match config.save_idle {
            Some(idle) => Debouncer::with_idle(scheduler, config.save_delay, idle),
            None => Debouncer::new(scheduler, config.save_delay),
        };

        let inner = Rc::new(BridgeInner {
            store,
            bus,
            storage,
            saver,
            sink,
            applying_remote: Cell::new(false),
            subscription: RefCell::new(None),
        });

        let weak: Weak<BridgeInner<P>> = Rc::downgrade(&inner);
        let subscription = inner.store.subscribe(move |_, path| {
            if let Some(inner) = weak.upgrade() {
                inner.local_change(path);
            }
        });
        *inner.subscription.borrow_mut() = Some(subscription);

        Self { inner }
    }

    /// Seed the store from storage. Returns whether anything was stored.
    pub fn load(&self) -> Result<bool, StorageError> {
        let stored = match self.inner.storage.load() {
            Ok(stored) => stored,
            Err(err) => {
                self.inner.sink.report(Diagnostic::Storage {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        match stored {
            Some(value) => {
                self.inner.replace_quietly(value)?;
                tracing::debug!("configuration loaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply a change reported by storage: replace the store contents, drop
    /// any pending local save, and publish the change under
    /// [`REMOTE_CHANGE_EVENT`]. Returns the number of bus listeners invoked.
    pub fn apply_remote(&self, change: RemoteChange) -> Result<usize, StorageError> {
        self.inner.saver.cancel();
        self.inner.replace_quietly(change.new_value.clone())?;
        tracing::debug!("remote configuration change applied");
        Ok(self
            .inner
            .bus
            .publish(REMOTE_CHANGE_EVENT, &P::from(change)))
    }

    /// Save now if a save is pending.
    pub fn flush(&self) {
        self.inner.saver.flush();
    }

    pub fn is_save_pending(&self) -> bool {
        self.inner.saver.is_pending()
    }

    /// Stop following the store and drop any pending save.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================
