// ============================================================================
// chatmod-core - Ergonomic Macros
// ============================================================================

/// Clone handles into a move closure.
///
/// Buses, stores and watchers are cheap `Rc` handles; listeners usually need
/// their own copy of one or two of them.
///
/// # Usage
///
/// ```rust
/// use chatmod_core::bus::{BusConfig, EventBus};
/// use chatmod_core::cloned;
/// use chatmod_core::schedule::ManualScheduler;
/// use chatmod_core::store::PathStore;
/// use serde_json::json;
/// use std::rc::Rc;
///
/// let bus: EventBus<String> = EventBus::new(Rc::new(ManualScheduler::new()), BusConfig::default());
/// let store = PathStore::new();
///
/// bus.subscribe(
///     "theme",
///     "store-sync",
///     cloned!(store => move |accent: &String| {
///         let _ = store.set("theme.accent", json!(accent));
///     }),
/// )
/// .unwrap();
///
/// bus.publish("theme", &"teal".to_string());
/// assert_eq!(store.get("theme.accent"), Some(json!("teal")));
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Build an `Rc` callback with automatic capturing, for APIs that compare
/// callbacks by identity (such as `InsertionWatcher::on` / `off`).
///
/// # Usage
///
/// ```rust
/// use chatmod_core::callback;
/// use chatmod_core::watcher::{InsertionCallback, VirtualElement};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let hits = Rc::new(Cell::new(0));
/// let cb: InsertionCallback<VirtualElement> =
///     callback!(hits => |_el: &VirtualElement| hits.set(hits.get() + 1));
///
/// cb(&VirtualElement::new("p"));
/// assert_eq!(hits.get(), 1);
/// ```
#[macro_export]
macro_rules! callback {
    // Case 1: With captures
    ($($deps:ident),+ => |$arg:ident : $ty:ty| $body:expr) => {
        ::std::rc::Rc::new($crate::cloned!($($deps),+ => move |$arg: $ty| $body))
    };
    // Case 2: No captures
    (|$arg:ident : $ty:ty| $body:expr) => {
        ::std::rc::Rc::new(move |$arg: $ty| $body)
    };
}
