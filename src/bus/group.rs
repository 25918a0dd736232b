// ============================================================================
// chatmod-core - Subscription Group
//
// A feature manager's handle on the bus. Every subscription made through
// the group is remembered and released together on dispose() or drop, so
// a torn-down feature never leaves listeners behind.
// ============================================================================

use std::cell::RefCell;

use crate::bus::event_bus::EventBus;
use crate::core::error::BusError;

/// Set of subscriptions owned by one feature.
///
/// Keys are scoped by the owner name (`"<owner>:<key>"`), so two features
/// can use the same short key without replacing each other's listener.
///
/// # Example
///
/// ```
/// use chatmod_core::bus::{BusConfig, EventBus, SubscriptionGroup};
/// use chatmod_core::schedule::ManualScheduler;
/// use std::rc::Rc;
///
/// let bus: EventBus<()> = EventBus::new(Rc::new(ManualScheduler::new()), BusConfig::default());
/// {
///     let group = SubscriptionGroup::new(&bus, "sidebar");
///     group.subscribe("theme", "repaint", |_| {}).unwrap();
///     group.subscribe("nav", "refresh", |_| {}).unwrap();
///     assert_eq!(bus.event_count(), 2);
/// }
/// assert_eq!(bus.event_count(), 0);
/// ```
pub struct SubscriptionGroup<P: 'static> {
    bus: EventBus<P>,
    owner: String,
    entries: RefCell<Vec<(String, String)>>,
}

impl<P: 'static> SubscriptionGroup<P> {
    pub fn new(bus: &EventBus<P>, owner: impl Into<String>) -> Self {
        Self {
            bus: bus.clone(),
            owner: owner.into(),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The bus-level key used for `key`.
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.owner, key)
    }

    pub fn subscribe(
        &self,
        event: &str,
        key: &str,
        listener: impl Fn(&P) + 'static,
    ) -> Result<(), BusError> {
        Self::require_key(event, key)?;
        let scoped = self.scoped_key(key);
        self.bus.subscribe(event, &scoped, listener)?;
        self.remember(event, scoped);
        Ok(())
    }

    pub fn once(
        &self,
        event: &str,
        key: &str,
        listener: impl Fn(&P) + 'static,
    ) -> Result<(), BusError> {
        Self::require_key(event, key)?;
        let scoped = self.scoped_key(key);
        self.bus.once(event, &scoped, listener)?;
        self.remember(event, scoped);
        Ok(())
    }

    pub fn unsubscribe(&self, event: &str, key: &str) -> bool {
        let scoped = self.scoped_key(key);
        self.entries
            .borrow_mut()
            .retain(|(e, k)| !(e == event && *k == scoped));
        self.bus.unsubscribe(event, &scoped)
    }

    /// Number of subscriptions this group still tracks. `once` entries that
    /// already fired are counted until the group is disposed.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every subscription made through this group.
    pub fn dispose(&self) {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        for (event, key) in entries {
            self.bus.unsubscribe(&event, &key);
        }
    }

    fn remember(&self, event: &str, scoped: String) {
        let mut entries = self.entries.borrow_mut();
        if !entries.iter().any(|(e, k)| e == event && *k == scoped) {
            entries.push((event.to_string(), scoped));
        }
    }

    // The bus reports an empty key itself, but a scoped key is never empty,
    // so the check has to happen before scoping.
    fn require_key(event: &str, key: &str) -> Result<(), BusError> {
        if key.trim().is_empty() {
            tracing::warn!(event = %event, "group subscription without key");
            return Err(BusError::MissingKey {
                event: event.to_string(),
            });
        }
        Ok(())
    }
}

impl<P: 'static> Drop for SubscriptionGroup<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::schedule::ManualScheduler;
    use std::cell::Cell;
    use std::rc::Rc;

    fn bus() -> EventBus<i32> {
        EventBus::new(Rc::new(ManualScheduler::new()), BusConfig::default())
    }

    #[test]
    fn keys_are_scoped_by_owner() {
        let bus = bus();
        let a = SubscriptionGroup::new(&bus, "a");
        let b = SubscriptionGroup::new(&bus, "b");

        a.subscribe("e", "render", |_| {}).unwrap();
        b.subscribe("e", "render", |_| {}).unwrap();

        assert_eq!(bus.listener_keys("e"), vec!["a:render", "b:render"]);
    }

    #[test]
    fn dispose_releases_only_own_subscriptions() {
        let bus = bus();
        let hits = Rc::new(Cell::new(0));

        let group = SubscriptionGroup::new(&bus, "panel");
        let h = hits.clone();
        group.subscribe("e", "k", move |v| h.set(h.get() + v)).unwrap();
        group.once("e", "first", |_| {}).unwrap();
        bus.subscribe("e", "outsider", |_| {}).unwrap();
        assert_eq!(group.len(), 2);

        bus.publish("e", &2);
        assert_eq!(hits.get(), 2);

        group.dispose();
        assert!(group.is_empty());
        assert_eq!(bus.listener_keys("e"), vec!["outsider"]);

        bus.publish("e", &2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn resubscribing_does_not_duplicate_tracking() {
        let bus = bus();
        let group = SubscriptionGroup::new(&bus, "g");
        group.subscribe("e", "k", |_| {}).unwrap();
        group.subscribe("e", "k", |_| {}).unwrap();
        assert_eq!(group.len(), 1);

        assert!(group.unsubscribe("e", "k"));
        assert!(group.is_empty());
        assert_eq!(bus.event_count(), 0);
    }

    #[test]
    fn empty_key_rejected_before_scoping() {
        let bus = bus();
        let group = SubscriptionGroup::new(&bus, "g");
        assert!(group.subscribe("e", "", |_| {}).is_err());
        assert_eq!(bus.event_count(), 0);
    }

    #[test]
    fn drop_disposes() {
        let bus = bus();
        {
            let group = SubscriptionGroup::new(&bus, "temp");
            group.subscribe("e", "k", |_| {}).unwrap();
            assert_eq!(bus.event_count(), 1);
        }
        assert_eq!(bus.event_count(), 0);
    }
}
