// ============================================================================
// chatmod-core - Watcher Registry
//
// One insertion watcher per namespace, owned by the composition root.
// A destroyed watcher removes itself, so the next get_or_create builds a
// fresh one.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::diagnostics::{DiagnosticSink, TracingSink};
use crate::core::error::WatcherError;
use crate::schedule::Scheduler;
use crate::watcher::config::WatcherConfig;
use crate::watcher::dom::Document;
use crate::watcher::insertion::InsertionWatcher;

struct RegistryInner<D: Document> {
    doc: D,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
    config: WatcherConfig,
    watchers: RefCell<HashMap<String, InsertionWatcher<D>>>,
}

/// Construct-or-fetch access to insertion watchers, keyed by namespace.
///
/// # Example
///
/// ```
/// use chatmod_core::schedule::ManualScheduler;
/// use chatmod_core::watcher::{VirtualDocument, WatcherRegistry};
/// use std::rc::Rc;
///
/// let registry = WatcherRegistry::new(VirtualDocument::new(), Rc::new(ManualScheduler::new()));
/// let a = registry.get_or_create("chatmod").unwrap();
/// let b = registry.get_or_create("chatmod").unwrap();
/// assert!(a.same_watcher(&b));
/// assert!(registry.get_or_create("1bad").is_err());
/// ```
pub struct WatcherRegistry<D: Document + Clone> {
    inner: Rc<RegistryInner<D>>,
}

impl<D: Document + Clone> Clone for WatcherRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Document + Clone> WatcherRegistry<D> {
    pub fn new(doc: D, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_options(doc, scheduler, WatcherConfig::default(), Rc::new(TracingSink))
    }

    /// Registry whose new watchers use `config` and report to `sink`.
    pub fn with_options(
        doc: D,
        scheduler: Rc<dyn Scheduler>,
        config: WatcherConfig,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                doc,
                scheduler,
                sink,
                config,
                watchers: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The watcher for `namespace`, created with the registry's options if
    /// it does not exist yet. An existing watcher is returned untouched.
    pub fn get_or_create(&self, namespace: &str) -> Result<InsertionWatcher<D>, WatcherError> {
        self.get_or_create_with(namespace, self.inner.config.clone())
    }

    /// Like [`get_or_create`](Self::get_or_create), with `config` used only
    /// if a new watcher has to be built.
    pub fn get_or_create_with(
        &self,
        namespace: &str,
        config: WatcherConfig,
    ) -> Result<InsertionWatcher<D>, WatcherError> {
        if let Some(existing) = self.get(namespace) {
            return Ok(existing);
        }

        let watcher = InsertionWatcher::with_options(
            namespace,
            self.inner.doc.clone(),
            self.inner.scheduler.clone(),
            config,
            self.inner.sink.clone(),
        )?;

        let registry: Weak<RegistryInner<D>> = Rc::downgrade(&self.inner);
        watcher.set_destroy_hook(Box::new(move |namespace: &str| {
            if let Some(registry) = registry.upgrade() {
                let removed = registry.watchers.borrow_mut().remove(namespace);
                drop(removed);
            }
        }));

        self.inner
            .watchers
            .borrow_mut()
            .insert(namespace.to_string(), watcher.clone());
        Ok(watcher)
    }

    pub fn get(&self, namespace: &str) -> Option<InsertionWatcher<D>> {
        self.inner.watchers.borrow().get(namespace).cloned()
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.inner.watchers.borrow().contains_key(namespace)
    }

    pub fn len(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every watcher.
    pub fn destroy_all(&self) {
        let watchers: Vec<InsertionWatcher<D>> = self
            .inner
            .watchers
            .borrow_mut()
            .drain()
            .map(|(_, w)| w)
            .collect();
        for watcher in watchers {
            watcher.destroy();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::{Diagnostic, RecordingSink};
    use crate::schedule::ManualScheduler;
    use crate::watcher::virtual_dom::VirtualDocument;

    fn registry() -> (VirtualDocument, WatcherRegistry<VirtualDocument>) {
        let doc = VirtualDocument::new();
        let registry = WatcherRegistry::new(doc.clone(), Rc::new(ManualScheduler::new()));
        (doc, registry)
    }

    #[test]
    fn one_watcher_per_namespace() {
        let (doc, registry) = registry();
        let a = registry.get_or_create("a").unwrap();
        let again = registry
            .get_or_create_with("a", WatcherConfig::default().with_max_poll_attempts(1))
            .unwrap();
        let b = registry.get_or_create("b").unwrap();

        assert!(a.same_watcher(&again));
        assert!(!a.same_watcher(&b));
        assert_eq!(registry.len(), 2);
        assert_eq!(doc.style_node_count(), 2);
    }

    #[test]
    fn destroyed_watcher_leaves_registry() {
        let (doc, registry) = registry();
        let a = registry.get_or_create("a").unwrap();
        a.destroy();

        assert!(!registry.contains("a"));
        let fresh = registry.get_or_create("a").unwrap();
        assert!(!fresh.same_watcher(&a));
        assert_eq!(doc.style_node_count(), 1);
    }

    #[test]
    fn invalid_namespace_is_reported_and_not_registered() {
        let sink = Rc::new(RecordingSink::new());
        let registry = WatcherRegistry::with_options(
            VirtualDocument::new(),
            Rc::new(ManualScheduler::new()),
            WatcherConfig::default(),
            sink.clone(),
        );

        assert_eq!(
            registry.get_or_create("-1").err(),
            Some(WatcherError::InvalidNamespace("-1".into()))
        );
        assert!(registry.is_empty());
        assert_eq!(sink.count(|d| matches!(d, Diagnostic::Watcher(_))), 1);
    }

    #[test]
    fn destroy_all_empties_the_document() {
        let (doc, registry) = registry();
        registry.get_or_create("a").unwrap();
        registry.get_or_create("b").unwrap();
        registry.destroy_all();

        assert!(registry.is_empty());
        assert_eq!(doc.style_node_count(), 0);
        assert_eq!(doc.animation_listener_count(), 0);
    }
}
