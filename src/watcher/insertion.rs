// ============================================================================
// chatmod-core - Insertion Watcher
//
// Selector-based insertion detection without a subtree mutation observer.
//
// For each selector:
//   @keyframes <ns>-sig-<n> { from {} to {} }
//   <selector> { animation-duration: 0.001s; animation-name: <ns>-sig-<n>; }
//
// The engine starts that animation on every element that begins matching,
// and one document-level animationstart listener maps the animation name
// back to the selector's callbacks.
//
// Lifecycle of a registration:
//   on()  -> active (rules installed) or pending (sheet not usable yet)
//   off() -> last callback gone: rules removed, maps cleared
//   readiness timeout -> pending registrations dropped
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use crate::core::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::core::error::{DomError, WatcherError};
use crate::core::types::guarded;
use crate::schedule::{Scheduler, TimerId};
use crate::watcher::config::WatcherConfig;
use crate::watcher::dom::{AnimationHandler, CssRule, Document, HostHandle, StyleSheet};
use crate::watcher::namespace::{signal_name, validate_namespace};

/// Callback invoked with each element that starts matching a selector.
///
/// Callbacks are compared by `Rc` identity: registering the same `Rc` twice
/// is a no-op, and [`InsertionWatcher::off`] needs the `Rc` that was passed
/// to [`InsertionWatcher::on`].
pub type InsertionCallback<E> = Rc<dyn Fn(&E)>;

pub(crate) type DestroyHook = Box<dyn FnOnce(&str)>;

struct Registration<E> {
    signal: String,
    callbacks: Vec<InsertionCallback<E>>,
    /// Rules are installed in the sheet.
    active: bool,
}

struct WatcherState<D: Document> {
    sheet: Option<Rc<D::Sheet>>,
    registrations: HashMap<String, Registration<D::Element>>,
    /// signal -> selector
    signals: HashMap<String, String>,
    /// Selectors waiting for the sheet, in registration order.
    pending: IndexSet<String>,
    next_signal: u64,

    listener: Option<HostHandle>,
    observer: Option<HostHandle>,

    polling: bool,
    poll_epoch: u64,
    poll_timer: Option<TimerId>,
    attempts: u32,

    suspended: bool,
    destroyed: bool,
}

struct WatcherInner<D: Document> {
    namespace: String,
    doc: D,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
    config: WatcherConfig,
    state: RefCell<WatcherState<D>>,
    on_destroy: RefCell<Option<DestroyHook>>,
}

/// Detects element insertions for registered selectors.
///
/// Cloning yields another handle to the same watcher. Use a
/// [`WatcherRegistry`](super::WatcherRegistry) to share one watcher per
/// namespace.
///
/// # Example
///
/// ```
/// use chatmod_core::schedule::ManualScheduler;
/// use chatmod_core::watcher::{InsertionWatcher, VirtualDocument, VirtualElement};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let doc = VirtualDocument::new();
/// let watcher =
///     InsertionWatcher::new("demo", doc.clone(), Rc::new(ManualScheduler::new())).unwrap();
///
/// let seen = Rc::new(Cell::new(0));
/// let s = seen.clone();
/// watcher
///     .on("div.msg", Rc::new(move |_: &VirtualElement| s.set(s.get() + 1)))
///     .unwrap();
///
/// doc.append(VirtualElement::new("div").with_class("msg"));
/// doc.flush_animations();
/// assert_eq!(seen.get(), 1);
/// ```
pub struct InsertionWatcher<D: Document> {
    inner: Rc<WatcherInner<D>>,
}

impl<D: Document> Clone for InsertionWatcher<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Document> InsertionWatcher<D> {
    /// Watcher with default options reporting through `tracing`.
    pub fn new(
        namespace: &str,
        doc: D,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self, WatcherError> {
        Self::with_options(
            namespace,
            doc,
            scheduler,
            WatcherConfig::default(),
            Rc::new(TracingSink),
        )
    }

    /// Validate `namespace`, install the document listener and start
    /// waiting for a root if the document has none yet.
    pub fn with_options(
        namespace: &str,
        doc: D,
        scheduler: Rc<dyn Scheduler>,
        config: WatcherConfig,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Result<Self, WatcherError> {
        if let Err(err) = validate_namespace(namespace) {
            sink.report(Diagnostic::Watcher(err.clone()));
            return Err(err);
        }

        let inner = Rc::new(WatcherInner {
            namespace: namespace.to_string(),
            doc,
            scheduler,
            sink,
            config,
            state: RefCell::new(WatcherState {
                sheet: None,
                registrations: HashMap::new(),
                signals: HashMap::new(),
                pending: IndexSet::new(),
                next_signal: 0,
                listener: None,
                observer: None,
                polling: false,
                poll_epoch: 0,
                poll_timer: None,
                attempts: 0,
                suspended: false,
                destroyed: false,
            }),
            on_destroy: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let handler: AnimationHandler<D::Element> =
            Rc::new(move |name: &str, element: &D::Element| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(name, element);
                }
            });
        let listener = inner.doc.add_animation_listener(handler);
        inner.state.borrow_mut().listener = Some(listener);

        if inner.doc.has_root() {
            inner.ensure_sheet();
        } else {
            let weak = Rc::downgrade(&inner);
            let observer = inner.doc.observe_root(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.root_available();
                }
            }));
            inner.state.borrow_mut().observer = Some(observer);
        }

        tracing::debug!(namespace = %namespace, "insertion watcher created");
        Ok(Self { inner })
    }

    pub(crate) fn set_destroy_hook(&self, hook: DestroyHook) {
        *self.inner.on_destroy.borrow_mut() = Some(hook);
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Call `callback` with every element that starts matching `selector`.
    ///
    /// Idempotent per `(selector, callback)`. A new selector gets its own
    /// signal and two rules; if the style rule is rejected the keyframes
    /// rule is removed again and nothing is recorded. If the stylesheet is
    /// not usable yet the selector waits in the pending set and is
    /// installed once it is.
    pub fn on(
        &self,
        selector: &str,
        callback: InsertionCallback<D::Element>,
    ) -> Result<(), WatcherError> {
        let inner = &self.inner;
        if inner.state.borrow().destroyed {
            return Err(inner.fail(WatcherError::Destroyed(inner.namespace.clone())));
        }
        if selector.trim().is_empty() {
            return Err(inner.fail(WatcherError::RuleInsertion {
                selector: selector.to_string(),
                source: DomError::InvalidSelector(selector.to_string()),
            }));
        }

        {
            let mut state = inner.state.borrow_mut();
            if let Some(reg) = state.registrations.get_mut(selector) {
                if !reg.callbacks.iter().any(|cb| Rc::ptr_eq(cb, &callback)) {
                    reg.callbacks.push(callback);
                }
                return Ok(());
            }
        }

        let signal = {
            let mut state = inner.state.borrow_mut();
            state.next_signal += 1;
            signal_name(&inner.namespace, state.next_signal)
        };

        match inner.ready_sheet() {
            Some(sheet) => {
                inner.flush_pending(&sheet);
                if let Err(source) = inner.install(&sheet, selector, &signal) {
                    return Err(inner.fail(WatcherError::RuleInsertion {
                        selector: selector.to_string(),
                        source,
                    }));
                }
                inner.record(selector, signal, callback, true);
                tracing::debug!(selector = %selector, "selector registered");
            }
            None => {
                inner.record(selector, signal, callback, false);
                inner.state.borrow_mut().pending.insert(selector.to_string());
                tracing::debug!(selector = %selector, "selector pending until stylesheet is ready");
                if inner.doc.has_root() {
                    inner.start_polling();
                }
            }
        }
        Ok(())
    }

    /// Remove `callback` from `selector`. When it was the last one, the
    /// selector's rules are deleted and the registration is forgotten.
    ///
    /// Returns whether the callback was registered.
    pub fn off(&self, selector: &str, callback: &InsertionCallback<D::Element>) -> bool {
        let inner = &self.inner;
        let (dropped, removed, nothing_pending) = {
            let mut state = inner.state.borrow_mut();
            let Some(reg) = state.registrations.get_mut(selector) else {
                return false;
            };
            let Some(pos) = reg.callbacks.iter().position(|cb| Rc::ptr_eq(cb, callback)) else {
                return false;
            };
            let dropped = reg.callbacks.swap_remove(pos);
            if reg.callbacks.is_empty() {
                let reg = state.registrations.remove(selector);
                state.pending.shift_remove(selector);
                if let Some(reg) = &reg {
                    state.signals.remove(&reg.signal);
                }
                let nothing_pending = state.polling && state.pending.is_empty();
                let removed = reg.map(|reg| (reg.signal, reg.active, state.sheet.clone()));
                (dropped, Some(removed), nothing_pending)
            } else {
                (dropped, None, false)
            }
        };
        drop(dropped);

        let Some(removed) = removed else {
            return true;
        };
        if nothing_pending {
            inner.stop_polling();
        }
        if let Some((signal, true, Some(sheet))) = removed {
            inner.remove_rules(&sheet, &signal);
        }
        tracing::debug!(selector = %selector, "selector unregistered");
        true
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Stop all signals by disabling the owned stylesheet.
    pub fn suspend(&self) {
        let sheet = {
            let mut state = self.inner.state.borrow_mut();
            state.suspended = true;
            state.sheet.clone()
        };
        if let Some(sheet) = sheet {
            sheet.set_disabled(true);
        }
    }

    /// Re-enable the stylesheet and re-acquire its live rule list. Elements
    /// that match while the sheet comes back start their animation again.
    pub fn resume(&self) {
        let sheet = {
            let mut state = self.inner.state.borrow_mut();
            state.suspended = false;
            state.sheet.clone()
        };
        if let Some(sheet) = sheet {
            sheet.set_disabled(false);
            sheet.reacquire();
        }
    }

    /// Tear everything down: listener, root observer, readiness poll, style
    /// node and every registration. The watcher leaves its registry and
    /// every later `on` fails with [`WatcherError::Destroyed`].
    pub fn destroy(&self) {
        if self.inner.state.borrow().destroyed {
            return;
        }
        self.inner.teardown();
        let hook = self.inner.on_destroy.borrow_mut().take();
        if let Some(hook) = hook {
            hook(&self.inner.namespace);
        }
        tracing::debug!(namespace = %self.inner.namespace, "insertion watcher destroyed");
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Whether both handles refer to the same watcher.
    pub fn same_watcher(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Animation name allocated to `selector`.
    pub fn signal_for(&self, selector: &str) -> Option<String> {
        self.inner
            .state
            .borrow()
            .registrations
            .get(selector)
            .map(|reg| reg.signal.clone())
    }

    /// Whether `selector` has its rules installed.
    pub fn is_active(&self, selector: &str) -> bool {
        self.inner
            .state
            .borrow()
            .registrations
            .get(selector)
            .is_some_and(|reg| reg.active)
    }

    /// Whether `selector` is waiting for the stylesheet.
    pub fn is_pending(&self, selector: &str) -> bool {
        self.inner.state.borrow().pending.contains(selector)
    }

    /// Registered selectors, active or pending.
    pub fn selector_count(&self) -> usize {
        self.inner.state.borrow().registrations.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn callback_count(&self, selector: &str) -> usize {
        self.inner
            .state
            .borrow()
            .registrations
            .get(selector)
            .map_or(0, |reg| reg.callbacks.len())
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.borrow().polling
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.borrow().suspended
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    /// The owned stylesheet, once created.
    pub fn sheet(&self) -> Option<Rc<D::Sheet>> {
        self.inner.state.borrow().sheet.clone()
    }
}

// =============================================================================
// INTERNALS
// =============================================================================

impl<D: Document> WatcherInner<D> {
    fn fail(&self, err: WatcherError) -> WatcherError {
        self.sink.report(Diagnostic::Watcher(err.clone()));
        err
    }

    fn record(
        &self,
        selector: &str,
        signal: String,
        callback: InsertionCallback<D::Element>,
        active: bool,
    ) {
        let mut state = self.state.borrow_mut();
        state.signals.insert(signal.clone(), selector.to_string());
        state.registrations.insert(
            selector.to_string(),
            Registration {
                signal,
                callbacks: vec![callback],
                active,
            },
        );
    }

    fn dispatch(&self, name: &str, element: &D::Element) {
        let (selector, callbacks) = {
            let state = self.state.borrow();
            let Some(selector) = state.signals.get(name) else {
                return;
            };
            let Some(reg) = state.registrations.get(selector) else {
                return;
            };
            (selector.clone(), reg.callbacks.clone())
        };

        tracing::trace!(selector = %selector, callbacks = callbacks.len(), "insertion");
        for callback in callbacks {
            if let Err(message) = guarded(|| callback(element)) {
                self.sink.report(Diagnostic::InsertionCallbackPanicked {
                    selector: selector.clone(),
                    message,
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    fn install(&self, sheet: &D::Sheet, selector: &str, signal: &str) -> Result<(), DomError> {
        let len = sheet.len()?;
        let keyframes_at = sheet.insert_rule(&CssRule::signal_keyframes(signal), len)?;
        let style = CssRule::signal_style(selector, signal, &self.config.animation_duration);
        if let Err(err) = sheet.insert_rule(&style, keyframes_at + 1) {
            if let Err(cleanup) = sheet.delete_rule(keyframes_at) {
                tracing::warn!(selector = %selector, error = %cleanup, "rollback of keyframes rule failed");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Delete every rule carrying `signal`, scanning from the end so indices
    /// stay valid.
    fn remove_rules(&self, sheet: &D::Sheet, signal: &str) {
        let rules = match sheet.rules() {
            Ok(rules) => rules,
            Err(err) => {
                tracing::warn!(signal = %signal, error = %err, "cannot read rules for removal");
                return;
            }
        };
        for (index, rule) in rules.iter().enumerate().rev() {
            if rule.carries_signal(signal) {
                if let Err(err) = sheet.delete_rule(index) {
                    tracing::warn!(signal = %signal, error = %err, "rule removal failed");
                }
            }
        }
    }

    /// Install every pending selector into a usable sheet.
    fn flush_pending(&self, sheet: &D::Sheet) {
        let pending: Vec<(String, String)> = {
            let mut state = self.state.borrow_mut();
            let selectors: Vec<String> = state.pending.drain(..).collect();
            selectors
                .into_iter()
                .filter_map(|sel| {
                    let signal = state.registrations.get(&sel)?.signal.clone();
                    Some((sel, signal))
                })
                .collect()
        };

        for (selector, signal) in pending {
            match self.install(sheet, &selector, &signal) {
                Ok(()) => {
                    if let Some(reg) = self.state.borrow_mut().registrations.get_mut(&selector) {
                        reg.active = true;
                    }
                    tracing::debug!(selector = %selector, "pending selector installed");
                }
                Err(source) => {
                    let dropped = {
                        let mut state = self.state.borrow_mut();
                        state.signals.remove(&signal);
                        state.registrations.remove(&selector)
                    };
                    drop(dropped);
                    self.fail(WatcherError::RuleInsertion { selector, source });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Stylesheet readiness
    // -------------------------------------------------------------------------

    /// Create the owned style node if the document has a root and it does
    /// not exist yet.
    fn ensure_sheet(&self) -> Option<Rc<D::Sheet>> {
        {
            let state = self.state.borrow();
            if state.destroyed {
                return None;
            }
            if let Some(sheet) = &state.sheet {
                return Some(sheet.clone());
            }
        }
        if !self.doc.has_root() {
            return None;
        }

        match self.doc.create_sheet(&self.namespace) {
            Ok(sheet) => {
                let sheet = Rc::new(sheet);
                let suspended = {
                    let mut state = self.state.borrow_mut();
                    state.sheet = Some(sheet.clone());
                    state.suspended
                };
                if suspended {
                    sheet.set_disabled(true);
                }
                tracing::debug!(namespace = %self.namespace, "style node attached");
                Some(sheet)
            }
            Err(err) => {
                self.fail(WatcherError::StyleNode(err));
                None
            }
        }
    }

    fn ready_sheet(&self) -> Option<Rc<D::Sheet>> {
        self.ensure_sheet().filter(|sheet| sheet.is_ready())
    }

    fn root_available(self: &Rc<Self>) {
        let observer = self.state.borrow_mut().observer.take();
        if let Some(observer) = observer {
            self.doc.disconnect_observer(observer);
        }
        self.ensure_sheet();
        if !self.state.borrow().pending.is_empty() {
            self.start_polling();
        }
    }

    /// Begin readiness checks: the first on the next frame, then one every
    /// `poll_interval`.
    fn start_polling(self: &Rc<Self>) {
        let epoch = {
            let mut state = self.state.borrow_mut();
            if state.polling || state.destroyed {
                return;
            }
            state.polling = true;
            state.attempts = 0;
            state.poll_epoch += 1;
            state.poll_epoch
        };
        let weak = Rc::downgrade(self);
        self.scheduler.request_frame(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.poll(epoch);
            }
        }));
    }

    fn stop_polling(&self) {
        let timer = {
            let mut state = self.state.borrow_mut();
            state.polling = false;
            state.attempts = 0;
            state.poll_epoch += 1;
            state.poll_timer.take()
        };
        if let Some(timer) = timer {
            self.scheduler.clear_timeout(timer);
        }
    }

    fn poll(self: &Rc<Self>, epoch: u64) {
        {
            let mut state = self.state.borrow_mut();
            if state.destroyed || !state.polling || state.poll_epoch != epoch {
                return;
            }
            state.poll_timer = None;
        }

        if self.state.borrow().pending.is_empty() {
            self.stop_polling();
            return;
        }

        if let Some(sheet) = self.ready_sheet() {
            self.stop_polling();
            self.flush_pending(&sheet);
            return;
        }

        let attempts = {
            let mut state = self.state.borrow_mut();
            state.attempts += 1;
            state.attempts
        };

        if attempts >= self.config.max_poll_attempts {
            self.stop_polling();
            let selectors: Vec<String> = {
                let mut state = self.state.borrow_mut();
                let selectors: Vec<String> = state.pending.drain(..).collect();
                for selector in &selectors {
                    if let Some(reg) = state.registrations.remove(selector) {
                        state.signals.remove(&reg.signal);
                    }
                }
                selectors
            };
            self.fail(WatcherError::ReadinessTimeout {
                attempts,
                selectors,
            });
            return;
        }

        let weak: Weak<Self> = Rc::downgrade(self);
        let timer = self.scheduler.set_timeout(
            self.config.poll_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.poll(epoch);
                }
            }),
        );
        self.state.borrow_mut().poll_timer = Some(timer);
    }

    fn teardown(&self) {
        let (listener, observer, timer, sheet, registrations) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.polling = false;
            state.poll_epoch += 1;
            state.signals.clear();
            state.pending.clear();
            (
                state.listener.take(),
                state.observer.take(),
                state.poll_timer.take(),
                state.sheet.take(),
                std::mem::take(&mut state.registrations),
            )
        };

        if let Some(listener) = listener {
            self.doc.remove_animation_listener(listener);
        }
        if let Some(observer) = observer {
            self.doc.disconnect_observer(observer);
        }
        if let Some(timer) = timer {
            self.scheduler.clear_timeout(timer);
        }
        if let Some(sheet) = sheet {
            sheet.remove();
        }
        drop(registrations);
    }
}

impl<D: Document> Drop for WatcherInner<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::RecordingSink;
    use crate::schedule::ManualScheduler;
    use crate::watcher::virtual_dom::{VirtualDocument, VirtualElement};
    use std::cell::Cell;
    use std::time::Duration;

    struct Fixture {
        doc: VirtualDocument,
        sched: ManualScheduler,
        sink: Rc<RecordingSink>,
        watcher: InsertionWatcher<VirtualDocument>,
    }

    fn fixture_with(doc: VirtualDocument, config: WatcherConfig) -> Fixture {
        let sched = ManualScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let watcher = InsertionWatcher::with_options(
            "t",
            doc.clone(),
            Rc::new(sched.clone()),
            config,
            sink.clone(),
        )
        .unwrap();
        Fixture {
            doc,
            sched,
            sink,
            watcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(VirtualDocument::new(), WatcherConfig::default())
    }

    fn counter() -> (Rc<Cell<u32>>, InsertionCallback<VirtualElement>) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        (hits, Rc::new(move |_: &VirtualElement| h.set(h.get() + 1)))
    }

    fn rule_count(f: &Fixture) -> usize {
        f.watcher.sheet().unwrap().len().unwrap()
    }

    #[test]
    fn on_installs_two_rules_and_dispatches() {
        let f = fixture();
        let (hits, cb) = counter();
        f.watcher.on("div.msg", cb).unwrap();

        assert_eq!(f.watcher.signal_for("div.msg").as_deref(), Some("t-sig-1"));
        assert!(f.watcher.is_active("div.msg"));
        assert_eq!(rule_count(&f), 2);

        f.doc.append(VirtualElement::new("div").with_class("msg"));
        f.doc.append(VirtualElement::new("div"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn on_is_idempotent_per_callback() {
        let f = fixture();
        let (hits, cb) = counter();
        f.watcher.on("p", cb.clone()).unwrap();
        f.watcher.on("p", cb).unwrap();

        assert_eq!(f.watcher.callback_count("p"), 1);
        assert_eq!(rule_count(&f), 2);

        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn last_off_restores_rule_count() {
        let f = fixture();
        let (_, a) = counter();
        let (_, b) = counter();
        f.watcher.on("p", a.clone()).unwrap();
        f.watcher.on("p", b.clone()).unwrap();

        assert!(f.watcher.off("p", &a));
        assert_eq!(rule_count(&f), 2);
        assert!(f.watcher.off("p", &b));
        assert_eq!(rule_count(&f), 0);
        assert_eq!(f.watcher.selector_count(), 0);
        assert!(!f.watcher.off("p", &b));
    }

    #[test]
    fn rejected_style_rule_rolls_back_keyframes() {
        let f = fixture();
        let (_, cb) = counter();
        let err = f.watcher.on("div[", cb).unwrap_err();

        assert!(matches!(err, WatcherError::RuleInsertion { .. }));
        assert_eq!(rule_count(&f), 0);
        assert_eq!(f.watcher.selector_count(), 0);
        assert_eq!(f.sink.count(|d| matches!(d, Diagnostic::Watcher(_))), 1);
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let f = fixture();
        let (hits, good) = counter();
        fn explode(_: &VirtualElement) {
            panic!("boom");
        }
        let bad: InsertionCallback<VirtualElement> = Rc::new(explode);
        f.watcher.on("p", bad).unwrap();
        f.watcher.on("p", good).unwrap();

        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();

        assert_eq!(hits.get(), 1);
        assert_eq!(
            f.sink.count(|d| matches!(d, Diagnostic::InsertionCallbackPanicked { .. })),
            1
        );
    }

    #[test]
    fn deferred_sheet_flushes_pending_on_poll() {
        let f = fixture_with(
            VirtualDocument::with_deferred_sheets(),
            WatcherConfig::default(),
        );
        let (hits, cb) = counter();
        f.watcher.on("p", cb).unwrap();
        assert!(f.watcher.is_pending("p"));
        assert!(f.watcher.is_polling());

        f.sched.run_frame();
        assert!(f.watcher.is_pending("p"));

        f.doc.set_sheets_ready(true);
        f.sched.advance(Duration::from_millis(50));
        assert!(f.watcher.is_active("p"));
        assert!(!f.watcher.is_polling());

        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn readiness_timeout_drops_pending_selectors() {
        let f = fixture_with(
            VirtualDocument::with_deferred_sheets(),
            WatcherConfig::default().with_max_poll_attempts(3),
        );
        let (_, cb) = counter();
        f.watcher.on("p", cb.clone()).unwrap();

        f.sched.run_frame();
        f.sched.advance(Duration::from_millis(100));

        assert_eq!(f.watcher.selector_count(), 0);
        assert!(!f.watcher.is_polling());
        let timeouts = f.sink.count(|d| {
            matches!(
                d,
                Diagnostic::Watcher(WatcherError::ReadinessTimeout { attempts: 3, selectors })
                    if selectors == &vec!["p".to_string()]
            )
        });
        assert_eq!(timeouts, 1);

        // The watcher stays usable.
        f.doc.set_sheets_ready(true);
        f.watcher.on("p", cb).unwrap();
        assert!(f.watcher.is_active("p"));
    }

    #[test]
    fn removing_last_pending_selector_stops_polling_quietly() {
        let f = fixture_with(
            VirtualDocument::with_deferred_sheets(),
            WatcherConfig::default().with_max_poll_attempts(3),
        );
        let (_, p) = counter();
        let (_, li) = counter();
        f.watcher.on("p", p.clone()).unwrap();
        f.watcher.on("li", li.clone()).unwrap();

        assert!(f.watcher.off("p", &p));
        assert!(f.watcher.is_polling(), "li is still waiting");

        assert!(f.watcher.off("li", &li));
        assert!(!f.watcher.is_polling());
        assert_eq!(f.watcher.pending_count(), 0);

        f.sched.run_until_idle();
        assert!(f.sink.is_empty());
        assert_eq!(f.sched.pending_timers(), 0);
    }

    #[test]
    fn waits_for_root_before_creating_sheet() {
        let f = fixture_with(VirtualDocument::without_root(), WatcherConfig::default());
        let (hits, cb) = counter();
        f.watcher.on("p", cb).unwrap();
        assert!(f.watcher.sheet().is_none());
        assert!(!f.watcher.is_polling());

        f.doc.attach_root();
        assert!(f.watcher.sheet().is_some());
        assert_eq!(f.doc.root_observer_count(), 0);

        f.sched.run_frame();
        assert!(f.watcher.is_active("p"));

        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn suspend_silences_and_resume_reannounces() {
        let f = fixture();
        let (hits, cb) = counter();
        f.watcher.on("p", cb).unwrap();

        f.watcher.suspend();
        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 0);

        f.watcher.resume();
        f.doc.flush_animations();
        assert_eq!(hits.get(), 1);
        assert_eq!(f.watcher.sheet().unwrap().reacquire_count(), 1);
    }

    #[test]
    fn destroy_releases_everything() {
        let f = fixture();
        let (hits, cb) = counter();
        f.watcher.on("p", cb.clone()).unwrap();
        f.watcher.destroy();

        assert_eq!(f.doc.style_node_count(), 0);
        assert_eq!(f.doc.animation_listener_count(), 0);
        assert!(f.watcher.is_destroyed());
        assert_eq!(
            f.watcher.on("p", cb),
            Err(WatcherError::Destroyed("t".into()))
        );

        f.doc.append(VirtualElement::new("p"));
        f.doc.flush_animations();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn dropping_last_handle_cleans_up() {
        let f = fixture();
        let doc = f.doc.clone();
        drop(f);
        assert_eq!(doc.style_node_count(), 0);
        assert_eq!(doc.animation_listener_count(), 0);
    }
}
