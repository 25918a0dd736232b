// ============================================================================
// chatmod-core - Virtual Document
//
// In-memory model of the parts of a browser document the insertion watcher
// relies on, for tests and headless hosts:
//
// - a document root that may appear late (observe_root)
// - style sheets that may not be usable right away (deferred readiness)
// - rule insertion that rejects selectors the engine cannot parse
// - animations that start when an element begins matching a style rule
//   whose animation-name has @keyframes in a live sheet, delivered
//   asynchronously like real animationstart events (flush_animations)
//
// Toggling a sheet or deleting a rule stops its animations; when they apply
// again they start again, as in a browser.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};

use crate::core::error::DomError;
use crate::core::types::Task;
use crate::watcher::dom::{AnimationHandler, CssRule, Document, HostHandle, StyleSheet};
use crate::watcher::selector::SelectorList;

// =============================================================================
// ELEMENT
// =============================================================================

#[derive(Debug, Clone)]
struct ElementData {
    uid: u64,
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, String)>,
}

thread_local! {
    static NEXT_ELEMENT_UID: Cell<u64> = const { Cell::new(0) };
}

/// An element of the virtual document. Clones refer to the same element.
#[derive(Debug, Clone)]
pub struct VirtualElement {
    data: Rc<ElementData>,
}

impl PartialEq for VirtualElement {
    fn eq(&self, other: &Self) -> bool {
        self.data.uid == other.data.uid
    }
}

impl Eq for VirtualElement {}

impl VirtualElement {
    pub fn new(tag: &str) -> Self {
        let uid = NEXT_ELEMENT_UID.with(|n| {
            n.set(n.get() + 1);
            n.get()
        });
        Self {
            data: Rc::new(ElementData {
                uid,
                tag: tag.to_string(),
                id: None,
                classes: Vec::new(),
                attributes: Vec::new(),
            }),
        }
    }

    // Builders are meant for elements that have not been shared yet.
    fn edit(&mut self) -> &mut ElementData {
        Rc::make_mut(&mut self.data)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.edit().id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.edit().classes.push(class.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.edit()
            .attributes
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn uid(&self) -> u64 {
        self.data.uid
    }

    pub fn tag(&self) -> &str {
        &self.data.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.data.id.as_deref()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.data.classes.iter().any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.data
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

// =============================================================================
// DOCUMENT STATE
// =============================================================================

struct SheetData {
    owner: String,
    rules: RefCell<Vec<CssRule>>,
    ready: Cell<bool>,
    disabled: Cell<bool>,
    removed: Cell<bool>,
    reacquired: Cell<u32>,
}

impl SheetData {
    fn is_live(&self) -> bool {
        self.ready.get() && !self.disabled.get() && !self.removed.get()
    }
}

#[derive(Default)]
struct DocState {
    has_root: bool,
    sheets_ready: bool,
    next_handle: u64,
    observers: Vec<(u64, Task)>,
    listeners: Vec<(u64, AnimationHandler<VirtualElement>)>,
    sheets: Vec<Rc<SheetData>>,
    elements: Vec<VirtualElement>,
    running: HashSet<(u64, String)>,
    queued: VecDeque<(String, VirtualElement)>,
}

impl DocState {
    fn alloc_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Recompute which animations run on which elements and queue a start
    /// event for every animation that was not running before.
    fn restyle(&mut self) {
        let live: Vec<&Rc<SheetData>> = self.sheets.iter().filter(|s| s.is_live()).collect();

        let keyframes: HashSet<String> = live
            .iter()
            .flat_map(|s| s.rules.borrow().clone())
            .filter_map(|rule| match rule {
                CssRule::Keyframes { name } => Some(name),
                _ => None,
            })
            .collect();

        let animated: Vec<(SelectorList, String)> = live
            .iter()
            .flat_map(|s| s.rules.borrow().clone())
            .filter_map(|rule| match rule {
                CssRule::Style {
                    selector,
                    animation_name: Some(name),
                    ..
                } if keyframes.contains(&name) => {
                    SelectorList::parse(&selector).ok().map(|sel| (sel, name))
                }
                _ => None,
            })
            .collect();

        let mut running = HashSet::new();
        for el in &self.elements {
            for (selector, name) in &animated {
                if selector.matches(el) {
                    let key = (el.uid(), name.clone());
                    if !self.running.contains(&key) {
                        self.queued.push_back((name.clone(), el.clone()));
                    }
                    running.insert(key);
                }
            }
        }
        self.running = running;
    }
}

struct DocInner {
    state: RefCell<DocState>,
}

impl DocInner {
    fn restyle(&self) {
        self.state.borrow_mut().restyle();
    }
}

// =============================================================================
// VIRTUAL DOCUMENT
// =============================================================================

/// In-memory [`Document`]. Cloning yields another handle to the same
/// document.
///
/// # Example
///
/// ```
/// use chatmod_core::watcher::{VirtualDocument, VirtualElement};
///
/// let doc = VirtualDocument::new();
/// doc.append(VirtualElement::new("div").with_class("msg"));
/// assert_eq!(doc.element_count(), 1);
/// ```
#[derive(Clone)]
pub struct VirtualDocument {
    inner: Rc<DocInner>,
}

impl Default for VirtualDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDocument {
    /// Document with a root whose sheets are usable immediately.
    pub fn new() -> Self {
        Self::build(true, true)
    }

    /// Document still being parsed: no root yet.
    pub fn without_root() -> Self {
        Self::build(false, true)
    }

    /// Document whose sheets stay unusable until [`set_sheets_ready`](Self::set_sheets_ready).
    pub fn with_deferred_sheets() -> Self {
        Self::build(true, false)
    }

    fn build(has_root: bool, sheets_ready: bool) -> Self {
        Self {
            inner: Rc::new(DocInner {
                state: RefCell::new(DocState {
                    has_root,
                    sheets_ready,
                    ..DocState::default()
                }),
            }),
        }
    }

    /// Create the root and run every root observer once.
    pub fn attach_root(&self) {
        let observers = {
            let mut state = self.inner.state.borrow_mut();
            state.has_root = true;
            std::mem::take(&mut state.observers)
        };
        for (_, task) in observers {
            task();
        }
    }

    /// Make every current and future sheet usable (or not).
    pub fn set_sheets_ready(&self, ready: bool) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.sheets_ready = ready;
            for sheet in &state.sheets {
                sheet.ready.set(ready);
            }
        }
        self.inner.restyle();
    }

    /// Insert an element.
    pub fn append(&self, element: VirtualElement) {
        let mut state = self.inner.state.borrow_mut();
        state.elements.push(element);
        state.restyle();
    }

    /// Remove an element. Its running animations end.
    pub fn remove_element(&self, element: &VirtualElement) {
        let mut state = self.inner.state.borrow_mut();
        state.elements.retain(|e| e != element);
        state.restyle();
    }

    pub fn element_count(&self) -> usize {
        self.inner.state.borrow().elements.len()
    }

    /// Deliver queued `animationstart` events to the listeners. Returns the
    /// number of events delivered. Events raised by listeners are delivered
    /// in the same call.
    pub fn flush_animations(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inner.state.borrow_mut().queued.pop_front();
            let Some((name, element)) = next else {
                break;
            };
            let listeners: Vec<AnimationHandler<VirtualElement>> = self
                .inner
                .state
                .borrow()
                .listeners
                .iter()
                .map(|(_, h)| h.clone())
                .collect();
            for listener in listeners {
                listener(&name, &element);
            }
            delivered += 1;
        }
        delivered
    }

    /// Animation start events waiting for [`flush_animations`](Self::flush_animations).
    pub fn pending_animations(&self) -> usize {
        self.inner.state.borrow().queued.len()
    }

    /// `<style>` nodes currently in the document.
    pub fn style_node_count(&self) -> usize {
        self.inner
            .state
            .borrow()
            .sheets
            .iter()
            .filter(|s| !s.removed.get())
            .count()
    }

    /// Owners of the `<style>` nodes currently in the document.
    pub fn style_node_owners(&self) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .sheets
            .iter()
            .filter(|s| !s.removed.get())
            .map(|s| s.owner.clone())
            .collect()
    }

    pub fn animation_listener_count(&self) -> usize {
        self.inner.state.borrow().listeners.len()
    }

    pub fn root_observer_count(&self) -> usize {
        self.inner.state.borrow().observers.len()
    }
}

impl Document for VirtualDocument {
    type Element = VirtualElement;
    type Sheet = VirtualSheet;

    fn has_root(&self) -> bool {
        self.inner.state.borrow().has_root
    }

    fn observe_root(&self, on_root: Task) -> HostHandle {
        let mut state = self.inner.state.borrow_mut();
        let handle = state.alloc_handle();
        state.observers.push((handle, on_root));
        HostHandle(handle)
    }

    fn disconnect_observer(&self, handle: HostHandle) {
        let removed: Vec<(u64, Task)> = {
            let mut state = self.inner.state.borrow_mut();
            let (gone, kept) = std::mem::take(&mut state.observers)
                .into_iter()
                .partition(|(h, _)| *h == handle.0);
            state.observers = kept;
            gone
        };
        drop(removed);
    }

    fn create_sheet(&self, owner: &str) -> Result<VirtualSheet, DomError> {
        let mut state = self.inner.state.borrow_mut();
        if !state.has_root {
            return Err(DomError::Host("document has no root".to_string()));
        }
        let data = Rc::new(SheetData {
            owner: owner.to_string(),
            rules: RefCell::new(Vec::new()),
            ready: Cell::new(state.sheets_ready),
            disabled: Cell::new(false),
            removed: Cell::new(false),
            reacquired: Cell::new(0),
        });
        state.sheets.push(data.clone());
        Ok(VirtualSheet {
            data,
            doc: Rc::downgrade(&self.inner),
        })
    }

    fn add_animation_listener(&self, handler: AnimationHandler<VirtualElement>) -> HostHandle {
        let mut state = self.inner.state.borrow_mut();
        let handle = state.alloc_handle();
        state.listeners.push((handle, handler));
        HostHandle(handle)
    }

    fn remove_animation_listener(&self, handle: HostHandle) {
        let removed: Vec<(u64, AnimationHandler<VirtualElement>)> = {
            let mut state = self.inner.state.borrow_mut();
            let (gone, kept) = std::mem::take(&mut state.listeners)
                .into_iter()
                .partition(|(h, _)| *h == handle.0);
            state.listeners = kept;
            gone
        };
        drop(removed);
    }
}

// =============================================================================
// VIRTUAL SHEET
// =============================================================================

/// Stylesheet owned by one `<style>` node of a [`VirtualDocument`].
pub struct VirtualSheet {
    data: Rc<SheetData>,
    doc: Weak<DocInner>,
}

impl VirtualSheet {
    fn usable(&self) -> Result<(), DomError> {
        if self.data.ready.get() && !self.data.removed.get() {
            Ok(())
        } else {
            Err(DomError::SheetUnavailable)
        }
    }

    fn restyle(&self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.restyle();
        }
    }

    /// How many times the live rule list was re-fetched.
    pub fn reacquire_count(&self) -> u32 {
        self.data.reacquired.get()
    }
}

impl StyleSheet for VirtualSheet {
    fn is_ready(&self) -> bool {
        self.data.ready.get() && !self.data.removed.get()
    }

    fn len(&self) -> Result<usize, DomError> {
        self.usable()?;
        Ok(self.data.rules.borrow().len())
    }

    fn rules(&self) -> Result<Vec<CssRule>, DomError> {
        self.usable()?;
        Ok(self.data.rules.borrow().clone())
    }

    fn insert_rule(&self, rule: &CssRule, index: usize) -> Result<usize, DomError> {
        self.usable()?;
        match rule {
            CssRule::Style { selector, .. } => {
                SelectorList::parse(selector)?;
            }
            CssRule::Keyframes { name } => {
                if name.is_empty() || name.chars().any(char::is_whitespace) {
                    return Err(DomError::Host(format!("invalid keyframes name `{name}`")));
                }
            }
            CssRule::Other => {}
        }
        {
            let mut rules = self.data.rules.borrow_mut();
            if index > rules.len() {
                return Err(DomError::IndexOutOfRange {
                    index,
                    len: rules.len(),
                });
            }
            rules.insert(index, rule.clone());
        }
        self.restyle();
        Ok(index)
    }

    fn delete_rule(&self, index: usize) -> Result<(), DomError> {
        self.usable()?;
        {
            let mut rules = self.data.rules.borrow_mut();
            if index >= rules.len() {
                return Err(DomError::IndexOutOfRange {
                    index,
                    len: rules.len(),
                });
            }
            rules.remove(index);
        }
        self.restyle();
        Ok(())
    }

    fn set_disabled(&self, disabled: bool) {
        self.data.disabled.set(disabled);
        self.restyle();
    }

    fn is_disabled(&self) -> bool {
        self.data.disabled.get()
    }

    fn reacquire(&self) {
        self.data.reacquired.set(self.data.reacquired.get() + 1);
    }

    fn remove(&self) {
        self.data.removed.set(true);
        if let Some(doc) = self.doc.upgrade() {
            let mut state = doc.state.borrow_mut();
            state.sheets.retain(|s| !Rc::ptr_eq(s, &self.data));
            state.restyle();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
