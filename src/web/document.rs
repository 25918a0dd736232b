// ============================================================================
// chatmod-core - Web Document
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{
    AnimationEvent, CssKeyframesRule, CssStyleRule, CssStyleSheet, Element, HtmlStyleElement,
    MutationObserver, MutationObserverInit,
};

use super::js_error;
use crate::core::constants::ANIMATION_START_EVENT;
use crate::core::error::DomError;
use crate::core::types::Task;
use crate::watcher::{AnimationHandler, CssRule, Document, HostHandle, StyleSheet};

/// Attribute naming the watcher that owns an injected `<style>` node.
const OWNER_ATTRIBUTE: &str = "data-chatmod-owner";

type AnimationClosure = Closure<dyn FnMut(AnimationEvent)>;
type ObserverClosure = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

struct WebDocumentInner {
    document: web_sys::Document,
    next_handle: Cell<u64>,
    listeners: RefCell<HashMap<u64, AnimationClosure>>,
    observers: RefCell<HashMap<u64, (MutationObserver, ObserverClosure)>>,
    // Closures detached while they may still be on the JS stack. Released
    // with the document handle.
    retired_listeners: RefCell<Vec<AnimationClosure>>,
    retired_observers: RefCell<Vec<ObserverClosure>>,
}

/// [`Document`] backed by the page's `web_sys::Document`.
#[derive(Clone)]
pub struct WebDocument {
    inner: Rc<WebDocumentInner>,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self {
            inner: Rc::new(WebDocumentInner {
                document,
                next_handle: Cell::new(0),
                listeners: RefCell::new(HashMap::new()),
                observers: RefCell::new(HashMap::new()),
                retired_listeners: RefCell::new(Vec::new()),
                retired_observers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The current window's document.
    pub fn from_window() -> Result<Self, DomError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| DomError::Host("document is unavailable".to_string()))?;
        Ok(Self::new(document))
    }

    fn alloc_handle(&self) -> u64 {
        let next = self.inner.next_handle.get() + 1;
        self.inner.next_handle.set(next);
        next
    }
}

impl Document for WebDocument {
    type Element = Element;
    type Sheet = WebStyleSheet;

    fn has_root(&self) -> bool {
        self.inner.document.document_element().is_some()
    }

    fn observe_root(&self, on_root: Task) -> HostHandle {
        let handle = self.alloc_handle();
        let document = self.inner.document.clone();
        let mut pending = Some(on_root);

        let callback = ObserverClosure::wrap(Box::new(
            move |_records: js_sys::Array, observer: MutationObserver| {
                if document.document_element().is_none() {
                    return;
                }
                observer.disconnect();
                if let Some(task) = pending.take() {
                    task();
                }
            },
        ));

        match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => {
                let init = MutationObserverInit::new();
                init.set_child_list(true);
                if let Err(err) = observer.observe_with_options(&self.inner.document, &init) {
                    tracing::error!(error = %js_error(err), "root observer failed to start");
                }
                self.inner
                    .observers
                    .borrow_mut()
                    .insert(handle, (observer, callback));
            }
            Err(err) => tracing::error!(error = %js_error(err), "cannot create root observer"),
        }
        HostHandle(handle)
    }

    fn disconnect_observer(&self, handle: HostHandle) {
        let removed = self.inner.observers.borrow_mut().remove(&handle.0);
        if let Some((observer, callback)) = removed {
            observer.disconnect();
            self.inner.retired_observers.borrow_mut().push(callback);
        }
    }

    fn create_sheet(&self, owner: &str) -> Result<WebStyleSheet, DomError> {
        let document = &self.inner.document;
        let root = document
            .document_element()
            .ok_or_else(|| DomError::Host("document has no root".to_string()))?;
        let style = document
            .create_element("style")
            .map_err(js_error)?
            .dyn_into::<HtmlStyleElement>()
            .map_err(|_| DomError::Host("created element is not a <style>".to_string()))?;
        style
            .set_attribute(OWNER_ATTRIBUTE, owner)
            .map_err(js_error)?;
        root.append_child(&style).map_err(js_error)?;

        Ok(WebStyleSheet {
            element: style,
            cached: RefCell::new(None),
        })
    }

    fn add_animation_listener(&self, handler: AnimationHandler<Element>) -> HostHandle {
        let handle = self.alloc_handle();
        let callback = AnimationClosure::wrap(Box::new(move |event: AnimationEvent| {
            let Some(target) = event.target() else {
                return;
            };
            if let Ok(element) = target.dyn_into::<Element>() {
                handler(&event.animation_name(), &element);
            }
        }));

        if let Err(err) = self.inner.document.add_event_listener_with_callback_and_bool(
            ANIMATION_START_EVENT,
            callback.as_ref().unchecked_ref(),
            true,
        ) {
            tracing::error!(error = %js_error(err), "cannot listen for animationstart");
        }
        self.inner.listeners.borrow_mut().insert(handle, callback);
        HostHandle(handle)
    }

    fn remove_animation_listener(&self, handle: HostHandle) {
        let removed = self.inner.listeners.borrow_mut().remove(&handle.0);
        if let Some(callback) = removed {
            if let Err(err) = self.inner.document.remove_event_listener_with_callback_and_bool(
                ANIMATION_START_EVENT,
                callback.as_ref().unchecked_ref(),
                true,
            ) {
                tracing::warn!(error = %js_error(err), "cannot remove animationstart listener");
            }
            self.inner.retired_listeners.borrow_mut().push(callback);
        }
    }
}

// =============================================================================
// STYLE SHEET
// =============================================================================

/// The sheet of one injected `<style>` node.
pub struct WebStyleSheet {
    element: HtmlStyleElement,
    cached: RefCell<Option<CssStyleSheet>>,
}

impl WebStyleSheet {
    fn sheet(&self) -> Result<CssStyleSheet, DomError> {
        if let Some(sheet) = self.cached.borrow().as_ref() {
            return Ok(sheet.clone());
        }
        let sheet = self
            .element
            .sheet()
            .and_then(|sheet| sheet.dyn_into::<CssStyleSheet>().ok())
            .ok_or(DomError::SheetUnavailable)?;
        *self.cached.borrow_mut() = Some(sheet.clone());
        Ok(sheet)
    }

    fn rule_list(&self) -> Result<web_sys::CssRuleList, DomError> {
        self.sheet()?
            .css_rules()
            .map_err(|_| DomError::SheetUnavailable)
    }
}

fn classify(rule: &web_sys::CssRule) -> CssRule {
    if let Some(keyframes) = rule.dyn_ref::<CssKeyframesRule>() {
        return CssRule::Keyframes {
            name: keyframes.name(),
        };
    }
    if let Some(style) = rule.dyn_ref::<CssStyleRule>() {
        let declaration = style.style();
        let property = |name: &str| {
            declaration
                .get_property_value(name)
                .ok()
                .filter(|value| !value.is_empty())
        };
        return CssRule::Style {
            selector: style.selector_text(),
            animation_name: property("animation-name"),
            animation_duration: property("animation-duration"),
        };
    }
    CssRule::Other
}

impl StyleSheet for WebStyleSheet {
    fn is_ready(&self) -> bool {
        self.element.is_connected() && self.rule_list().is_ok()
    }

    fn len(&self) -> Result<usize, DomError> {
        Ok(self.rule_list()?.length() as usize)
    }

    fn rules(&self) -> Result<Vec<CssRule>, DomError> {
        let list = self.rule_list()?;
        Ok((0..list.length())
            .filter_map(|i| list.item(i))
            .map(|rule| classify(&rule))
            .collect())
    }

    fn insert_rule(&self, rule: &CssRule, index: usize) -> Result<usize, DomError> {
        let sheet = self.sheet()?;
        let len = self.len()?;
        if index > len {
            return Err(DomError::IndexOutOfRange { index, len });
        }
        match sheet.insert_rule_with_index(&rule.to_css(), index as u32) {
            Ok(at) => Ok(at as usize),
            Err(err) => match rule {
                CssRule::Style { selector, .. } => {
                    tracing::debug!(selector = %selector, error = %js_error(err), "style rule rejected");
                    Err(DomError::InvalidSelector(selector.clone()))
                }
                _ => Err(js_error(err)),
            },
        }
    }

    fn delete_rule(&self, index: usize) -> Result<(), DomError> {
        let sheet = self.sheet()?;
        let len = self.len()?;
        if index >= len {
            return Err(DomError::IndexOutOfRange { index, len });
        }
        sheet.delete_rule(index as u32).map_err(js_error)
    }

    fn set_disabled(&self, disabled: bool) {
        if let Ok(sheet) = self.sheet() {
            sheet.set_disabled(disabled);
        }
    }

    fn is_disabled(&self) -> bool {
        self.sheet().map(|sheet| sheet.disabled()).unwrap_or(false)
    }

    fn reacquire(&self) {
        self.cached.borrow_mut().take();
    }

    fn remove(&self) {
        self.cached.borrow_mut().take();
        self.element.remove();
    }
}
