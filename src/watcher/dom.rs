// ============================================================================
// chatmod-core - DOM Capabilities
//
// The narrow slice of the document the insertion watcher needs. Rule
// classification happens here, in the binding layer, so the watcher only
// ever sees the CssRule tagged union.
// ============================================================================

use std::rc::Rc;

use crate::core::error::DomError;
use crate::core::types::Task;

/// Handle for a host-side registration (event listener, observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// Receives `(animation_name, element)` for every `animationstart`.
pub type AnimationHandler<E> = Rc<dyn Fn(&str, &E)>;

// =============================================================================
// CSS RULES
// =============================================================================

/// A stylesheet rule, as far as the watcher cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    /// `@keyframes <name> { ... }`
    Keyframes { name: String },

    /// `<selector> { animation-duration: ..; animation-name: .. }`
    Style {
        selector: String,
        animation_name: Option<String>,
        animation_duration: Option<String>,
    },

    /// Anything else living in the sheet.
    Other,
}

impl CssRule {
    /// The empty keyframes rule backing a signal.
    pub fn signal_keyframes(signal: &str) -> Self {
        Self::Keyframes {
            name: signal.to_string(),
        }
    }

    /// The style rule that starts `signal` on elements matching `selector`.
    pub fn signal_style(selector: &str, signal: &str, duration: &str) -> Self {
        Self::Style {
            selector: selector.to_string(),
            animation_name: Some(signal.to_string()),
            animation_duration: Some(duration.to_string()),
        }
    }

    /// Whether this rule is one of the two rules installed for `signal`.
    pub fn carries_signal(&self, signal: &str) -> bool {
        match self {
            Self::Keyframes { name } => name == signal,
            Self::Style { animation_name, .. } => animation_name.as_deref() == Some(signal),
            Self::Other => false,
        }
    }

    /// CSS text suitable for `CSSStyleSheet.insertRule`.
    pub fn to_css(&self) -> String {
        match self {
            Self::Keyframes { name } => format!("@keyframes {name} {{ from {{}} to {{}} }}"),
            Self::Style {
                selector,
                animation_name,
                animation_duration,
            } => {
                let mut body = String::new();
                if let Some(duration) = animation_duration {
                    body.push_str(&format!("animation-duration: {duration}; "));
                }
                if let Some(name) = animation_name {
                    body.push_str(&format!("animation-name: {name}; "));
                }
                format!("{selector} {{ {body}}}")
            }
            Self::Other => String::new(),
        }
    }
}

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================

/// A document the watcher can observe.
pub trait Document: 'static {
    type Element: 'static;
    type Sheet: StyleSheet;

    /// Whether a node exists that a `<style>` element can be attached to.
    fn has_root(&self) -> bool;

    /// Run `on_root` once, as soon as a root exists.
    fn observe_root(&self, on_root: Task) -> HostHandle;

    fn disconnect_observer(&self, handle: HostHandle);

    /// Inject a new owned `<style>` node. Its sheet object may not be usable
    /// yet; see [`StyleSheet::is_ready`].
    fn create_sheet(&self, owner: &str) -> Result<Self::Sheet, DomError>;

    /// Document-level, capture-phase `animationstart` listener.
    fn add_animation_listener(&self, handler: AnimationHandler<Self::Element>) -> HostHandle;

    fn remove_animation_listener(&self, handle: HostHandle);
}

/// An owned stylesheet.
pub trait StyleSheet: 'static {
    /// Whether the sheet object and its rule list can be used.
    fn is_ready(&self) -> bool;

    fn len(&self) -> Result<usize, DomError>;

    fn is_empty(&self) -> Result<bool, DomError> {
        self.len().map(|len| len == 0)
    }

    /// Classified snapshot of the rule list.
    fn rules(&self) -> Result<Vec<CssRule>, DomError>;

    /// Insert `rule` at `index`, returning the index it landed at.
    fn insert_rule(&self, rule: &CssRule, index: usize) -> Result<usize, DomError>;

    fn delete_rule(&self, index: usize) -> Result<(), DomError>;

    fn set_disabled(&self, disabled: bool);

    fn is_disabled(&self) -> bool;

    /// Re-fetch the live rule list. Some engines invalidate a cached list
    /// when the sheet is toggled.
    fn reacquire(&self);

    /// Remove the owning `<style>` node from the document.
    fn remove(&self);
}

// =============================================================================
// TESTS
// =============================================================================
