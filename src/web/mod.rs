// ============================================================================
// chatmod-core - Browser Binding
//
// web-sys implementations of the capability traits:
// - WebDocument / WebStyleSheet for the insertion watcher
// - WebScheduler for requestAnimationFrame, setTimeout and
//   requestIdleCallback
// ============================================================================

mod document;
mod scheduler;

pub use document::{WebDocument, WebStyleSheet};
pub use scheduler::WebScheduler;

use wasm_bindgen::JsValue;

use crate::core::error::DomError;

fn js_error(err: JsValue) -> DomError {
    DomError::Host(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}
