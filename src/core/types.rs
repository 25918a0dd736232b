// ============================================================================
// chatmod-core - Shared Types
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Deferred unit of work handed to a scheduler or queued for a frame.
pub type Task = Box<dyn FnOnce()>;

/// Run `f`, converting a panic into an `Err` carrying the panic message.
///
/// Used wherever foreign callbacks run on behalf of a dispatcher: the
/// dispatcher must keep going when one of them fails.
pub fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
