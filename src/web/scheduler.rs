// ============================================================================
// chatmod-core - Web Scheduler
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{IdleRequestOptions, Window};

use super::js_error;
use crate::core::error::DomError;
use crate::core::types::Task;
use crate::schedule::{Scheduler, TimerId};

#[derive(Clone, Copy)]
enum HostTimer {
    Timeout(i32),
    Idle(u32),
}

struct PendingTimer {
    host: HostTimer,
    task: Option<Task>,
    callback: Closure<dyn FnMut()>,
}

struct SchedulerInner {
    window: Window,
    next_id: Cell<u64>,
    timers: RefCell<HashMap<u64, PendingTimer>>,
    /// Callbacks of fired timers. Dropped on the next fire, once they are
    /// off the JS stack.
    spent: RefCell<Vec<Closure<dyn FnMut()>>>,
}

impl SchedulerInner {
    fn fire(&self, id: u64) {
        self.spent.borrow_mut().clear();
        let entry = self.timers.borrow_mut().remove(&id);
        if let Some(mut timer) = entry {
            let task = timer.task.take();
            self.spent.borrow_mut().push(timer.callback);
            if let Some(task) = task {
                task();
            }
        }
    }

    fn cancel(&self, id: u64) {
        let removed = self.timers.borrow_mut().remove(&id);
        if let Some(timer) = removed {
            match timer.host {
                HostTimer::Timeout(handle) => self.window.clear_timeout_with_handle(handle),
                HostTimer::Idle(handle) => self.window.cancel_idle_callback(handle),
            }
        }
    }
}

/// [`Scheduler`] backed by the browser event loop.
#[derive(Clone)]
pub struct WebScheduler {
    inner: Rc<SchedulerInner>,
}

impl WebScheduler {
    pub fn new(window: Window) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                window,
                next_id: Cell::new(0),
                timers: RefCell::new(HashMap::new()),
                spent: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn from_window() -> Result<Self, DomError> {
        web_sys::window()
            .map(Self::new)
            .ok_or_else(|| DomError::Host("window is unavailable".to_string()))
    }

    fn arm(
        &self,
        task: Task,
        start: impl FnOnce(&Window, &js_sys::Function) -> Result<HostTimer, wasm_bindgen::JsValue>,
    ) -> TimerId {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);

        let weak: Weak<SchedulerInner> = Rc::downgrade(&self.inner);
        let callback = Closure::<dyn FnMut()>::wrap(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.fire(id);
            }
        }));

        match start(&self.inner.window, callback.as_ref().unchecked_ref()) {
            Ok(host) => {
                self.inner.timers.borrow_mut().insert(
                    id,
                    PendingTimer {
                        host,
                        task: Some(task),
                        callback,
                    },
                );
            }
            Err(err) => tracing::error!(error = %js_error(err), "cannot schedule timer"),
        }
        TimerId(id)
    }
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

impl Scheduler for WebScheduler {
    fn request_frame(&self, task: Task) {
        let callback = Closure::once_into_js(move || task());
        if let Err(err) = self
            .inner
            .window
            .request_animation_frame(callback.unchecked_ref())
        {
            tracing::error!(error = %js_error(err), "cannot request animation frame");
        }
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        self.arm(task, |window, callback| {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(callback, millis(delay))
                .map(HostTimer::Timeout)
        })
    }

    fn clear_timeout(&self, id: TimerId) {
        self.inner.cancel(id.0);
    }

    fn request_idle(&self, timeout: Duration, task: Task) -> TimerId {
        self.arm(task, |window, callback| {
            let options = IdleRequestOptions::new();
            options.set_timeout(millis(timeout).unsigned_abs());
            window
                .request_idle_callback_with_options(callback, &options)
                .map(HostTimer::Idle)
        })
    }

    fn cancel_idle(&self, id: TimerId) {
        self.inner.cancel(id.0);
    }
}
