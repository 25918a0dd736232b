// ============================================================================
// chatmod-core - Debouncer
//
// Cancellable timer with two composable delays:
// 1. settle - restarts on every schedule(); work is "ready" once it elapses
// 2. idle   - optional lower-priority slot the ready work then waits for
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::core::types::Task;
use crate::schedule::scheduler::{Scheduler, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Settling(TimerId),
    WaitingIdle(TimerId),
}

struct DebouncerInner {
    scheduler: Rc<dyn Scheduler>,
    settle: Duration,
    idle: Option<Duration>,
    stage: Cell<Option<Stage>>,
    task: RefCell<Option<Task>>,
}

impl DebouncerInner {
    fn clear(&self) {
        match self.stage.take() {
            Some(Stage::Settling(id)) => self.scheduler.clear_timeout(id),
            Some(Stage::WaitingIdle(id)) => self.scheduler.cancel_idle(id),
            None => {}
        }
    }

    fn settled(self: Rc<Self>) {
        match self.idle {
            Some(timeout) => {
                let weak = Rc::downgrade(&self);
                let id = self.scheduler.request_idle(
                    timeout,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire();
                        }
                    }),
                );
                self.stage.set(Some(Stage::WaitingIdle(id)));
            }
            None => self.fire(),
        }
    }

    fn fire(&self) {
        self.stage.set(None);
        let task = self.task.borrow_mut().take();
        if let Some(task) = task {
            task();
        }
    }
}

/// Debounced, cancellable execution of the most recently scheduled task.
///
/// Cloning yields another handle to the same debouncer. Dropping every
/// handle does not cancel a pending run by itself; call [`cancel`](Self::cancel).
///
/// # Example
///
/// ```
/// use chatmod_core::schedule::{Debouncer, ManualScheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let sched = ManualScheduler::new();
/// let debounce = Debouncer::new(Rc::new(sched.clone()), Duration::from_millis(100));
/// let runs = Rc::new(Cell::new(0));
///
/// for _ in 0..3 {
///     let r = runs.clone();
///     debounce.schedule(move || r.set(r.get() + 1));
///     sched.advance(Duration::from_millis(50));
/// }
/// assert_eq!(runs.get(), 0);
///
/// sched.advance(Duration::from_millis(100));
/// assert_eq!(runs.get(), 1);
/// ```
#[derive(Clone)]
pub struct Debouncer {
    inner: Rc<DebouncerInner>,
}

impl Debouncer {
    /// Debouncer that runs its task as soon as `settle` has elapsed.
    pub fn new(scheduler: Rc<dyn Scheduler>, settle: Duration) -> Self {
        Self::build(scheduler, settle, None)
    }

    /// Debouncer that, once settled, waits for an idle slot (at most
    /// `idle_timeout`) before running.
    pub fn with_idle(scheduler: Rc<dyn Scheduler>, settle: Duration, idle_timeout: Duration) -> Self {
        Self::build(scheduler, settle, Some(idle_timeout))
    }

    fn build(scheduler: Rc<dyn Scheduler>, settle: Duration, idle: Option<Duration>) -> Self {
        Self {
            inner: Rc::new(DebouncerInner {
                scheduler,
                settle,
                idle,
                stage: Cell::new(None),
                task: RefCell::new(None),
            }),
        }
    }

    /// Replace the pending task with `task` and restart the settle delay.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.inner.clear();
        let previous = self.inner.task.replace(Some(Box::new(task)));
        drop(previous);

        let weak: Weak<DebouncerInner> = Rc::downgrade(&self.inner);
        let id = self.inner.scheduler.set_timeout(
            self.inner.settle,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.stage.set(None);
                    inner.settled();
                }
            }),
        );
        self.inner.stage.set(Some(Stage::Settling(id)));
    }

    /// Drop the pending task and clear whichever timer is armed.
    pub fn cancel(&self) {
        self.inner.clear();
        let task = self.inner.task.borrow_mut().take();
        drop(task);
    }

    /// Run the pending task now, skipping the remaining delays.
    pub fn flush(&self) {
        if self.inner.stage.get().is_some() {
            self.inner.clear();
            self.inner.fire();
        }
    }

    /// Whether a task is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.inner.stage.get().is_some()
    }
}

// =============================================================================
// TESTS
// =============================================================================
