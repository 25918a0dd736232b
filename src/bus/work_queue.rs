// ============================================================================
// chatmod-core - UI Work Queue
//
// Coalesces layout-touching work into one pass per display refresh.
// However many items are queued before the refresh, exactly one frame
// callback is requested.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::core::types::{Task, guarded};
use crate::schedule::Scheduler;

struct WorkQueueInner {
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
    pending: RefCell<Vec<Task>>,
    flush_scheduled: Cell<bool>,
}

impl WorkQueueInner {
    fn flush(&self) -> usize {
        // Take the list and drop the flag first: anything queued by the work
        // below lands in a fresh list and requests the next frame.
        let work = std::mem::take(&mut *self.pending.borrow_mut());
        self.flush_scheduled.set(false);

        let count = work.len();
        for item in work {
            if let Err(message) = guarded(item) {
                self.sink.report(Diagnostic::UiWorkPanicked { message });
            }
        }
        count
    }
}

/// Ordered queue of zero-argument work run on the next display refresh.
#[derive(Clone)]
pub struct UiWorkQueue {
    inner: Rc<WorkQueueInner>,
}

impl UiWorkQueue {
    pub fn new(scheduler: Rc<dyn Scheduler>, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Rc::new(WorkQueueInner {
                scheduler,
                sink,
                pending: RefCell::new(Vec::new()),
                flush_scheduled: Cell::new(false),
            }),
        }
    }

    /// Append `work` and make sure one flush is scheduled.
    pub fn queue(&self, work: impl FnOnce() + 'static) {
        self.inner.pending.borrow_mut().push(Box::new(work));

        if self.inner.flush_scheduled.replace(true) {
            return;
        }

        let weak: Weak<WorkQueueInner> = Rc::downgrade(&self.inner);
        self.inner.scheduler.request_frame(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush();
            }
        }));
    }

    /// Items waiting for the next flush.
    pub fn len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a frame callback is currently requested.
    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.flush_scheduled.get()
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

    fn setup() -> (ManualScheduler, Rc<RecordingSink>, UiWorkQueue) {
        let sched = ManualScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let queue = UiWorkQueue::new(Rc::new(sched.clone()), sink.clone());
        (sched, sink, queue)
    }

    #[test]
    fn many_items_one_frame_in_order() {
        let (sched, _, queue) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let o = order.clone();
            queue.queue(move || o.borrow_mut().push(i));
        }

        assert_eq!(sched.pending_frames(), 1);
        assert!(queue.is_flush_scheduled());
        assert_eq!(queue.len(), 3);
        assert!(order.borrow().is_empty());

        sched.run_frame();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
        assert!(!queue.is_flush_scheduled());
    }

    #[test]
    fn work_queued_during_flush_waits_for_next_frame() {
        let (sched, _, queue) = setup();
        let ran = Rc::new(Cell::new(0));

        let q = queue.clone();
        let r = ran.clone();
        queue.queue(move || {
            let r2 = r.clone();
            q.queue(move || r2.set(r2.get() + 10));
            r.set(r.get() + 1);
        });

        sched.run_frame();
        assert_eq!(ran.get(), 1);
        assert_eq!(sched.pending_frames(), 1);

        sched.run_frame();
        assert_eq!(ran.get(), 11);
    }

    #[test]
    fn panicking_item_does_not_stop_the_rest() {
        let (sched, sink, queue) = setup();
        let ran = Rc::new(Cell::new(false));

        queue.queue(|| panic!("layout exploded"));
        let r = ran.clone();
        queue.queue(move || r.set(true));

        sched.run_frame();
        assert!(ran.get());
        assert_eq!(
            sink.records(),
            vec![Diagnostic::UiWorkPanicked {
                message: "layout exploded".into()
            }]
        );
    }
}
