// ============================================================================
// chatmod-core - Manual Scheduler
//
// Deterministic Scheduler with a virtual clock. Nothing runs until the
// owner calls run_frame(), advance() or run_idle(), which makes every
// timing scenario reproducible in tests and lets headless hosts drive the
// components from their own loop.
// ============================================================================

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::core::types::Task;
use crate::schedule::scheduler::{Scheduler, TimerId};

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    frames: Vec<Task>,
    /// Keyed by (deadline, id) so equal deadlines fire in creation order.
    timers: BTreeMap<(Duration, u64), Task>,
    /// Ids in `timers` that were requested as idle callbacks.
    idle: HashSet<u64>,
}

impl ManualState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_timer(&mut self, id: u64) -> Option<Task> {
        let key = self.timers.keys().find(|(_, tid)| *tid == id).copied()?;
        self.idle.remove(&id);
        self.timers.remove(&key)
    }
}

/// Scheduler driven explicitly by its owner.
///
/// Cloning yields another handle to the same clock and queues.
///
/// # Example
///
/// ```
/// use chatmod_core::schedule::{ManualScheduler, Scheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let sched = ManualScheduler::new();
/// let fired = Rc::new(Cell::new(false));
/// let f = fired.clone();
/// sched.set_timeout(Duration::from_millis(10), Box::new(move || f.set(true)));
///
/// sched.advance(Duration::from_millis(9));
/// assert!(!fired.get());
/// sched.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Frame callbacks waiting for the next refresh.
    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// Timers and idle requests not yet fired.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Simulate one display refresh. Callbacks requested while the frame
    /// runs wait for the next one. Returns how many callbacks ran.
    pub fn run_frame(&self) -> usize {
        let frames = std::mem::take(&mut self.state.borrow_mut().frames);
        let count = frames.len();
        for task in frames {
            task();
        }
        count
    }

    /// Move the clock forward, firing every timer whose deadline is reached,
    /// in deadline order. Timers created by fired timers are honoured if they
    /// fall inside the window.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.borrow().now + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let key = match state.timers.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => break,
                };
                state.now = key.0;
                state.idle.remove(&key.1);
                state.timers.remove(&key)
            };
            if let Some(task) = next {
                task();
                fired += 1;
            }
        }

        self.state.borrow_mut().now = target;
        fired
    }

    /// Simulate an idle period: every pending idle request runs now.
    pub fn run_idle(&self) -> usize {
        let tasks: Vec<Task> = {
            let mut state = self.state.borrow_mut();
            let ids: Vec<u64> = state.idle.drain().collect();
            let mut keys: Vec<(Duration, u64)> = state
                .timers
                .keys()
                .filter(|(_, id)| ids.contains(id))
                .copied()
                .collect();
            keys.sort();
            keys.into_iter()
                .filter_map(|key| state.timers.remove(&key))
                .collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Run frames and fire all timers until nothing is left, jumping the
    /// clock as needed. Bounded so a self-rescheduling task cannot hang.
    pub fn run_until_idle(&self) -> usize {
        const MAX_ROUNDS: usize = 10_000;

        let mut ran = 0;
        for _ in 0..MAX_ROUNDS {
            let frames = self.run_frame();
            let next_deadline = self.state.borrow().timers.keys().next().map(|k| k.0);
            let timers = match next_deadline {
                Some(deadline) => {
                    let now = self.now();
                    self.advance(deadline.saturating_sub(now))
                }
                None => 0,
            };
            if frames == 0 && timers == 0 {
                break;
            }
            ran += frames + timers;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn request_frame(&self, task: Task) {
        self.state.borrow_mut().frames.push(task);
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.alloc_id();
        let deadline = state.now + delay;
        state.timers.insert((deadline, id), task);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        // Drop the task outside the borrow; it may own handles whose Drop
        // touches this scheduler.
        let removed = self.state.borrow_mut().remove_timer(id.0);
        drop(removed);
    }

    fn request_idle(&self, timeout: Duration, task: Task) -> TimerId {
        let id = self.set_timeout(timeout, task);
        self.state.borrow_mut().idle.insert(id.0);
        id
    }
}

// =============================================================================
// TESTS
// =============================================================================
