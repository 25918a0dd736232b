// ============================================================================
// chatmod-core - Noisy Event Aggregation
//
// Tallies publishes of noisy events and reports one summary per burst.
// Only diagnostics are aggregated. Listener execution never goes through
// here.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::bus::config::BusConfig;
use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::schedule::{Debouncer, Scheduler};

struct Slot {
    count: Rc<Cell<u64>>,
    debouncer: Debouncer,
}

pub(crate) struct Aggregator {
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn DiagnosticSink>,
    config: BusConfig,
    slots: RefCell<HashMap<String, Slot>>,
}

impl Aggregator {
    pub(crate) fn new(
        scheduler: Rc<dyn Scheduler>,
        sink: Rc<dyn DiagnosticSink>,
        config: BusConfig,
    ) -> Self {
        Self {
            scheduler,
            sink,
            config,
            slots: RefCell::new(HashMap::new()),
        }
    }

    /// Count one publish of `event`. Returns false when the event is not
    /// noisy, in which case nothing was recorded.
    pub(crate) fn record(&self, event: &str) -> bool {
        if !self.config.is_noisy(event) {
            return false;
        }

        let (count, debouncer) = {
            let mut slots = self.slots.borrow_mut();
            let slot = slots
                .entry(event.to_string())
                .or_insert_with(|| Slot {
                    count: Rc::new(Cell::new(0)),
                    debouncer: self.debouncer(),
                });
            (slot.count.clone(), slot.debouncer.clone())
        };
        count.set(count.get() + 1);

        let sink = self.sink.clone();
        let name = event.to_string();
        debouncer.schedule(move || {
            let total = count.replace(0);
            if total > 0 {
                sink.report(Diagnostic::Aggregated {
                    event: name,
                    count: total,
                });
            }
        });
        true
    }

    /// Publishes of `event` counted but not yet reported.
    pub(crate) fn pending(&self, event: &str) -> u64 {
        self.slots
            .borrow()
            .get(event)
            .map_or(0, |slot| slot.count.get())
    }

    /// Drop the pending summary for `event`.
    pub(crate) fn cancel(&self, event: &str) {
        let slot = self.slots.borrow_mut().remove(event);
        if let Some(slot) = slot {
            slot.debouncer.cancel();
        }
    }

    pub(crate) fn cancel_all(&self) {
        let slots: Vec<Slot> = self.slots.borrow_mut().drain().map(|(_, s)| s).collect();
        for slot in slots {
            slot.debouncer.cancel();
        }
    }

    fn debouncer(&self) -> Debouncer {
        match self.config.aggregation_idle {
            Some(idle) => {
                Debouncer::with_idle(self.scheduler.clone(), self.config.aggregation_window, idle)
            }
            None => Debouncer::new(self.scheduler.clone(), self.config.aggregation_window),
        }
    }
}
