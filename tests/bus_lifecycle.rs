use chatmod_core::{
    BusConfig, BusError, Diagnostic, EventBus, ManualScheduler, RecordingSink, SubscriptionGroup,
    cloned,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum UiEvent {
    Navigated(String),
    ThemeChanged { dark: bool },
}

fn bus(config: BusConfig) -> (ManualScheduler, Rc<RecordingSink>, EventBus<UiEvent>) {
    let sched = ManualScheduler::new();
    let sink = Rc::new(RecordingSink::new());
    let bus = EventBus::with_sink(Rc::new(sched.clone()), config, sink.clone());
    (sched, sink, bus)
}

#[test]
fn test_feature_teardown_releases_its_listeners() {
    let (_sched, _sink, bus) = bus(BusConfig::default());
    let repaints = Rc::new(Cell::new(0));

    let sidebar = SubscriptionGroup::new(&bus, "sidebar");
    sidebar
        .subscribe(
            "theme",
            "repaint",
            cloned!(repaints => move |_: &UiEvent| repaints.set(repaints.get() + 1)),
        )
        .unwrap();
    let toolbar = SubscriptionGroup::new(&bus, "toolbar");
    toolbar
        .subscribe(
            "theme",
            "repaint",
            cloned!(repaints => move |_: &UiEvent| repaints.set(repaints.get() + 1)),
        )
        .unwrap();

    assert_eq!(bus.publish("theme", &UiEvent::ThemeChanged { dark: true }), 2);

    drop(sidebar);
    assert_eq!(bus.listener_keys("theme"), vec!["toolbar:repaint"]);
    assert_eq!(bus.publish("theme", &UiEvent::ThemeChanged { dark: false }), 1);
    assert_eq!(repaints.get(), 3);
}

#[test]
fn test_once_listener_sees_only_first_navigation() {
    let (_sched, _sink, bus) = bus(BusConfig::default());
    let seen = Rc::new(RefCell::new(Vec::new()));

    bus.once(
        "nav",
        "first-load",
        cloned!(seen => move |event: &UiEvent| seen.borrow_mut().push(event.clone())),
    )
    .unwrap();

    bus.publish("nav", &UiEvent::Navigated("/c/1".into()));
    bus.publish("nav", &UiEvent::Navigated("/c/2".into()));

    assert_eq!(*seen.borrow(), vec![UiEvent::Navigated("/c/1".into())]);
    assert!(!bus.has_listener("nav", "first-load"));
}

#[test]
fn test_resubscribe_replaces_without_duplicating() {
    let (_sched, _sink, bus) = bus(BusConfig::default());
    let calls = Rc::new(RefCell::new(Vec::new()));

    for generation in 0..3 {
        bus.subscribe(
            "nav",
            "router",
            cloned!(calls => move |_: &UiEvent| calls.borrow_mut().push(generation)),
        )
        .unwrap();
    }

    bus.publish("nav", &UiEvent::Navigated("/".into()));
    assert_eq!(*calls.borrow(), vec![2]);
}

#[test]
fn test_missing_key_is_rejected() {
    let (_sched, sink, bus) = bus(BusConfig::default());
    assert_eq!(
        bus.subscribe("nav", "  ", |_: &UiEvent| {}),
        Err(BusError::MissingKey {
            event: "nav".into()
        })
    );
    assert_eq!(bus.event_count(), 0);
    assert_eq!(
        sink.records(),
        vec![Diagnostic::MissingKey {
            event: "nav".into()
        }]
    );
}

#[test]
fn test_noisy_event_delivers_every_publish_but_logs_once() {
    let (sched, sink, bus) = bus(BusConfig::default().with_noisy(["nav"]).with_debug(true));
    let deliveries = Rc::new(Cell::new(0));
    bus.subscribe(
        "nav",
        "tracker",
        cloned!(deliveries => move |_: &UiEvent| deliveries.set(deliveries.get() + 1)),
    )
    .unwrap();

    for i in 0..5 {
        bus.publish("nav", &UiEvent::Navigated(format!("/c/{i}")));
    }
    assert_eq!(deliveries.get(), 5);

    // Quiet period, then the idle slot (or its timeout).
    sched.advance(Duration::from_millis(500));
    assert!(sink.is_empty());
    sched.run_idle();

    assert_eq!(
        sink.records(),
        vec![Diagnostic::Aggregated {
            event: "nav".into(),
            count: 5
        }]
    );
    assert_eq!(bus.pending_aggregate("nav"), 0);
}

#[test]
fn test_ui_work_flushes_once_per_frame_in_order() {
    let (sched, _sink, bus) = bus(BusConfig::default());
    let order = Rc::new(RefCell::new(Vec::new()));

    bus.queue_ui_work(cloned!(order => move || order.borrow_mut().push("f1")));
    bus.queue_ui_work(cloned!(order, bus => move || {
        order.borrow_mut().push("f2");
        // Work queued during a flush waits for the next frame.
        bus.queue_ui_work(cloned!(order => move || order.borrow_mut().push("f3")));
    }));

    assert_eq!(sched.pending_frames(), 1);
    assert_eq!(sched.run_frame(), 1);
    assert_eq!(*order.borrow(), vec!["f1", "f2"]);

    assert_eq!(sched.pending_frames(), 1);
    sched.run_frame();
    assert_eq!(*order.borrow(), vec!["f1", "f2", "f3"]);
    assert!(bus.ui_work().is_empty());
}
