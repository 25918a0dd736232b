use chatmod_core::watcher::{
    CssRule, InsertionCallback, InsertionWatcher, StyleSheet, VirtualDocument, VirtualElement,
    WatcherConfig, WatcherRegistry,
};
use chatmod_core::{Diagnostic, ManualScheduler, RecordingSink, WatcherError, callback};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

type Setup = (
    ManualScheduler,
    Rc<RecordingSink>,
    WatcherRegistry<VirtualDocument>,
);

fn setup(doc: VirtualDocument) -> Setup {
    let sched = ManualScheduler::new();
    let sink = Rc::new(RecordingSink::new());
    let registry = WatcherRegistry::with_options(
        doc,
        Rc::new(sched.clone()),
        WatcherConfig::default(),
        sink.clone(),
    );
    (sched, sink, registry)
}

fn recorder(log: &Rc<RefCell<Vec<String>>>, label: &str) -> InsertionCallback<VirtualElement> {
    let log = log.clone();
    let label = label.to_string();
    Rc::new(move |el: &VirtualElement| log.borrow_mut().push(format!("{label}:{}", el.uid())))
}

#[test]
fn test_each_inserted_element_is_reported_once() {
    let doc = VirtualDocument::new();
    let (_sched, sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    watcher.on("div.msg", recorder(&seen, "msg")).unwrap();

    let first = VirtualElement::new("div").with_class("msg");
    let second = VirtualElement::new("div").with_class("msg");
    doc.append(first.clone());
    doc.append(VirtualElement::new("span").with_class("msg"));
    doc.append(second.clone());

    assert_eq!(doc.flush_animations(), 2);
    assert_eq!(
        *seen.borrow(),
        vec![format!("msg:{}", first.uid()), format!("msg:{}", second.uid())]
    );

    // Nothing new inserted, nothing new reported.
    assert_eq!(doc.flush_animations(), 0);
    assert!(sink.is_empty());
}

#[test]
fn test_overlapping_selectors_both_fire() {
    let doc = VirtualDocument::new();
    let (_sched, _sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    watcher.on("div.msg", recorder(&seen, "msg")).unwrap();
    watcher.on("div.msg.special", recorder(&seen, "special")).unwrap();

    let el = VirtualElement::new("div").with_class("msg").with_class("special");
    doc.append(el.clone());
    doc.flush_animations();

    let mut got = seen.borrow().clone();
    got.sort();
    assert_eq!(
        got,
        vec![format!("msg:{}", el.uid()), format!("special:{}", el.uid())]
    );
}

#[test]
fn test_rule_count_returns_to_baseline_after_last_off() {
    let doc = VirtualDocument::new();
    let (_sched, _sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();
    let sheet = watcher.sheet().unwrap();

    // A rule owned by someone else sharing the sheet.
    sheet
        .insert_rule(
            &CssRule::Style {
                selector: "body".into(),
                animation_name: None,
                animation_duration: None,
            },
            0,
        )
        .unwrap();
    let baseline = sheet.len().unwrap();

    let hits = Rc::new(Cell::new(0));
    let a: InsertionCallback<VirtualElement> =
        callback!(hits => |_el: &VirtualElement| hits.set(hits.get() + 1));
    let b: InsertionCallback<VirtualElement> =
        callback!(hits => |_el: &VirtualElement| hits.set(hits.get() + 10));

    watcher.on("p", a.clone()).unwrap();
    watcher.on("li", b.clone()).unwrap();
    assert_eq!(sheet.len().unwrap(), baseline + 4);

    assert!(watcher.off("p", &a));
    assert!(watcher.off("li", &b));
    assert_eq!(sheet.len().unwrap(), baseline);
    assert_eq!(
        sheet.rules().unwrap(),
        vec![CssRule::Style {
            selector: "body".into(),
            animation_name: None,
            animation_duration: None,
        }]
    );

    doc.append(VirtualElement::new("p"));
    doc.flush_animations();
    assert_eq!(hits.get(), 0);
}

#[test]
fn test_invalid_selector_rolls_back_and_reports() {
    let doc = VirtualDocument::new();
    let (_sched, sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();
    let cb: InsertionCallback<VirtualElement> = Rc::new(|_: &VirtualElement| {});

    let err = watcher.on("div > p", cb.clone()).unwrap_err();
    assert!(matches!(err, WatcherError::RuleInsertion { ref selector, .. } if selector == "div > p"));
    assert_eq!(watcher.sheet().unwrap().len().unwrap(), 0);
    assert_eq!(watcher.selector_count(), 0);
    assert_eq!(sink.count(|d| matches!(d, Diagnostic::Watcher(_))), 1);

    // A later valid registration still works.
    watcher.on("p", cb).unwrap();
    assert!(watcher.is_active("p"));
}

#[test]
fn test_pending_selectors_install_when_sheet_becomes_ready() {
    let doc = VirtualDocument::with_deferred_sheets();
    let (sched, sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    watcher.on("p", recorder(&seen, "p")).unwrap();
    watcher.on("li", recorder(&seen, "li")).unwrap();
    assert_eq!(watcher.pending_count(), 2);

    sched.run_frame();
    sched.advance(Duration::from_millis(500));
    assert_eq!(watcher.pending_count(), 2, "still waiting for the sheet");

    doc.set_sheets_ready(true);
    sched.advance(Duration::from_millis(50));
    assert_eq!(watcher.pending_count(), 0);
    assert!(watcher.is_active("p") && watcher.is_active("li"));

    doc.append(VirtualElement::new("li"));
    doc.flush_animations();
    assert_eq!(seen.borrow().len(), 1);
    assert!(sink.is_empty());
}

#[test]
fn test_readiness_timeout_after_default_budget() {
    let doc = VirtualDocument::with_deferred_sheets();
    let (sched, sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();
    watcher.on("p", Rc::new(|_: &VirtualElement| {})).unwrap();

    sched.run_frame();
    sched.advance(Duration::from_millis(14_000));
    assert!(watcher.is_pending("p"));

    sched.advance(Duration::from_millis(1_000));
    assert!(!watcher.is_pending("p"));
    assert_eq!(watcher.selector_count(), 0);

    let timeouts = sink.count(|d| {
        matches!(d, Diagnostic::Watcher(WatcherError::ReadinessTimeout { attempts: 300, .. }))
    });
    assert_eq!(timeouts, 1);
    assert_eq!(sched.pending_timers(), 0, "polling stopped");
}

#[test]
fn test_late_root_then_insertions() {
    let doc = VirtualDocument::without_root();
    let (sched, _sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    watcher.on("p", recorder(&seen, "p")).unwrap();
    assert_eq!(doc.style_node_count(), 0);

    doc.attach_root();
    assert_eq!(doc.style_node_owners(), vec!["chatmod"]);
    sched.run_frame();

    doc.append(VirtualElement::new("p"));
    doc.flush_animations();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_suspend_and_resume() {
    let doc = VirtualDocument::new();
    let (_sched, _sink, registry) = setup(doc.clone());
    let watcher = registry.get_or_create("chatmod").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    watcher.on("p", recorder(&seen, "p")).unwrap();

    watcher.suspend();
    assert!(watcher.sheet().unwrap().is_disabled());
    doc.append(VirtualElement::new("p"));
    doc.flush_animations();
    assert!(seen.borrow().is_empty());

    watcher.resume();
    assert!(!watcher.sheet().unwrap().is_disabled());
    doc.flush_animations();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_registry_returns_existing_watcher_untouched() {
    let doc = VirtualDocument::new();
    let (_sched, _sink, registry) = setup(doc.clone());

    let first = registry.get_or_create("chatmod").unwrap();
    first.on("p", Rc::new(|_: &VirtualElement| {})).unwrap();

    let second = registry.get_or_create("chatmod").unwrap();
    assert!(first.same_watcher(&second));
    assert!(second.is_active("p"));
    assert_eq!(doc.style_node_count(), 1);
    assert_eq!(doc.animation_listener_count(), 1);
}

#[test]
fn test_namespace_validation() {
    let (_sched, _sink, registry) = setup(VirtualDocument::new());
    for bad in ["", "-", "7up", "-9", "a b", "a.b"] {
        assert_eq!(
            registry.get_or_create(bad).err(),
            Some(WatcherError::InvalidNamespace(bad.to_string())),
            "{bad:?} should be rejected"
        );
    }
    for good in ["chatmod", "_x", "-x", "a-1"] {
        assert!(registry.get_or_create(good).is_ok(), "{good:?} should be accepted");
    }
    assert_eq!(registry.len(), 4);
}

#[test]
fn test_standalone_watcher_with_custom_config() {
    let doc = VirtualDocument::with_deferred_sheets();
    let sched = ManualScheduler::new();
    let sink = Rc::new(RecordingSink::new());
    let watcher = InsertionWatcher::with_options(
        "solo",
        doc.clone(),
        Rc::new(sched.clone()),
        WatcherConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_max_poll_attempts(2),
        sink.clone(),
    )
    .unwrap();

    watcher.on("p", Rc::new(|_: &VirtualElement| {})).unwrap();
    sched.run_frame();
    sched.advance(Duration::from_millis(10));

    assert_eq!(
        sink.records(),
        vec![Diagnostic::Watcher(WatcherError::ReadinessTimeout {
            attempts: 2,
            selectors: vec!["p".to_string()],
        })]
    );
}
