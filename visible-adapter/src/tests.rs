use crate::*;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use visible::{
    CallbackResult, DocumentQuery, Handler, IntersectionEntry, Registry, SelectorError,
    TrackOptions, Tracker, TrackerOptions, WatchEvent, WatchOptions, WatchPhase, Watcher,
    handler,
};

fn counter() -> (Rc<Cell<usize>>, Handler<NodeId>) {
    let count = Rc::new(Cell::new(0usize));
    let h = {
        let count = Rc::clone(&count);
        handler(move |_: &NodeId, _: &IntersectionEntry<NodeId>| {
            count.set(count.get() + 1);
            Ok(())
        })
    };
    (count, h)
}

fn recorder() -> (
    Rc<RefCell<Vec<WatchEvent<NodeId>>>>,
    impl Fn(WatchEvent<NodeId>) -> CallbackResult + 'static,
) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let cb = {
        let events = Rc::clone(&events);
        move |event: WatchEvent<NodeId>| -> CallbackResult {
            events.borrow_mut().push(event);
            Ok(())
        }
    };
    (events, cb)
}

fn element(sim: &SimHost, parent: NodeId, tag: &str, classes: &[&str]) -> NodeId {
    let node = sim.create_element(tag);
    for class in classes {
        sim.add_class(node, *class);
    }
    sim.append_child(parent, node);
    node
}

#[test]
fn selector_subset_matches_in_document_order() {
    let sim = SimHost::new();
    let section = sim.create_element("SECTION");
    sim.set_id(section, "feed");
    sim.append_child(sim.body(), section);
    let card = element(&sim, section, "div", &["card", "ad"]);
    let other = element(&sim, sim.body(), "div", &[]);
    let detached = sim.create_element("div");
    sim.add_class(detached, "card");

    let q = |selector: &str| sim.query_selector_all(selector, None).unwrap();
    assert_eq!(q("div"), vec![card, other]);
    assert_eq!(q("section div.card.ad"), vec![card]);
    assert_eq!(q("#feed .card"), vec![card]);
    assert_eq!(q("* .ad"), vec![card]);
    assert_eq!(q("section, .ad"), vec![section, card]);
    assert_eq!(q("SECTION"), vec![section]);
    assert!(q(".card.missing").is_empty());

    assert_eq!(
        sim.query_selector_all(".card", Some(&section)).unwrap(),
        vec![card]
    );
    assert!(sim.query_selector_all(".card", Some(&card)).unwrap().is_empty());
    assert!(sim.matches(&card, "#feed div").unwrap());
    assert!(sim.matches(&detached, ".card").unwrap());
    assert!(!sim.matches(&other, "section div").unwrap());

    for bad in ["div > p", "[data-x]", "a,", ":hover", "#", "div..x", ""] {
        assert!(
            matches!(
                sim.query_selector_all(bad, None),
                Err(SelectorError::Invalid { .. })
            ),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn threshold_crossings_drive_edges() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &[]);
    let (invisible_count, on_invisible) = counter();
    let tracker = Tracker::new(
        &sim.host(),
        TrackerOptions {
            on_invisible: Some(on_invisible),
            ..TrackerOptions::new().with_threshold(0.5)
        },
    );
    let (visible_count, cb) = counter();
    tracker.track(card, TrackOptions::new(), Some(cb));
    sim.flush();
    assert_eq!(visible_count.get(), 0);

    sim.set_ratio(card, 0.3);
    sim.flush();
    assert_eq!(visible_count.get(), 0);

    sim.set_ratio(card, 0.6);
    sim.flush();
    assert_eq!(visible_count.get(), 1);
    assert!(tracker.is_visible(&card));

    sim.set_ratio(card, 0.9);
    sim.flush();
    assert_eq!(visible_count.get(), 1);

    sim.set_ratio(card, 0.0);
    sim.flush();
    assert_eq!(visible_count.get(), 1);
    assert_eq!(invisible_count.get(), 1);
    assert!(!tracker.is_visible(&card));
}

#[test]
fn newly_observed_element_gets_an_initial_report() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &[]);
    sim.set_ratio(card, 1.0);

    let tracker = Tracker::new(&sim.host(), TrackerOptions::new());
    let (count, cb) = counter();
    tracker.track(card, TrackOptions::new(), Some(cb));
    assert_eq!(count.get(), 0);
    sim.flush();
    assert_eq!(count.get(), 1);
    assert_eq!(sim.observed_count(card), 1);
}

#[test]
fn detaching_an_element_reports_it_invisible() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &[]);
    sim.set_ratio(card, 1.0);
    let (leave_count, on_leave) = counter();
    let tracker = Tracker::new(
        &sim.host(),
        TrackerOptions {
            on_leave: Some(on_leave),
            ..TrackerOptions::new()
        },
    );
    let (count, cb) = counter();
    tracker.track(card, TrackOptions::new(), Some(cb));
    sim.flush();

    sim.remove(card);
    sim.flush();
    assert_eq!(leave_count.get(), 1);
    assert!(!sim.is_connected(card));

    sim.append_child(sim.body(), card);
    sim.flush();
    assert_eq!(count.get(), 2);
}

#[test]
fn root_limits_what_counts_as_intersecting() {
    let sim = SimHost::new();
    let scroller = element(&sim, sim.body(), "div", &["scroller"]);
    let card = element(&sim, sim.body(), "div", &[]);
    sim.set_ratio(card, 1.0);

    let tracker = Tracker::new(&sim.host(), TrackerOptions::new().with_root(Some(scroller)));
    let (count, cb) = counter();
    tracker.track(card, TrackOptions::new(), Some(cb));
    sim.flush();
    assert_eq!(count.get(), 0);

    sim.append_child(scroller, card);
    sim.flush();
    assert_eq!(count.get(), 1);
}

#[test]
fn one_shot_registration_stops_observing() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &[]);
    let tracker = Tracker::new(&sim.host(), TrackerOptions::new());
    let (count, cb) = counter();
    tracker.track(card, TrackOptions::new().with_once(true), Some(cb));
    sim.flush();

    for ratio in [1.0, 0.0, 1.0] {
        sim.set_ratio(card, ratio);
        sim.flush();
    }
    assert_eq!(count.get(), 1);
    assert_eq!(sim.observed_count(card), 0);
    assert!(!tracker.is_tracking(&card));
}

#[test]
fn watcher_registers_existing_matches_once_each() {
    let sim = SimHost::new();
    let list = element(&sim, sim.body(), "ul", &[]);
    let cards: Vec<NodeId> = (0..3)
        .map(|_| element(&sim, list, "li", &["card"]))
        .collect();
    element(&sim, list, "li", &[]);
    sim.flush();

    let registry = Registry::new(sim.host());
    let (events, cb) = recorder();
    let watcher = registry.watch(
        "li.card",
        WatchOptions::new().with_scan_existing(true),
        cb,
    );
    assert_eq!(watcher.phase(), WatchPhase::Active);
    assert_eq!(watcher.registered_count(), 3);
    sim.flush();

    // Moving a processed element under a new parent must not register it again.
    let shelf = element(&sim, sim.body(), "ul", &[]);
    sim.remove(cards[1]);
    sim.append_child(shelf, cards[1]);
    sim.flush();
    assert_eq!(sim.parent(cards[1]), Some(shelf));
    assert_eq!(watcher.registered_count(), 3);
    assert_eq!(sim.observed_count(cards[1]), 1);

    for card in &cards {
        sim.set_ratio(*card, 1.0);
    }
    sim.flush();
    assert_eq!(
        *events.borrow(),
        cards.iter().map(|c| WatchEvent::Matched(*c)).collect::<Vec<_>>()
    );
}

#[test]
fn watcher_finds_matches_inside_inserted_subtree() {
    let sim = SimHost::new();
    let (events, cb) = recorder();
    let watcher = Watcher::new(&sim.host(), ".card", WatchOptions::new(), cb);

    // Built detached, then inserted with a single mutation.
    let wrapper = sim.create_element("div");
    let inner = element(&sim, wrapper, "section", &[]);
    let card = element(&sim, inner, "div", &["card"]);
    sim.append_child(sim.body(), wrapper);
    sim.flush();
    assert_eq!(watcher.registered_count(), 1);

    sim.set_ratio(card, 1.0);
    sim.flush();
    assert_eq!(*events.borrow(), vec![WatchEvent::Matched(card)]);
}

#[test]
fn watcher_once_reports_first_match_and_releases_everything() {
    let sim = SimHost::new();
    let a = element(&sim, sim.body(), "div", &["card"]);
    let b = element(&sim, sim.body(), "div", &["card"]);
    sim.set_ratio(a, 1.0);
    sim.set_ratio(b, 1.0);

    let (events, cb) = recorder();
    let watcher = Watcher::new(
        &sim.host(),
        ".card",
        WatchOptions::new()
            .with_scan_existing(true)
            .with_once(true)
            .with_timeout_ms(1_000),
        cb,
    );
    sim.flush();

    assert_eq!(*events.borrow(), vec![WatchEvent::Matched(a)]);
    assert!(watcher.is_destroyed());
    assert_eq!(sim.live_intersection_subscriptions(), 0);
    assert_eq!(sim.live_mutation_subscriptions(), 0);
    assert_eq!(sim.pending_timers(), 0);

    sim.advance(2_000);
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn watcher_timeout_reports_no_match_exactly_once() {
    let sim = SimHost::new();
    let (events, cb) = recorder();
    let watcher = Watcher::new(
        &sim.host(),
        ".missing",
        WatchOptions::new().with_timeout_ms(200),
        cb,
    );

    sim.advance(199);
    assert!(events.borrow().is_empty());
    assert_eq!(sim.pending_timers(), 1);

    sim.advance(1);
    assert_eq!(*events.borrow(), vec![WatchEvent::NoMatch]);
    assert_eq!(sim.now_ms(), 200);
    assert!(watcher.is_destroyed());
    assert_eq!(sim.live_intersection_subscriptions(), 0);
    assert_eq!(sim.live_mutation_subscriptions(), 0);

    watcher.destroy();
    sim.advance(1_000);
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn invalid_selector_never_matches() {
    let sim = SimHost::new();
    element(&sim, sim.body(), "p", &[]);
    let (events, cb) = recorder();
    let watcher = Watcher::new(
        &sim.host(),
        "div > p",
        WatchOptions::new().with_scan_existing(true),
        cb,
    );
    let p = element(&sim, sim.body(), "p", &[]);
    sim.set_ratio(p, 1.0);
    sim.flush();

    assert_eq!(watcher.registered_count(), 0);
    assert_eq!(watcher.phase(), WatchPhase::Active);
    assert!(events.borrow().is_empty());
}

#[test]
fn invisible_watch_reports_each_leave() {
    let sim = SimHost::new();
    let ad = element(&sim, sim.body(), "div", &["ad"]);
    let registry = Registry::new(sim.host());
    let (events, cb) = recorder();
    registry.watch_invisible(".ad", WatchOptions::new().with_scan_existing(true), cb);
    sim.flush();

    sim.set_ratio(ad, 1.0);
    sim.flush();
    assert!(events.borrow().is_empty());

    for ratio in [0.0, 1.0, 0.0] {
        sim.set_ratio(ad, ratio);
        sim.flush();
    }
    assert_eq!(
        *events.borrow(),
        vec![WatchEvent::Matched(ad), WatchEvent::Matched(ad)]
    );
}

#[test]
fn stop_watching_destroys_watchers_by_selector() {
    let sim = SimHost::new();
    let registry = Registry::new(sim.host());
    for selector in [".a", ".a", ".b"] {
        let (_, cb) = recorder();
        registry.watch(selector, WatchOptions::new(), cb);
    }
    assert_eq!(sim.live_mutation_subscriptions(), 3);

    assert_eq!(registry.stop_watching(".a"), 2);
    assert_eq!(registry.stop_watching(".a"), 0);
    assert_eq!(registry.watchers().len(), 1);
    assert_eq!(sim.live_mutation_subscriptions(), 1);
}

#[test]
fn destroy_all_releases_host_resources() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &["card"]);
    let registry = Registry::new(sim.host());
    let tracker = registry.create_tracker(TrackerOptions::new());
    tracker.track(card, TrackOptions::new(), None);
    let (_, cb) = recorder();
    registry.watch(
        ".card",
        WatchOptions::new()
            .with_scan_existing(true)
            .with_timeout_ms(500),
        cb,
    );
    assert_eq!(sim.observed_count(card), 2);

    registry.destroy_all();
    assert!(tracker.is_destroyed());
    assert_eq!(sim.observed_count(card), 0);
    assert_eq!(sim.live_intersection_subscriptions(), 0);
    assert_eq!(sim.live_mutation_subscriptions(), 0);
    assert_eq!(sim.pending_timers(), 0);
}

#[test]
fn dropped_tracker_and_watcher_disconnect_from_the_host() {
    let sim = SimHost::new();
    let card = element(&sim, sim.body(), "div", &["card"]);
    let (count, cb) = counter();
    let tracker = Tracker::new(&sim.host(), TrackerOptions::new());
    tracker.track(card, TrackOptions::new(), Some(cb));
    let (events, watch_cb) = recorder();
    let watcher = Watcher::new(
        &sim.host(),
        ".card",
        WatchOptions::new()
            .with_scan_existing(true)
            .with_timeout_ms(500),
        watch_cb,
    );
    assert_eq!(sim.live_intersection_subscriptions(), 2);
    assert_eq!(sim.live_mutation_subscriptions(), 1);
    assert_eq!(sim.pending_timers(), 1);

    drop(watcher);
    drop(tracker);
    assert_eq!(sim.live_intersection_subscriptions(), 0);
    assert_eq!(sim.live_mutation_subscriptions(), 0);
    assert_eq!(sim.pending_timers(), 0);
    assert_eq!(sim.observed_count(card), 0);

    sim.set_ratio(card, 1.0);
    sim.append_child(sim.body(), sim.create_element("div"));
    sim.advance(1_000);
    assert_eq!(count.get(), 0);
    assert!(events.borrow().is_empty());
}

#[test]
fn timers_fire_in_deadline_order_and_respect_cancellation() {
    let sim = SimHost::new();
    let host = sim.host();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let push = |label: &'static str| -> Box<dyn FnOnce()> {
        let fired = Rc::clone(&fired);
        Box::new(move || fired.borrow_mut().push(label))
    };
    host.timers.set_timeout(50, push("b"));
    host.timers.set_timeout(10, push("a"));
    let cancelled = host.timers.set_timeout(50, push("c"));
    host.timers.set_timeout(50, push("d"));
    host.timers.clear_timeout(cancelled);

    sim.advance(100);
    assert_eq!(*fired.borrow(), vec!["a", "b", "d"]);
    assert_eq!(sim.now_ms(), 100);
    assert_eq!(sim.pending_timers(), 0);
}
