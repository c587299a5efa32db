use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::host::{IntersectionHost, IntersectionSink, IntersectionSubscription, ObserverInit};
use crate::key::{ElementKey, ElementMap};
use crate::options::EntryOptions;
use crate::registry::RegistryLink;
use crate::{
    ElementSnapshot, Handler, Host, IntersectionEntry, Targets, TrackOptions, TrackerId,
    TrackerOptions, TrackerSnapshot, Transition, VisibilityState,
};

struct CallbackEntry<E> {
    id: u64,
    callback: Option<Handler<E>>,
    options: EntryOptions<E>,
    state: VisibilityState,
}

struct ElementRecord<E> {
    seq: u64,
    callbacks: Vec<CallbackEntry<E>>,
}

struct TrackerInner<E> {
    id: TrackerId,
    options: TrackerOptions<E>,
    host: Rc<dyn IntersectionHost<E>>,
    observer: Option<Box<dyn IntersectionSubscription<E>>>,
    // Bumped on every (re)connect; reports from an older subscription are dropped.
    generation: u64,
    elements: ElementMap<E, ElementRecord<E>>,
    next_seq: u64,
    destroyed: bool,
    registry: Option<RegistryLink<E>>,
}

impl<E> TrackerInner<E> {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    fn disconnect(&mut self) {
        if let Some(mut observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}

// The last handle going away releases the host subscription.
impl<E> Drop for TrackerInner<E> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Snapshot of one visibility edge, taken under the borrow and fired after it is released.
struct Edge<E> {
    calls: Vec<(Transition, Handler<E>)>,
    once: bool,
}

/// Binds host intersection reports to per-registration visible/invisible edges.
///
/// A tracker owns a single intersection subscription and, per tracked element, an ordered
/// list of registrations. Each registration keeps its own edge state, so repeated reports
/// confirming the same state invoke nothing.
///
/// `Tracker` is a cheap, clonable handle; clones share state. It is single-threaded and
/// re-entrant: callbacks may call back into the tracker (including `destroy`).
///
/// After [`Tracker::destroy`] every operation is a no-op.
pub struct Tracker<E> {
    inner: Rc<RefCell<TrackerInner<E>>>,
}

impl<E: ElementKey> Clone for Tracker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: ElementKey> Tracker<E> {
    /// Creates a tracker and connects its intersection subscription.
    pub fn new(host: &Host<E>, options: TrackerOptions<E>) -> Self {
        Self::with_intersection_host(Rc::clone(&host.intersections), options)
    }

    /// Creates a tracker from an intersection host alone.
    pub fn with_intersection_host(
        host: Rc<dyn IntersectionHost<E>>,
        options: TrackerOptions<E>,
    ) -> Self {
        let id = TrackerId::next();
        if options.debug {
            vdebug!(tracker = %id, threshold = ?options.threshold.values(), "Tracker::new");
        }
        let tracker = Self {
            inner: Rc::new(RefCell::new(TrackerInner {
                id,
                options,
                host,
                observer: None,
                generation: 0,
                elements: ElementMap::default(),
                next_seq: 0,
                destroyed: false,
                registry: None,
            })),
        };
        tracker.connect();
        tracker
    }

    pub(crate) fn attach_registry(&self, link: RegistryLink<E>) {
        self.inner.borrow_mut().registry = Some(link);
    }

    pub fn id(&self) -> TrackerId {
        self.inner.borrow().id
    }

    pub fn options(&self) -> TrackerOptions<E> {
        self.inner.borrow().options.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Whether an intersection subscription is currently held.
    pub fn is_connected(&self) -> bool {
        self.inner.borrow().observer.is_some()
    }

    fn connect(&self) {
        let (host, init, generation) = {
            let mut t = self.inner.borrow_mut();
            if t.destroyed || t.observer.is_some() {
                return;
            }
            t.generation = t.generation.wrapping_add(1);
            let init = ObserverInit {
                root: t.options.root.clone(),
                root_margin: t.options.root_margin.clone(),
                threshold: t.options.threshold.clone(),
            };
            (Rc::clone(&t.host), init, t.generation)
        };

        let weak = Rc::downgrade(&self.inner);
        let sink = IntersectionSink::new(move |entries: &[IntersectionEntry<E>]| {
            if let Some(inner) = weak.upgrade() {
                Tracker { inner }.dispatch(generation, entries);
            }
        });
        let observer = host.connect(&init, sink);

        let mut t = self.inner.borrow_mut();
        if t.options.debug {
            vdebug!(tracker = %t.id, generation, "intersection subscription connected");
        }
        t.observer = Some(observer);
    }

    /// Registers `callback` (or just the tracker-level side effects when `None`) for each
    /// element in `targets`.
    ///
    /// `options` are merged over the tracker defaults. Observing an element that is already
    /// tracked only appends a registration; the host subscription is not duplicated.
    /// Registering the same callback twice yields two independent registrations.
    pub fn track(
        &self,
        targets: impl Into<Targets<E>>,
        options: TrackOptions<E>,
        callback: Option<Handler<E>>,
    ) -> &Self {
        let targets = targets.into();
        if self.is_destroyed() {
            vwarn!(tracker = %self.id(), "track called on a destroyed tracker");
            return self;
        }
        // A tracker emptied by `stop_all` reconnects on first use.
        self.connect();

        let mut guard = self.inner.borrow_mut();
        let t = &mut *guard;
        let entry_options = EntryOptions::merge(&t.options, options);
        for element in targets.as_slice() {
            let id = t.next_seq();
            let is_new = !t.elements.contains_key(element);
            if is_new {
                t.elements.insert(
                    element.clone(),
                    ElementRecord {
                        seq: id,
                        callbacks: Vec::new(),
                    },
                );
                if let Some(observer) = t.observer.as_mut() {
                    observer.observe(element);
                }
            }
            if let Some(record) = t.elements.get_mut(element) {
                record.callbacks.push(CallbackEntry {
                    id,
                    callback: callback.clone(),
                    options: entry_options.clone(),
                    state: VisibilityState::default(),
                });
                if t.options.debug {
                    vdebug!(
                        tracker = %t.id,
                        registrations = record.callbacks.len(),
                        is_new,
                        "observing element"
                    );
                }
            }
        }
        drop(guard);
        self
    }

    /// Removes registrations for each element in `targets`.
    ///
    /// With `Some(callback)`, only registrations holding that exact handler (by `Rc`
    /// identity) are removed; otherwise every registration of the element is. An element
    /// left without registrations is unobserved and forgotten.
    pub fn untrack(&self, targets: impl Into<Targets<E>>, callback: Option<&Handler<E>>) -> &Self {
        let targets = targets.into();
        let mut guard = self.inner.borrow_mut();
        let t = &mut *guard;
        if t.destroyed {
            return self;
        }
        for element in targets.as_slice() {
            let Some(record) = t.elements.get_mut(element) else {
                continue;
            };
            if let Some(cb) = callback {
                record
                    .callbacks
                    .retain(|c| !c.callback.as_ref().is_some_and(|h| Rc::ptr_eq(h, cb)));
            } else {
                record.callbacks.clear();
            }
            if record.callbacks.is_empty() {
                t.elements.remove(element);
                if let Some(observer) = t.observer.as_mut() {
                    observer.unobserve(element);
                }
                if t.options.debug {
                    vdebug!(tracker = %t.id, "unobserving element");
                }
            }
        }
        drop(guard);
        self
    }

    fn untrack_registration(&self, element: &E, id: u64) {
        let mut guard = self.inner.borrow_mut();
        let t = &mut *guard;
        if t.destroyed {
            return;
        }
        let Some(record) = t.elements.get_mut(element) else {
            return;
        };
        record.callbacks.retain(|c| c.id != id);
        if record.callbacks.is_empty() {
            t.elements.remove(element);
            if let Some(observer) = t.observer.as_mut() {
                observer.unobserve(element);
            }
        }
        if t.options.debug {
            vdebug!(tracker = %t.id, registration = id, "one-shot registration removed");
        }
    }

    /// Whether any registration of `element` currently considers it visible.
    pub fn is_visible(&self, element: &E) -> bool {
        self.inner
            .borrow()
            .elements
            .get(element)
            .is_some_and(|r| r.callbacks.iter().any(|c| c.state.was_visible))
    }

    pub fn is_tracking(&self, element: &E) -> bool {
        self.inner.borrow().elements.contains_key(element)
    }

    /// The tracked elements, in the order they were first tracked.
    pub fn tracked_elements(&self) -> Vec<E> {
        let t = self.inner.borrow();
        let mut records: Vec<(&E, u64)> = t.elements.iter().map(|(e, r)| (e, r.seq)).collect();
        records.sort_unstable_by_key(|(_, seq)| *seq);
        records.into_iter().map(|(e, _)| e.clone()).collect()
    }

    /// Edge state of every registration of `element`, in registration order.
    pub fn callback_states(&self, element: &E) -> Vec<VisibilityState> {
        self.inner
            .borrow()
            .elements
            .get(element)
            .map(|r| r.callbacks.iter().map(|c| c.state).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> TrackerSnapshot<E> {
        let elements = self
            .tracked_elements()
            .into_iter()
            .map(|element| ElementSnapshot {
                callbacks: self.callback_states(&element),
                element,
            })
            .collect();
        let t = self.inner.borrow();
        TrackerSnapshot {
            id: t.id,
            destroyed: t.destroyed,
            elements,
        }
    }

    /// Replaces the tracker defaults and recreates the intersection subscription.
    ///
    /// Every tracked element is observed again on the new subscription. Existing
    /// registrations keep their merged options and their edge state.
    pub fn set_options(&self, options: TrackerOptions<E>) {
        {
            let mut t = self.inner.borrow_mut();
            if t.destroyed {
                return;
            }
            t.options = options;
            t.disconnect();
            if t.options.debug {
                vdebug!(
                    tracker = %t.id,
                    threshold = ?t.options.threshold.values(),
                    "Tracker::set_options"
                );
            }
        }
        self.connect();

        let elements = self.tracked_elements();
        let mut t = self.inner.borrow_mut();
        if let Some(observer) = t.observer.as_mut() {
            for element in &elements {
                observer.observe(element);
            }
        }
    }

    /// Clones the current options, applies `f`, then delegates to `set_options`.
    pub fn update_options(&self, f: impl FnOnce(&mut TrackerOptions<E>)) {
        let mut next = self.options();
        f(&mut next);
        self.set_options(next);
    }

    /// Releases the subscription and forgets every registration.
    ///
    /// Unlike [`Tracker::destroy`], the tracker stays usable: the next `track` reconnects.
    pub fn stop_all(&self) {
        let mut t = self.inner.borrow_mut();
        t.disconnect();
        t.elements.clear();
        if t.options.debug {
            vdebug!(tracker = %t.id, "Tracker::stop_all");
        }
    }

    /// Stops everything and marks the tracker unusable. Idempotent.
    pub fn destroy(&self) {
        let (id, registry) = {
            let mut t = self.inner.borrow_mut();
            if t.destroyed {
                return;
            }
            t.disconnect();
            t.elements.clear();
            t.destroyed = true;
            if t.options.debug {
                vdebug!(tracker = %t.id, "Tracker::destroy");
            }
            (t.id, t.registry.take())
        };
        if let Some(registry) = registry.and_then(|r| r.upgrade()) {
            registry.borrow_mut().trackers.remove(&id);
        }
    }

    fn dispatch(&self, generation: u64, entries: &[IntersectionEntry<E>]) {
        for entry in entries {
            let ids: Vec<u64> = {
                let t = self.inner.borrow();
                if t.destroyed || t.generation != generation {
                    return;
                }
                match t.elements.get(&entry.target) {
                    Some(record) => record.callbacks.iter().map(|c| c.id).collect(),
                    None => continue,
                }
            };
            vtrace!(
                is_intersecting = entry.is_intersecting,
                ratio = entry.ratio,
                registrations = ids.len(),
                "intersection report"
            );
            for id in ids {
                self.process(entry, id);
            }
        }
    }

    fn process(&self, entry: &IntersectionEntry<E>, id: u64) {
        let (_tracker, debug, edge) = {
            let mut guard = self.inner.borrow_mut();
            let t = &mut *guard;
            let Some(cb) = t
                .elements
                .get_mut(&entry.target)
                .and_then(|r| r.callbacks.iter_mut().find(|c| c.id == id))
            else {
                return;
            };
            let Some(edge) = Self::advance(cb, entry) else {
                return;
            };
            (t.id, t.options.debug, edge)
        };

        for (_transition, handler) in &edge.calls {
            match handler(&entry.target, entry) {
                Ok(()) => {
                    if debug {
                        vdebug!(
                            tracker = %_tracker,
                            transition = %_transition,
                            "callback triggered"
                        );
                    }
                }
                Err(_err) => {
                    verror!(
                        tracker = %_tracker,
                        transition = %_transition,
                        error = %_err,
                        "callback failed"
                    );
                }
            }
        }

        if edge.once {
            self.untrack_registration(&entry.target, id);
        }
    }

    /// Applies one report to one registration; returns the callbacks to fire on an edge.
    fn advance(cb: &mut CallbackEntry<E>, entry: &IntersectionEntry<E>) -> Option<Edge<E>> {
        let visible = cb
            .options
            .threshold
            .is_met(entry.is_intersecting, entry.ratio);
        if visible == cb.state.was_visible {
            return None;
        }
        cb.state.was_visible = visible;

        let o = &cb.options;
        let calls: Vec<(Transition, Handler<E>)> = if visible {
            cb.state.triggered = true;
            [
                (Transition::Visible, cb.callback.clone()),
                (Transition::Visible, o.on_visible.clone()),
                (Transition::Enter, o.on_enter.clone()),
            ]
            .into_iter()
            .filter_map(|(t, h)| h.map(|h| (t, h)))
            .collect()
        } else {
            [
                (Transition::Invisible, o.on_invisible.clone()),
                (Transition::Leave, o.on_leave.clone()),
            ]
            .into_iter()
            .filter_map(|(t, h)| h.map(|h| (t, h)))
            .collect()
        };

        Some(Edge {
            calls,
            once: o.once && cb.state.triggered,
        })
    }
}

impl<E: ElementKey> fmt::Debug for Tracker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(t) => f
                .debug_struct("Tracker")
                .field("id", &t.id)
                .field("elements", &t.elements.len())
                .field("connected", &t.observer.is_some())
                .field("destroyed", &t.destroyed)
                .finish(),
            Err(_) => f.write_str("Tracker(<borrowed>)"),
        }
    }
}
