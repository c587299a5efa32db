use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use core::fmt;

use crate::host::{DocumentQuery, MutationRecord, MutationSink, MutationSubscription, TimerHandle};
use crate::key::{ElementKey, ElementSet};
use crate::registry::RegistryLink;
use crate::{
    CallbackResult, Handler, Host, IntersectionEntry, TimerHost, TrackOptions, Tracker,
    WatchCallback, WatchEvent, WatchOptions, WatchPhase, WatchTrigger, WatcherId,
};

struct WatcherInner<E> {
    id: WatcherId,
    selector: String,
    options: WatchOptions<E>,
    callback: WatchCallback<E>,
    phase: WatchPhase,
    tracker: Option<Tracker<E>>,
    mutations: Option<Box<dyn MutationSubscription>>,
    timeout: Option<TimerHandle>,
    // Elements ever handed to the tracker; identity survives removal and re-insertion.
    processed: ElementSet<E>,
    document: Rc<dyn DocumentQuery<E>>,
    timers: Rc<dyn TimerHost>,
    registry: Option<RegistryLink<E>>,
}

impl<E> Drop for WatcherInner<E> {
    fn drop(&mut self) {
        if let Some(mut mutations) = self.mutations.take() {
            mutations.disconnect();
        }
        if let Some(handle) = self.timeout.take() {
            self.timers.clear_timeout(handle);
        }
        // The private tracker disconnects when this was its last handle.
    }
}

/// Watches the document for elements matching a selector and reports their visibility
/// edges to a single callback.
///
/// A watcher owns a private [`Tracker`], a subtree mutation subscription and an optional
/// timeout. Its lifecycle is `Initializing -> Active -> Destroyed`; it is destroyed by
/// [`Watcher::destroy`], by its timeout (which reports [`WatchEvent::NoMatch`] once), or by
/// its first successful report when `once` is set.
///
/// The host only holds weak references: an unregistered watcher stops when its last handle
/// is dropped.
pub struct Watcher<E> {
    inner: Rc<RefCell<WatcherInner<E>>>,
}

impl<E> Clone for Watcher<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: ElementKey> Watcher<E> {
    pub fn new(
        host: &Host<E>,
        selector: impl Into<String>,
        options: WatchOptions<E>,
        callback: impl Fn(WatchEvent<E>) -> CallbackResult + 'static,
    ) -> Self {
        let selector = selector.into();
        let id = WatcherId::next();
        let debug = options.visibility.debug;
        let scan_existing = options.scan_existing;
        let timeout_ms = options.timeout_ms;
        if debug {
            vdebug!(watcher = %id, selector = %selector, ?timeout_ms, "Watcher::new");
        }

        let tracker = Tracker::new(host, options.visibility.clone());
        let watcher = Self {
            inner: Rc::new(RefCell::new(WatcherInner {
                id,
                selector,
                options,
                callback: Rc::new(callback),
                phase: WatchPhase::Initializing,
                tracker: Some(tracker),
                mutations: None,
                timeout: None,
                processed: ElementSet::default(),
                document: Rc::clone(&host.document),
                timers: Rc::clone(&host.timers),
                registry: None,
            })),
        };

        if scan_existing {
            watcher.scan_document();
        }

        let weak = Rc::downgrade(&watcher.inner);
        let sink = MutationSink::new(move |records: &[MutationRecord<E>]| {
            if let Some(inner) = weak.upgrade() {
                Watcher { inner }.on_mutations(records);
            }
        });
        let subscription = host.mutations.observe_subtree(sink);
        watcher.inner.borrow_mut().mutations = Some(subscription);

        if let Some(delay_ms) = timeout_ms.filter(|ms| *ms > 0) {
            let weak = Rc::downgrade(&watcher.inner);
            let handle = host.timers.set_timeout(
                delay_ms,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Watcher { inner }.on_timeout();
                    }
                }),
            );
            watcher.inner.borrow_mut().timeout = Some(handle);
        }

        watcher.inner.borrow_mut().phase = WatchPhase::Active;
        watcher
    }

    pub(crate) fn attach_registry(&self, link: RegistryLink<E>) {
        self.inner.borrow_mut().registry = Some(link);
    }

    pub fn id(&self) -> WatcherId {
        self.inner.borrow().id
    }

    pub fn selector(&self) -> String {
        self.inner.borrow().selector.clone()
    }

    pub fn phase(&self) -> WatchPhase {
        self.inner.borrow().phase
    }

    pub fn is_destroyed(&self) -> bool {
        self.phase() == WatchPhase::Destroyed
    }

    /// The private tracker, until the watcher is destroyed.
    pub fn tracker(&self) -> Option<Tracker<E>> {
        self.inner.borrow().tracker.clone()
    }

    /// Number of distinct elements registered so far.
    pub fn registered_count(&self) -> usize {
        self.inner.borrow().processed.len()
    }

    fn scan_document(&self) {
        let (document, selector) = {
            let w = self.inner.borrow();
            (Rc::clone(&w.document), w.selector.clone())
        };
        match document.query_selector_all(&selector, None) {
            Ok(elements) => {
                for element in elements {
                    self.register(element);
                }
            }
            Err(_err) => {
                verror!(selector = %selector, error = %_err, "invalid selector");
            }
        }
    }

    fn on_mutations(&self, records: &[MutationRecord<E>]) {
        for record in records {
            for node in &record.added {
                if self.is_destroyed() {
                    return;
                }
                self.check_inserted(node);
            }
        }
    }

    /// Registers `node` and every matching descendant of it.
    fn check_inserted(&self, node: &E) {
        let (document, selector) = {
            let w = self.inner.borrow();
            (Rc::clone(&w.document), w.selector.clone())
        };

        match document.matches(node, &selector) {
            Ok(true) => self.register(node.clone()),
            Ok(false) => {}
            Err(_err) => {
                verror!(selector = %selector, error = %_err, "invalid selector");
                return;
            }
        }

        match document.query_selector_all(&selector, Some(node)) {
            Ok(descendants) => {
                for element in descendants {
                    self.register(element);
                }
            }
            Err(_err) => {
                verror!(selector = %selector, error = %_err, "invalid selector");
            }
        }
    }

    fn register(&self, element: E) {
        let (tracker, once, trigger, user_on_invisible, debug) = {
            let mut w = self.inner.borrow_mut();
            if w.phase == WatchPhase::Destroyed {
                return;
            }
            if !w.processed.insert(element.clone()) {
                return;
            }
            let Some(tracker) = w.tracker.clone() else {
                return;
            };
            (
                tracker,
                w.options.once,
                w.options.trigger,
                w.options.visibility.on_invisible.clone(),
                w.options.visibility.debug,
            )
        };
        if debug {
            vdebug!(watcher = %self.id(), "matched element registered");
        }

        let weak = Rc::downgrade(&self.inner);
        let forward = move |element: &E, _entry: &IntersectionEntry<E>| match weak.upgrade() {
            Some(inner) => Watcher { inner }.report(element),
            None => Ok(()),
        };

        match trigger {
            WatchTrigger::Visible => {
                let forward: Handler<E> = Rc::new(forward);
                tracker.track(element, TrackOptions::new().with_once(once), Some(forward));
            }
            WatchTrigger::Invisible => {
                // The registration must outlive its first visible edge to see the next
                // invisible one, so it is never one-shot at the tracker level.
                let on_invisible: Handler<E> =
                    Rc::new(move |element: &E, entry: &IntersectionEntry<E>| {
                        let forwarded = forward(element, entry);
                        let user = user_on_invisible
                            .as_ref()
                            .map_or(Ok(()), |h| h(element, entry));
                        forwarded.and(user)
                    });
                tracker.track(
                    element,
                    TrackOptions::new()
                        .with_once(false)
                        .with_on_invisible(on_invisible),
                    None,
                );
            }
        }
    }

    /// Hands a matched element to the user callback, tearing the watcher down first when
    /// `once` is set so the callback can never run twice.
    fn report(&self, element: &E) -> CallbackResult {
        let (callback, once) = {
            let w = self.inner.borrow();
            if w.phase == WatchPhase::Destroyed {
                return Ok(());
            }
            (Rc::clone(&w.callback), w.options.once)
        };
        if once {
            self.destroy();
        }
        callback(WatchEvent::Matched(element.clone()))
    }

    fn on_timeout(&self) {
        let (_id, callback, debug) = {
            let mut w = self.inner.borrow_mut();
            if w.phase == WatchPhase::Destroyed {
                return;
            }
            // Already fired; nothing left to cancel.
            w.timeout = None;
            (w.id, Rc::clone(&w.callback), w.options.visibility.debug)
        };
        if debug {
            vdebug!(watcher = %_id, "watch timed out without a match");
        }
        self.destroy();
        if let Err(_err) = callback(WatchEvent::NoMatch) {
            verror!(watcher = %_id, error = %_err, "watch callback failed");
        }
    }

    /// Disconnects the mutation subscription, destroys the private tracker and cancels the
    /// pending timeout. Idempotent.
    pub fn destroy(&self) {
        let (id, tracker, mutations, timeout, timers, registry, debug) = {
            let mut w = self.inner.borrow_mut();
            if w.phase == WatchPhase::Destroyed {
                return;
            }
            w.phase = WatchPhase::Destroyed;
            w.processed.clear();
            (
                w.id,
                w.tracker.take(),
                w.mutations.take(),
                w.timeout.take(),
                Rc::clone(&w.timers),
                w.registry.take(),
                w.options.visibility.debug,
            )
        };

        if let Some(mut mutations) = mutations {
            mutations.disconnect();
        }
        if let Some(tracker) = tracker {
            tracker.destroy();
        }
        if let Some(handle) = timeout {
            timers.clear_timeout(handle);
        }
        if let Some(registry) = registry.and_then(|r| r.upgrade()) {
            registry.borrow_mut().watchers.remove(&id);
        }
        if debug {
            vdebug!(watcher = %id, "Watcher::destroy");
        }
    }
}

impl<E: ElementKey> fmt::Debug for Watcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(w) => f
                .debug_struct("Watcher")
                .field("id", &w.id)
                .field("selector", &w.selector)
                .field("phase", &w.phase)
                .field("registered", &w.processed.len())
                .finish(),
            Err(_) => f.write_str("Watcher(<borrowed>)"),
        }
    }
}
