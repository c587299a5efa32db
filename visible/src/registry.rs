use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::key::ElementKey;
use crate::{
    CallbackResult, Host, Tracker, TrackerId, TrackerOptions, WatchEvent, WatchOptions,
    WatchTrigger, Watcher, WatcherId,
};

pub(crate) struct RegistryInner<E> {
    pub(crate) trackers: BTreeMap<TrackerId, Tracker<E>>,
    pub(crate) watchers: BTreeMap<WatcherId, Watcher<E>>,
}

pub(crate) type RegistryLink<E> = Weak<RefCell<RegistryInner<E>>>;

/// Owns every live tracker and watcher created through it, for bulk listing and teardown.
///
/// Instances remove themselves when destroyed. A watcher's private tracker is not listed.
/// Create one registry per application at startup and call [`Registry::destroy_all`] on
/// shutdown.
pub struct Registry<E> {
    host: Host<E>,
    inner: Rc<RefCell<RegistryInner<E>>>,
}

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: ElementKey> Registry<E> {
    pub fn new(host: Host<E>) -> Self {
        Self {
            host,
            inner: Rc::new(RefCell::new(RegistryInner {
                trackers: BTreeMap::new(),
                watchers: BTreeMap::new(),
            })),
        }
    }

    pub fn host(&self) -> &Host<E> {
        &self.host
    }

    pub fn create_tracker(&self, options: TrackerOptions<E>) -> Tracker<E> {
        let tracker = Tracker::new(&self.host, options);
        tracker.attach_registry(Rc::downgrade(&self.inner));
        self.inner
            .borrow_mut()
            .trackers
            .insert(tracker.id(), tracker.clone());
        tracker
    }

    /// Starts a [`Watcher`] for `selector` and returns its handle.
    pub fn watch(
        &self,
        selector: impl Into<String>,
        options: WatchOptions<E>,
        callback: impl Fn(WatchEvent<E>) -> CallbackResult + 'static,
    ) -> Watcher<E> {
        let watcher = Watcher::new(&self.host, selector, options, callback);
        watcher.attach_registry(Rc::downgrade(&self.inner));
        self.inner
            .borrow_mut()
            .watchers
            .insert(watcher.id(), watcher.clone());
        watcher
    }

    /// Same as [`Registry::watch`], but reports the visible-to-invisible edge of matching
    /// elements.
    pub fn watch_invisible(
        &self,
        selector: impl Into<String>,
        options: WatchOptions<E>,
        callback: impl Fn(WatchEvent<E>) -> CallbackResult + 'static,
    ) -> Watcher<E> {
        self.watch(
            selector,
            options.with_trigger(WatchTrigger::Invisible),
            callback,
        )
    }

    /// Destroys every live watcher whose selector equals `selector`. Returns how many were
    /// destroyed.
    pub fn stop_watching(&self, selector: &str) -> usize {
        let matching: Vec<Watcher<E>> = self
            .inner
            .borrow()
            .watchers
            .values()
            .filter(|w| w.selector() == selector)
            .cloned()
            .collect();
        for watcher in &matching {
            watcher.destroy();
        }
        vdebug!(selector, stopped = matching.len(), "Registry::stop_watching");
        matching.len()
    }

    /// Live trackers, in creation order.
    pub fn trackers(&self) -> Vec<Tracker<E>> {
        self.inner.borrow().trackers.values().cloned().collect()
    }

    /// Live watchers, in creation order.
    pub fn watchers(&self) -> Vec<Watcher<E>> {
        self.inner.borrow().watchers.values().cloned().collect()
    }

    pub fn destroy_all(&self) {
        let (trackers, watchers) = {
            let mut r = self.inner.borrow_mut();
            (
                core::mem::take(&mut r.trackers),
                core::mem::take(&mut r.watchers),
            )
        };
        vdebug!(
            trackers = trackers.len(),
            watchers = watchers.len(),
            "Registry::destroy_all"
        );
        for tracker in trackers.values() {
            tracker.destroy();
        }
        for watcher in watchers.values() {
            watcher.destroy();
        }
    }
}

impl<E: ElementKey> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(r) => f
                .debug_struct("Registry")
                .field("trackers", &r.trackers.len())
                .field("watchers", &r.watchers.len())
                .finish(),
            Err(_) => f.write_str("Registry(<borrowed>)"),
        }
    }
}
