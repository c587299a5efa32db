//! Contracts the host environment implements for the core.
//!
//! The core performs no geometry and never walks a DOM itself. A host (a browser binding, a
//! test double, the in-memory host of `visible-adapter`) provides:
//!
//! - intersection subscriptions ([`IntersectionHost`]),
//! - subtree mutation subscriptions ([`MutationHost`]),
//! - selector queries ([`DocumentQuery`]),
//! - one-shot timers ([`TimerHost`]).
//!
//! Deliveries must be asynchronous with respect to the call that caused them: a host must not
//! invoke a sink from inside `connect`, `observe`, `observe_subtree` or `set_timeout`.
//! Everything runs on one thread; no two deliveries overlap.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{IntersectionEntry, SelectorError, Threshold};

/// Parameters of an intersection subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct ObserverInit<E> {
    /// `None` means the viewport.
    pub root: Option<E>,
    pub root_margin: Option<String>,
    pub threshold: Threshold,
}

/// Receives batches of intersection reports from the host.
pub struct IntersectionSink<E> {
    deliver: Rc<dyn Fn(&[IntersectionEntry<E>])>,
}

impl<E> IntersectionSink<E> {
    pub fn new(deliver: impl Fn(&[IntersectionEntry<E>]) + 'static) -> Self {
        Self {
            deliver: Rc::new(deliver),
        }
    }

    pub fn deliver(&self, entries: &[IntersectionEntry<E>]) {
        (self.deliver)(entries);
    }
}

impl<E> Clone for IntersectionSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Rc::clone(&self.deliver),
        }
    }
}

impl<E> fmt::Debug for IntersectionSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IntersectionSink(..)")
    }
}

/// A live intersection subscription. The core calls `disconnect` before releasing it, both
/// on explicit teardown and when the owning tracker's last handle is dropped.
pub trait IntersectionSubscription<E> {
    fn observe(&mut self, element: &E);
    fn unobserve(&mut self, element: &E);
    /// Stops all deliveries. Reports already queued may still arrive and are ignored by the
    /// core.
    fn disconnect(&mut self);
}

pub trait IntersectionHost<E> {
    fn connect(
        &self,
        init: &ObserverInit<E>,
        sink: IntersectionSink<E>,
    ) -> Box<dyn IntersectionSubscription<E>>;
}

/// One structural change under the watched subtree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord<E> {
    /// Inserted element nodes. Only subtree roots are listed; descendants are found through
    /// [`DocumentQuery::query_selector_all`] scoped to each root.
    pub added: Vec<E>,
}

impl<E> MutationRecord<E> {
    pub fn added(added: Vec<E>) -> Self {
        Self { added }
    }
}

/// Receives batches of mutation records from the host.
pub struct MutationSink<E> {
    deliver: Rc<dyn Fn(&[MutationRecord<E>])>,
}

impl<E> MutationSink<E> {
    pub fn new(deliver: impl Fn(&[MutationRecord<E>]) + 'static) -> Self {
        Self {
            deliver: Rc::new(deliver),
        }
    }

    pub fn deliver(&self, records: &[MutationRecord<E>]) {
        (self.deliver)(records);
    }
}

impl<E> Clone for MutationSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Rc::clone(&self.deliver),
        }
    }
}

impl<E> fmt::Debug for MutationSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MutationSink(..)")
    }
}

pub trait MutationSubscription {
    fn disconnect(&mut self);
}

pub trait MutationHost<E> {
    /// Subscribes to element insertions anywhere under the document body.
    fn observe_subtree(&self, sink: MutationSink<E>) -> Box<dyn MutationSubscription>;
}

pub trait DocumentQuery<E> {
    /// All elements matching `selector` in document order, within `scope` (exclusive of
    /// `scope` itself) or the whole document when `scope` is `None`.
    fn query_selector_all(
        &self,
        selector: &str,
        scope: Option<&E>,
    ) -> Result<Vec<E>, SelectorError>;

    fn matches(&self, element: &E, selector: &str) -> Result<bool, SelectorError>;
}

/// Opaque id of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

pub trait TimerHost {
    fn set_timeout(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle;
    /// Cancelling an already fired or unknown handle is a no-op.
    fn clear_timeout(&self, handle: TimerHandle);
}

/// The set of collaborators trackers and watchers are built from.
///
/// Usually all four come from one host object; see [`Host::new`].
pub struct Host<E> {
    pub intersections: Rc<dyn IntersectionHost<E>>,
    pub mutations: Rc<dyn MutationHost<E>>,
    pub document: Rc<dyn DocumentQuery<E>>,
    pub timers: Rc<dyn TimerHost>,
}

impl<E> Host<E> {
    pub fn new<H>(host: Rc<H>) -> Self
    where
        H: IntersectionHost<E> + MutationHost<E> + DocumentQuery<E> + TimerHost + 'static,
    {
        Self {
            intersections: Rc::clone(&host) as Rc<dyn IntersectionHost<E>>,
            mutations: Rc::clone(&host) as Rc<dyn MutationHost<E>>,
            document: Rc::clone(&host) as Rc<dyn DocumentQuery<E>>,
            timers: host,
        }
    }
}

impl<E> Clone for Host<E> {
    fn clone(&self) -> Self {
        Self {
            intersections: Rc::clone(&self.intersections),
            mutations: Rc::clone(&self.mutations),
            document: Rc::clone(&self.document),
            timers: Rc::clone(&self.timers),
        }
    }
}

impl<E> fmt::Debug for Host<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Host(..)")
    }
}
