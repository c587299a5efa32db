use alloc::rc::Rc;
use alloc::string::String;

use crate::{CallbackResult, IntersectionEntry, Threshold, WatchEvent, WatchTrigger};

/// A visibility callback: receives the element and the intersection report that caused the
/// transition.
///
/// Registrations are compared by `Rc` identity, so keep a clone of the handler around if you
/// want to [`crate::Tracker::untrack`] it later.
pub type Handler<E> = Rc<dyn Fn(&E, &IntersectionEntry<E>) -> CallbackResult>;

/// The callback of a [`crate::Watcher`].
pub type WatchCallback<E> = Rc<dyn Fn(WatchEvent<E>) -> CallbackResult>;

/// Wraps a closure into a [`Handler`].
pub fn handler<E>(f: impl Fn(&E, &IntersectionEntry<E>) -> CallbackResult + 'static) -> Handler<E> {
    Rc::new(f)
}

/// Tracker-wide configuration and the defaults every registration starts from.
///
/// Cloning is cheap: callbacks are stored in `Rc`s.
pub struct TrackerOptions<E> {
    /// Scroll container used as the intersection root. `None` means the viewport.
    pub root: Option<E>,
    /// Margin grown around the root, in the host's syntax (e.g. `"0px 0px 200px 0px"`).
    /// `None` leaves the host default.
    pub root_margin: Option<String>,
    pub threshold: Threshold,
    /// Untrack a registration right after its first visible edge.
    pub once: bool,
    pub on_visible: Option<Handler<E>>,
    pub on_invisible: Option<Handler<E>>,
    pub on_enter: Option<Handler<E>>,
    pub on_leave: Option<Handler<E>>,
    /// Emits debug-level lifecycle events for this tracker.
    pub debug: bool,
}

impl<E> Default for TrackerOptions<E> {
    fn default() -> Self {
        Self {
            root: None,
            root_margin: None,
            threshold: Threshold::default(),
            once: false,
            on_visible: None,
            on_invisible: None,
            on_enter: None,
            on_leave: None,
            debug: false,
        }
    }
}

impl<E: Clone> Clone for TrackerOptions<E> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            root_margin: self.root_margin.clone(),
            threshold: self.threshold.clone(),
            once: self.once,
            on_visible: self.on_visible.clone(),
            on_invisible: self.on_invisible.clone(),
            on_enter: self.on_enter.clone(),
            on_leave: self.on_leave.clone(),
            debug: self.debug,
        }
    }
}

impl<E> TrackerOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: Option<E>) -> Self {
        self.root = root;
        self
    }

    pub fn with_root_margin(mut self, root_margin: impl Into<String>) -> Self {
        self.root_margin = Some(root_margin.into());
        self
    }

    pub fn with_threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        self.threshold = threshold.into();
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn with_on_visible(
        mut self,
        f: impl Fn(&E, &IntersectionEntry<E>) -> CallbackResult + 'static,
    ) -> Self {
        self.on_visible = Some(Rc::new(f));
        self
    }

    pub fn with_on_invisible(
        mut self,
        f: impl Fn(&E, &IntersectionEntry<E>) -> CallbackResult + 'static,
    ) -> Self {
        self.on_invisible = Some(Rc::new(f));
        self
    }

    pub fn with_on_enter(
        mut self,
        f: impl Fn(&E, &IntersectionEntry<E>) -> CallbackResult + 'static,
    ) -> Self {
        self.on_enter = Some(Rc::new(f));
        self
    }

    pub fn with_on_leave(
        mut self,
        f: impl Fn(&E, &IntersectionEntry<E>) -> CallbackResult + 'static,
    ) -> Self {
        self.on_leave = Some(Rc::new(f));
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl<E: core::fmt::Debug> core::fmt::Debug for TrackerOptions<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackerOptions")
            .field("root", &self.root)
            .field("root_margin", &self.root_margin)
            .field("threshold", &self.threshold)
            .field("once", &self.once)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Per-registration overrides applied on top of the tracker's [`TrackerOptions`].
///
/// `None` fields inherit the tracker default at registration time. The merged result is
/// frozen into the registration: a later [`crate::Tracker::set_options`] does not rewrite it.
pub struct TrackOptions<E> {
    pub threshold: Option<Threshold>,
    pub once: Option<bool>,
    pub on_visible: Option<Handler<E>>,
    pub on_invisible: Option<Handler<E>>,
    pub on_enter: Option<Handler<E>>,
    pub on_leave: Option<Handler<E>>,
}

impl<E> Default for TrackOptions<E> {
    fn default() -> Self {
        Self {
            threshold: None,
            once: None,
            on_visible: None,
            on_invisible: None,
            on_enter: None,
            on_leave: None,
        }
    }
}

impl<E> Clone for TrackOptions<E> {
    fn clone(&self) -> Self {
        Self {
            threshold: self.threshold.clone(),
            once: self.once,
            on_visible: self.on_visible.clone(),
            on_invisible: self.on_invisible.clone(),
            on_enter: self.on_enter.clone(),
            on_leave: self.on_leave.clone(),
        }
    }
}

impl<E> TrackOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        self.threshold = Some(threshold.into());
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = Some(once);
        self
    }

    pub fn with_on_visible(mut self, h: Handler<E>) -> Self {
        self.on_visible = Some(h);
        self
    }

    pub fn with_on_invisible(mut self, h: Handler<E>) -> Self {
        self.on_invisible = Some(h);
        self
    }

    pub fn with_on_enter(mut self, h: Handler<E>) -> Self {
        self.on_enter = Some(h);
        self
    }

    pub fn with_on_leave(mut self, h: Handler<E>) -> Self {
        self.on_leave = Some(h);
        self
    }
}

impl<E> core::fmt::Debug for TrackOptions<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackOptions")
            .field("threshold", &self.threshold)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

/// The effective configuration of a single registration.
#[derive(Clone)]
pub(crate) struct EntryOptions<E> {
    pub threshold: Threshold,
    pub once: bool,
    pub on_visible: Option<Handler<E>>,
    pub on_invisible: Option<Handler<E>>,
    pub on_enter: Option<Handler<E>>,
    pub on_leave: Option<Handler<E>>,
}

impl<E> EntryOptions<E> {
    pub(crate) fn merge(defaults: &TrackerOptions<E>, overrides: TrackOptions<E>) -> Self {
        // `Threshold` is normalized on construction, so an override is already valid.
        Self {
            threshold: overrides
                .threshold
                .unwrap_or_else(|| defaults.threshold.clone()),
            once: overrides.once.unwrap_or(defaults.once),
            on_visible: overrides.on_visible.or_else(|| defaults.on_visible.clone()),
            on_invisible: overrides
                .on_invisible
                .or_else(|| defaults.on_invisible.clone()),
            on_enter: overrides.on_enter.or_else(|| defaults.on_enter.clone()),
            on_leave: overrides.on_leave.or_else(|| defaults.on_leave.clone()),
        }
    }
}

/// Configuration for a [`crate::Watcher`].
pub struct WatchOptions<E> {
    /// Register elements already in the document when the watcher starts.
    pub scan_existing: bool,
    /// Destroy the watcher after its first successful callback.
    pub once: bool,
    /// Give up after this many milliseconds, reporting [`WatchEvent::NoMatch`].
    pub timeout_ms: Option<u64>,
    pub trigger: WatchTrigger,
    /// Forwarded to the watcher's private tracker.
    pub visibility: TrackerOptions<E>,
}

impl<E> Default for WatchOptions<E> {
    fn default() -> Self {
        Self {
            scan_existing: false,
            once: false,
            timeout_ms: None,
            trigger: WatchTrigger::Visible,
            visibility: TrackerOptions::default(),
        }
    }
}

impl<E: Clone> Clone for WatchOptions<E> {
    fn clone(&self) -> Self {
        Self {
            scan_existing: self.scan_existing,
            once: self.once,
            timeout_ms: self.timeout_ms,
            trigger: self.trigger,
            visibility: self.visibility.clone(),
        }
    }
}

impl<E> WatchOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_existing(mut self, scan_existing: bool) -> Self {
        self.scan_existing = scan_existing;
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// A zero timeout is treated as "no timeout".
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = (timeout_ms > 0).then_some(timeout_ms);
        self
    }

    pub fn with_trigger(mut self, trigger: WatchTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_visibility(mut self, visibility: TrackerOptions<E>) -> Self {
        self.visibility = visibility;
        self
    }
}

impl<E: core::fmt::Debug> core::fmt::Debug for WatchOptions<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("scan_existing", &self.scan_existing)
            .field("once", &self.once)
            .field("timeout_ms", &self.timeout_ms)
            .field("trigger", &self.trigger)
            .field("visibility", &self.visibility)
            .finish()
    }
}
