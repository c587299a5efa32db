use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Process-unique identity of a [`crate::Tracker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerId(pub u64);

impl TrackerId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visible-tracker-{}", self.0)
    }
}

/// Process-unique identity of a [`crate::Watcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WatcherId(pub u64);

impl WatcherId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visible-watcher-{}", self.0)
    }
}

/// One or more elements handed to [`crate::Tracker::track`] / [`crate::Tracker::untrack`].
///
/// Callers resolve whatever they hold (a single node, a node list, a query result) into one
/// of these before calling into the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Targets<E> {
    One(E),
    Many(Vec<E>),
}

impl<E> Targets<E> {
    pub fn as_slice(&self) -> &[E] {
        match self {
            Self::One(e) => core::slice::from_ref(e),
            Self::Many(v) => v,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<E> From<E> for Targets<E> {
    fn from(e: E) -> Self {
        Self::One(e)
    }
}

impl<E> From<Vec<E>> for Targets<E> {
    fn from(v: Vec<E>) -> Self {
        Self::Many(v)
    }
}

impl<E: Clone> From<&[E]> for Targets<E> {
    fn from(v: &[E]) -> Self {
        Self::Many(v.to_vec())
    }
}

/// A normalized set of intersection ratios in `[0, 1]`.
///
/// Normalization drops non-finite and out-of-range values and repeated values, keeping the
/// caller's order. An empty result collapses to `[0.0]`, so a `Threshold` is never empty.
///
/// The host is subscribed with every member, but edge detection compares against the first
/// member as given, not the lowest; see [`Threshold::is_met`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "Vec<f64>", into = "Vec<f64>"))]
pub struct Threshold {
    values: Vec<f64>,
}

impl Threshold {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut kept: Vec<f64> = Vec::new();
        for t in values {
            if t.is_finite() && (0.0..=1.0).contains(&t) && !kept.contains(&t) {
                kept.push(t);
            }
        }
        if kept.is_empty() {
            kept.push(0.0);
        }
        Self { values: kept }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The members in ascending order, for hosts that want a sorted threshold list.
    pub fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }

    /// The single value used for visible/invisible edge detection.
    pub fn comparison_value(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    /// Whether an intersection report counts as "visible" under this threshold.
    pub fn is_met(&self, is_intersecting: bool, ratio: f64) -> bool {
        is_intersecting && ratio >= self.comparison_value()
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            values: Vec::from([0.0]),
        }
    }
}

impl From<f64> for Threshold {
    fn from(t: f64) -> Self {
        Self::new([t])
    }
}

impl From<Vec<f64>> for Threshold {
    fn from(v: Vec<f64>) -> Self {
        Self::new(v)
    }
}

impl From<&[f64]> for Threshold {
    fn from(v: &[f64]) -> Self {
        Self::new(v.iter().copied())
    }
}

impl<const N: usize> From<[f64; N]> for Threshold {
    fn from(v: [f64; N]) -> Self {
        Self::new(v)
    }
}

impl From<Threshold> for Vec<f64> {
    fn from(t: Threshold) -> Self {
        t.values
    }
}

/// A single intersection report delivered by the host for one observed element.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntersectionEntry<E> {
    pub target: E,
    pub is_intersecting: bool,
    /// Fraction of the target's box inside the root, in `[0, 1]`.
    pub ratio: f64,
}

impl<E> IntersectionEntry<E> {
    pub fn new(target: E, is_intersecting: bool, ratio: f64) -> Self {
        Self {
            target,
            is_intersecting,
            ratio,
        }
    }
}

/// Which callback slot an invocation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Transition {
    /// The per-registration callback or `on_visible`.
    Visible,
    Invisible,
    Enter,
    Leave,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Invisible => "invisible",
            Self::Enter => "enter",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a [`crate::Watcher`] hands to its callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent<E> {
    /// A matching element crossed the watched edge.
    Matched(E),
    /// The watcher's timeout elapsed before it was destroyed.
    NoMatch,
}

impl<E> WatchEvent<E> {
    pub fn element(&self) -> Option<&E> {
        match self {
            Self::Matched(e) => Some(e),
            Self::NoMatch => None,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }
}

/// Which visibility edge of a matched element a [`crate::Watcher`] reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WatchTrigger {
    #[default]
    Visible,
    Invisible,
}

/// Lifecycle of a [`crate::Watcher`]. `Destroyed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WatchPhase {
    Initializing,
    Active,
    Destroyed,
}
