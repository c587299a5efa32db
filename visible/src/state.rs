use alloc::vec::Vec;

use crate::TrackerId;

/// Edge-detection state of one registration.
///
/// `was_visible` only flips when a report crosses the registration's threshold; `triggered`
/// latches on the first visible edge and is never cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisibilityState {
    pub was_visible: bool,
    pub triggered: bool,
}

/// The registrations of one tracked element, in registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementSnapshot<E> {
    pub element: E,
    pub callbacks: Vec<VisibilityState>,
}

/// A serializable view of a tracker's bookkeeping, useful for debugging and for asserting
/// state across reconfiguration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerSnapshot<E> {
    pub id: TrackerId,
    pub destroyed: bool,
    /// Elements in the order they were first tracked.
    pub elements: Vec<ElementSnapshot<E>>,
}

impl<E: PartialEq> TrackerSnapshot<E> {
    pub fn element(&self, element: &E) -> Option<&ElementSnapshot<E>> {
        self.elements.iter().find(|s| &s.element == element)
    }
}
