#[cfg(not(feature = "std"))]
use alloc::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "std")]
use std::collections::{HashMap, HashSet};

#[cfg(feature = "std")]
pub(crate) type ElementMap<E, V> = HashMap<E, V>;
#[cfg(not(feature = "std"))]
pub(crate) type ElementMap<E, V> = BTreeMap<E, V>;

#[cfg(feature = "std")]
pub(crate) type ElementSet<E> = HashSet<E>;
#[cfg(not(feature = "std"))]
pub(crate) type ElementSet<E> = BTreeSet<E>;

/// What the core needs from an element handle: cheap clones and identity comparison.
///
/// With `std` this is `Clone + Hash + Eq`; without it, `Clone + Ord`. Handles are expected to
/// compare by node identity, not by content.
#[cfg(feature = "std")]
pub trait ElementKey: Clone + core::hash::Hash + Eq + 'static {}
#[cfg(feature = "std")]
impl<E: Clone + core::hash::Hash + Eq + 'static> ElementKey for E {}

#[cfg(not(feature = "std"))]
pub trait ElementKey: Clone + Ord + 'static {}
#[cfg(not(feature = "std"))]
impl<E: Clone + Ord + 'static> ElementKey for E {}
