//! Headless, edge-triggered element visibility tracking.
//!
//! For an in-memory host (element tree, intersection and mutation simulation, virtual clock),
//! see the `visible-adapter` crate.
//!
//! This crate turns the raw reports of a host's intersection observer into one
//! visible/invisible edge per registered callback, and watches a document subtree for
//! elements matching a selector as they are inserted.
//!
//! It performs no layout or geometry. A host is expected to provide:
//! - intersection subscriptions (root, margin, thresholds → `{target, intersecting, ratio}`)
//! - subtree mutation subscriptions (inserted element roots)
//! - selector queries
//! - one-shot timers
//!
//! The element type `E` is chosen by the host; the core only clones and compares handles.
//! Everything is single-threaded: the types here are `Rc`-based handles that callbacks may
//! re-enter freely.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod error;
mod host;
mod key;
mod options;
mod registry;
mod state;
mod tracker;
mod types;
mod watcher;


pub use error::{CallbackError, CallbackResult, SelectorError};
pub use host::{
    DocumentQuery, Host, IntersectionHost, IntersectionSink, IntersectionSubscription,
    MutationHost, MutationRecord, MutationSink, MutationSubscription, ObserverInit, TimerHandle,
    TimerHost,
};
pub use key::ElementKey;
pub use options::{Handler, TrackOptions, TrackerOptions, WatchCallback, WatchOptions, handler};
pub use registry::Registry;
pub use state::{ElementSnapshot, TrackerSnapshot, VisibilityState};
pub use tracker::Tracker;
pub use types::{
    IntersectionEntry, Targets, Threshold, TrackerId, Transition, WatchEvent, WatchPhase,
    WatchTrigger, WatcherId,
};
pub use watcher::Watcher;
