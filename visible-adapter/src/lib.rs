//! In-memory host for the `visible` crate.
//!
//! `visible` is headless: it only talks to a host through a few collaborator traits. This crate
//! provides [`SimHost`], a framework-neutral implementation of all of them:
//!
//! - an element tree with a small CSS selector subset
//! - intersection observers driven by explicit ratio updates ([`SimHost::set_ratio`])
//! - batched subtree mutation delivery
//! - a virtual clock for timers ([`SimHost::advance`])
//!
//! Nothing is delivered until [`SimHost::flush`] runs, so tests and demos decide exactly when
//! observers fire.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod clock;
mod node;
mod observers;
mod selector;
mod sim;

#[cfg(test)]
mod tests;

pub use node::NodeId;
pub use sim::SimHost;
