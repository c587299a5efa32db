use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use visible::{
    DocumentQuery, Host, IntersectionHost, IntersectionSink, IntersectionSubscription,
    MutationHost, MutationRecord, MutationSink, MutationSubscription, ObserverInit,
    SelectorError, TimerHandle, TimerHost,
};

use crate::clock::Clock;
use crate::node::{NodeId, Tree};
use crate::observers::{IntersectionObserverState, MutationObserverState};
use crate::selector::SelectorList;

// Deliveries that keep producing new deliveries are cut off after this many rounds.
const MAX_FLUSH_ROUNDS: usize = 1024;

struct SimState {
    tree: Tree,
    // Raw ratios set by the driver; detached nodes always report zero.
    ratios: HashMap<NodeId, f64>,
    // Live observers only, in connection order.
    intersections: Vec<IntersectionObserverState>,
    mutations: Vec<MutationObserverState>,
    next_observer: u64,
    clock: Clock,
}

impl SimState {
    fn next_observer_id(&mut self) -> u64 {
        self.next_observer += 1;
        self.next_observer
    }

    fn ratio_in(
        tree: &Tree,
        ratios: &HashMap<NodeId, f64>,
        root: Option<NodeId>,
        node: NodeId,
    ) -> f64 {
        let outside_root = root.is_some_and(|r| r == node || !tree.contains(r, node));
        if outside_root || !tree.is_connected(node) {
            return 0.0;
        }
        ratios.get(&node).copied().unwrap_or(0.0)
    }

    /// Re-evaluates `nodes` against every live intersection observer.
    fn refresh(&mut self, nodes: &[NodeId]) {
        let Self {
            tree,
            ratios,
            intersections,
            ..
        } = self;
        for observer in intersections.iter_mut() {
            for &node in nodes {
                let ratio = Self::ratio_in(tree, ratios, observer.root, node);
                observer.update(node, ratio);
            }
        }
    }
}

/// In-memory host: an element tree, simulated intersection and mutation observers, and a
/// virtual clock.
///
/// `SimHost` is a cheap, clonable handle; clones share state. Nothing is delivered until
/// [`SimHost::flush`] (or [`SimHost::advance`]) is called, which mirrors the asynchronous
/// delivery of browser observers.
///
/// Intersection ratios are set explicitly with [`SimHost::set_ratio`]. Root margins are
/// not simulated. A node outside an observer's root, or detached from `body`, reports zero.
#[derive(Clone)]
pub struct SimHost {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                tree: Tree::new(),
                ratios: HashMap::new(),
                intersections: Vec::new(),
                mutations: Vec::new(),
                next_observer: 0,
                clock: Clock::new(),
            })),
        }
    }

    /// The collaborator set for `visible` trackers, watchers and registries.
    pub fn host(&self) -> Host<NodeId> {
        Host::new(Rc::new(self.clone()))
    }

    pub fn body(&self) -> NodeId {
        self.state.borrow().tree.body()
    }

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.state.borrow_mut().tree.create(tag)
    }

    pub fn set_id(&self, node: NodeId, id: impl Into<String>) {
        if let Some(n) = self.state.borrow_mut().tree.get_mut(node) {
            n.id = Some(id.into());
        }
    }

    pub fn add_class(&self, node: NodeId, class: impl Into<String>) {
        if let Some(n) = self.state.borrow_mut().tree.get_mut(node) {
            let class = class.into();
            if !n.classes.contains(&class) {
                n.classes.push(class);
            }
        }
    }

    /// Moves `child` under `parent`. Inserting into a connected parent queues one mutation
    /// record listing `child` only.
    ///
    /// Returns `false` (and changes nothing) for unknown nodes or a move that would create
    /// a cycle.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let mut s = self.state.borrow_mut();
        if !s.tree.append(parent, child) {
            sim_warn!(%parent, %child, "append_child rejected");
            return false;
        }
        if s.tree.is_connected(child) {
            for observer in s.mutations.iter_mut() {
                observer.queue.push(MutationRecord::added(vec![child]));
            }
        }
        let subtree = s.tree.subtree(child);
        s.refresh(&subtree);
        true
    }

    /// Detaches `node` (and its subtree) from its parent. The node keeps its identity.
    pub fn remove(&self, node: NodeId) {
        let mut s = self.state.borrow_mut();
        if node == s.tree.body() {
            return;
        }
        s.tree.detach(node);
        let subtree = s.tree.subtree(node);
        s.refresh(&subtree);
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().tree.parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state.borrow().tree.children(node).to_vec()
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.state.borrow().tree.is_connected(node)
    }

    /// Sets the intersection ratio of `node`, clamped to `[0, 1]`.
    pub fn set_ratio(&self, node: NodeId, ratio: f64) {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut s = self.state.borrow_mut();
        s.ratios.insert(node, ratio);
        s.refresh(&[node]);
    }

    /// The ratio `node` currently reports against the viewport.
    pub fn ratio(&self, node: NodeId) -> f64 {
        let s = self.state.borrow();
        SimState::ratio_in(&s.tree, &s.ratios, None, node)
    }

    /// Delivers queued mutation records, then queued intersection entries, repeating until
    /// nothing is left.
    pub fn flush(&self) {
        for _ in 0..MAX_FLUSH_ROUNDS {
            let mutations: Vec<(MutationSink<NodeId>, Vec<MutationRecord<NodeId>>)> = self
                .state
                .borrow_mut()
                .mutations
                .iter_mut()
                .filter(|m| !m.queue.is_empty())
                .map(|m| (m.sink.clone(), std::mem::take(&mut m.queue)))
                .collect();
            for (sink, records) in &mutations {
                sim_trace!(records = records.len(), "delivering mutations");
                sink.deliver(records);
            }

            let intersections: Vec<_> = self
                .state
                .borrow_mut()
                .intersections
                .iter_mut()
                .filter(|o| !o.queue.is_empty())
                .map(|o| (o.sink.clone(), std::mem::take(&mut o.queue)))
                .collect();
            for (sink, entries) in &intersections {
                sim_trace!(entries = entries.len(), "delivering intersections");
                sink.deliver(entries);
            }

            if mutations.is_empty() && intersections.is_empty() {
                return;
            }
        }
        sim_warn!(rounds = MAX_FLUSH_ROUNDS, "flush did not settle");
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().clock.now_ms()
    }

    /// Moves the clock forward by `ms`, firing due timers in deadline order and flushing
    /// after each one.
    pub fn advance(&self, ms: u64) {
        self.flush();
        let until = self.now_ms().saturating_add(ms);
        loop {
            let due = self.state.borrow_mut().clock.pop_due(until);
            let Some((_handle, callback)) = due else {
                break;
            };
            sim_trace!(timer = _handle.0, now_ms = self.now_ms(), "timer fired");
            callback();
            self.flush();
        }
        self.state.borrow_mut().clock.set_now(until);
    }

    /// How many live intersection observers currently observe `node`.
    pub fn observed_count(&self, node: NodeId) -> usize {
        self.state
            .borrow()
            .intersections
            .iter()
            .filter(|o| o.observes(node))
            .count()
    }

    pub fn live_intersection_subscriptions(&self) -> usize {
        self.state.borrow().intersections.len()
    }

    pub fn live_mutation_subscriptions(&self) -> usize {
        self.state.borrow().mutations.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().clock.pending()
    }
}

impl fmt::Debug for SimHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(s) => f
                .debug_struct("SimHost")
                .field("now_ms", &s.clock.now_ms())
                .field("intersections", &s.intersections.len())
                .field("mutations", &s.mutations.len())
                .field("pending_timers", &s.clock.pending())
                .finish(),
            Err(_) => f.write_str("SimHost(<borrowed>)"),
        }
    }
}

struct SimIntersectionSubscription {
    state: Rc<RefCell<SimState>>,
    id: u64,
}

impl IntersectionSubscription<NodeId> for SimIntersectionSubscription {
    fn observe(&mut self, element: &NodeId) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if let Some(observer) = s.intersections.iter_mut().find(|o| o.id == self.id) {
            let ratio = SimState::ratio_in(&s.tree, &s.ratios, observer.root, *element);
            observer.observe(*element, ratio);
        }
    }

    fn unobserve(&mut self, element: &NodeId) {
        let mut s = self.state.borrow_mut();
        if let Some(observer) = s.intersections.iter_mut().find(|o| o.id == self.id) {
            observer.unobserve(*element);
        }
    }

    fn disconnect(&mut self) {
        self.state
            .borrow_mut()
            .intersections
            .retain(|o| o.id != self.id);
    }
}

impl IntersectionHost<NodeId> for SimHost {
    fn connect(
        &self,
        init: &ObserverInit<NodeId>,
        sink: IntersectionSink<NodeId>,
    ) -> Box<dyn IntersectionSubscription<NodeId>> {
        let mut s = self.state.borrow_mut();
        let id = s.next_observer_id();
        s.intersections.push(IntersectionObserverState::new(
            id,
            init.root,
            init.threshold.clone(),
            sink,
        ));
        Box::new(SimIntersectionSubscription {
            state: Rc::clone(&self.state),
            id,
        })
    }
}

struct SimMutationSubscription {
    state: Rc<RefCell<SimState>>,
    id: u64,
}

impl MutationSubscription for SimMutationSubscription {
    fn disconnect(&mut self) {
        self.state
            .borrow_mut()
            .mutations
            .retain(|m| m.id != self.id);
    }
}

impl MutationHost<NodeId> for SimHost {
    fn observe_subtree(&self, sink: MutationSink<NodeId>) -> Box<dyn MutationSubscription> {
        let mut s = self.state.borrow_mut();
        let id = s.next_observer_id();
        s.mutations.push(MutationObserverState::new(id, sink));
        Box::new(SimMutationSubscription {
            state: Rc::clone(&self.state),
            id,
        })
    }
}

impl DocumentQuery<NodeId> for SimHost {
    fn query_selector_all(
        &self,
        selector: &str,
        scope: Option<&NodeId>,
    ) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        let s = self.state.borrow();
        let candidates = match scope {
            Some(root) => s.tree.subtree(*root).into_iter().skip(1).collect(),
            None => s.tree.subtree(s.tree.body()),
        };
        Ok(candidates
            .into_iter()
            .filter(|n| list.matches(&s.tree, *n))
            .collect())
    }

    fn matches(&self, element: &NodeId, selector: &str) -> Result<bool, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(list.matches(&self.state.borrow().tree, *element))
    }
}

impl TimerHost for SimHost {
    fn set_timeout(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle {
        self.state.borrow_mut().clock.schedule(delay_ms, callback)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.state.borrow_mut().clock.cancel(handle);
    }
}
