use visible::{IntersectionEntry, IntersectionSink, MutationRecord, MutationSink, Threshold};

use crate::node::NodeId;

/// Simulated intersection observer: one per `IntersectionHost::connect`, removed from the
/// host on disconnect.
pub(crate) struct IntersectionObserverState {
    pub id: u64,
    pub root: Option<NodeId>,
    pub threshold: Threshold,
    pub sink: IntersectionSink<NodeId>,
    // Observation order, with the ratio of the last queued entry.
    pub observed: Vec<(NodeId, f64)>,
    pub queue: Vec<IntersectionEntry<NodeId>>,
}

impl IntersectionObserverState {
    pub fn new(
        id: u64,
        root: Option<NodeId>,
        threshold: Threshold,
        sink: IntersectionSink<NodeId>,
    ) -> Self {
        Self {
            id,
            root,
            threshold,
            sink,
            observed: Vec::new(),
            queue: Vec::new(),
        }
    }

    pub fn observes(&self, node: NodeId) -> bool {
        self.observed.iter().any(|(n, _)| *n == node)
    }

    /// A newly observed node always gets an initial entry.
    pub fn observe(&mut self, node: NodeId, ratio: f64) {
        if self.observes(node) {
            return;
        }
        self.observed.push((node, ratio));
        self.queue.push(report(node, ratio));
    }

    pub fn unobserve(&mut self, node: NodeId) {
        self.observed.retain(|(n, _)| *n != node);
        self.queue.retain(|e| e.target != node);
    }

    /// Queues an entry when `ratio` crosses one of the thresholds, or flips between zero and
    /// non-zero, relative to the last queued entry.
    pub fn update(&mut self, node: NodeId, ratio: f64) {
        let threshold = &self.threshold;
        let Some(slot) = self.observed.iter_mut().find(|(n, _)| *n == node) else {
            return;
        };
        let last = slot.1;
        if band(threshold, last) == band(threshold, ratio) && (last > 0.0) == (ratio > 0.0) {
            return;
        }
        slot.1 = ratio;
        self.queue.push(report(node, ratio));
    }
}

fn band(threshold: &Threshold, ratio: f64) -> usize {
    if ratio <= 0.0 {
        return 0;
    }
    threshold.values().iter().filter(|t| ratio >= **t).count()
}

fn report(node: NodeId, ratio: f64) -> IntersectionEntry<NodeId> {
    IntersectionEntry::new(node, ratio > 0.0, ratio)
}

/// Simulated subtree mutation observer on `body`.
pub(crate) struct MutationObserverState {
    pub id: u64,
    pub sink: MutationSink<NodeId>,
    pub queue: Vec<MutationRecord<NodeId>>,
}

impl MutationObserverState {
    pub fn new(id: u64, sink: MutationSink<NodeId>) -> Self {
        Self {
            id,
            sink,
            queue: Vec::new(),
        }
    }
}
