use core::fmt;

/// Handle of an element in a [`crate::SimHost`] tree.
///
/// Handles stay valid for the lifetime of the host: removing a node detaches it but keeps
/// its identity, so re-inserting it later is seen as the same element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct NodeData {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena of element nodes rooted at `body`.
#[derive(Clone, Debug)]
pub(crate) struct Tree {
    nodes: Vec<NodeData>,
}

impl Tree {
    pub fn new() -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.create("body");
        tree
    }

    pub fn body(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.index())
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(node.index())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node).map_or(&[], |n| n.children.as_slice())
    }

    /// Whether `node` is `ancestor` itself or lies somewhere below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.body(), node)
    }

    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(n) = self.get_mut(node) {
            n.parent = None;
        }
    }

    /// Moves `child` (with its subtree) to the end of `parent`'s children.
    ///
    /// Returns `false` for unknown nodes and for moves that would create a cycle.
    pub fn append(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.get(parent).is_none() || self.get(child).is_none() {
            return false;
        }
        if self.contains(child, parent) {
            return false;
        }
        self.detach(child);
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        true
    }

    /// `node` followed by all of its descendants, in document order.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.get(node).is_none() {
            return out;
        }
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }
}
