//! Arena tree with circular sibling rings
//!
//! Nodes live in a `Vec` and refer to each other by 16-bit index. A node's
//! children form a circular doubly-linked ring headed by `child`; a lone
//! node links to itself. The root is a synthetic node kept outside the array
//! under the [`EcsNode::ROOT`] index.

/// Index of a node in an [`EcsTree`]
pub type NodeIndex = u16;

/// Intrusive tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcsNode {
    index: NodeIndex,
    parent: NodeIndex,
    child: NodeIndex,
    num_children: u16,
    prev: NodeIndex,
    next: NodeIndex,
}

impl EcsNode {
    /// Sentinel for "no node"
    pub const INVALID: NodeIndex = 0xFFFF;
    /// Index of the synthetic root
    pub const ROOT: NodeIndex = 0xFFFE;
    /// Largest ring a node may head
    pub const MAX_CHILDREN: u16 = 0xFFFD;

    /// A detached node
    pub const fn new(index: NodeIndex) -> Self {
        Self {
            index,
            parent: Self::INVALID,
            child: Self::INVALID,
            num_children: 0,
            prev: index,
            next: index,
        }
    }

    /// Own index; `INVALID` for a free slot
    pub const fn index(&self) -> NodeIndex {
        self.index
    }

    /// Parent index; `ROOT` for top-level nodes, `INVALID` when detached
    pub const fn parent(&self) -> NodeIndex {
        self.parent
    }

    /// Head of the child ring, or `INVALID`
    pub const fn child(&self) -> NodeIndex {
        self.child
    }

    /// Length of the child ring
    pub const fn num_children(&self) -> u16 {
        self.num_children
    }

    /// Previous sibling in the ring
    pub const fn prev(&self) -> NodeIndex {
        self.prev
    }

    /// Next sibling in the ring
    pub const fn next(&self) -> NodeIndex {
        self.next
    }

    /// Whether the node is linked under a parent
    pub const fn is_attached(&self) -> bool {
        self.parent != Self::INVALID
    }
}

/// Array of [`EcsNode`]s plus the root
#[derive(Debug, Clone)]
pub struct EcsTree {
    nodes: Vec<EcsNode>,
    root: EcsNode,
}

impl EcsTree {
    /// Create a tree with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let mut root = EcsNode::new(EcsNode::ROOT);
        root.parent = EcsNode::ROOT;
        Self {
            nodes: vec![EcsNode::new(EcsNode::INVALID); capacity],
            root,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Grow the slot array; new slots are free
    pub fn resize(&mut self, capacity: usize) {
        debug_assert!(capacity <= EcsNode::ROOT as usize);
        self.nodes.resize(capacity, EcsNode::new(EcsNode::INVALID));
    }

    /// The synthetic root
    pub const fn root(&self) -> &EcsNode {
        &self.root
    }

    /// Node at `index`; `ROOT` yields the root
    pub fn node(&self, index: NodeIndex) -> &EcsNode {
        if index == EcsNode::ROOT {
            &self.root
        } else {
            &self.nodes[index as usize]
        }
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut EcsNode {
        if index == EcsNode::ROOT {
            &mut self.root
        } else {
            &mut self.nodes[index as usize]
        }
    }

    /// Whether `index` holds a created node
    pub fn contains(&self, index: NodeIndex) -> bool {
        (index as usize) < self.nodes.len() && self.nodes[index as usize].index == index
    }

    /// Initialise the slot and link it as the root's last child
    pub fn create(&mut self, index: NodeIndex) {
        debug_assert!((index as usize) < self.nodes.len());
        debug_assert!(!self.contains(index), "node {index} created twice");
        self.nodes[index as usize] = EcsNode::new(index);
        self.set_parent(index, EcsNode::ROOT);
    }

    /// Unlink the node and free its slot
    ///
    /// Children still attached are moved under the root, keeping their order.
    pub fn destroy(&mut self, index: NodeIndex) {
        if !self.contains(index) {
            return;
        }
        while self.node(index).num_children > 0 {
            let child = self.node(index).child;
            self.set_parent(child, EcsNode::ROOT);
        }
        self.remove_from_parent(index);
        self.nodes[index as usize] = EcsNode::new(EcsNode::INVALID);
    }

    /// Append `node` to the end of `parent`'s ring
    pub fn add_child(&mut self, parent: NodeIndex, node: NodeIndex) {
        debug_assert!(!self.node(node).is_attached(), "node {node} already has a parent");
        debug_assert!(self.node(parent).num_children < EcsNode::MAX_CHILDREN);

        let head = self.node(parent).child;
        if head == EcsNode::INVALID {
            self.node_mut(parent).child = node;
            let n = self.node_mut(node);
            n.prev = node;
            n.next = node;
        } else {
            self.link_prev(head, node);
        }
        self.node_mut(parent).num_children += 1;
        self.node_mut(node).parent = parent;
    }

    /// Unlink `node` from `parent`'s ring
    pub fn remove_child(&mut self, parent: NodeIndex, node: NodeIndex) {
        debug_assert_eq!(self.node(node).parent, parent);
        debug_assert!(self.node(parent).num_children > 0);

        if self.node(parent).child == node {
            let next = self.node(node).next;
            self.node_mut(parent).child = if next == node { EcsNode::INVALID } else { next };
        }
        self.unlink(node);
        self.node_mut(node).parent = EcsNode::INVALID;
        self.node_mut(parent).num_children -= 1;
    }

    /// Detach `node` from whatever ring holds it
    pub fn remove_from_parent(&mut self, node: NodeIndex) {
        let parent = self.node(node).parent;
        if parent != EcsNode::INVALID {
            self.remove_child(parent, node);
        }
    }

    /// Move `node` to the end of `parent`'s ring
    pub fn set_parent(&mut self, node: NodeIndex, parent: NodeIndex) {
        debug_assert!(node != parent);
        self.remove_from_parent(node);
        self.add_child(parent, node);
    }

    /// Make `node` the head of its parent's ring
    pub fn set_first_sibling(&mut self, node: NodeIndex) {
        let parent = self.node(node).parent;
        if parent == EcsNode::INVALID {
            return;
        }
        let head = self.node(parent).child;
        if head == node {
            return;
        }
        self.unlink(node);
        self.link_prev(head, node);
        self.node_mut(parent).child = node;
    }

    /// Make `node` the tail of its parent's ring
    pub fn set_last_sibling(&mut self, node: NodeIndex) {
        let parent = self.node(node).parent;
        if parent == EcsNode::INVALID {
            return;
        }
        let head = self.node(parent).child;
        if head == node {
            // Advancing the head leaves `node` just before it, i.e. last.
            let next = self.node(node).next;
            self.node_mut(parent).child = next;
            return;
        }
        let tail = self.node(head).prev;
        if tail == node {
            return;
        }
        self.unlink(node);
        self.link_next(tail, node);
    }

    /// The `position`-th child of `parent`, walking the ring
    pub fn get_child(&self, parent: NodeIndex, position: usize) -> NodeIndex {
        self.children(parent).nth(position).unwrap_or(EcsNode::INVALID)
    }

    /// Children of `parent` in ring order
    pub fn children(&self, parent: NodeIndex) -> Children<'_> {
        let node = self.node(parent);
        Children {
            tree: self,
            current: node.child,
            remaining: node.num_children,
        }
    }

    /// Whether `ancestor` lies on the parent chain of `node`
    pub fn is_ancestor(&self, ancestor: NodeIndex, node: NodeIndex) -> bool {
        let mut current = self.node(node).parent;
        while current != EcsNode::INVALID && current != EcsNode::ROOT {
            if current == ancestor {
                return true;
            }
            current = self.node(current).parent;
        }
        ancestor == EcsNode::ROOT && current == EcsNode::ROOT
    }

    /// Insert `node` just before `at` in `at`'s ring
    fn link_prev(&mut self, at: NodeIndex, node: NodeIndex) {
        let prev = self.node(at).prev;
        {
            let n = self.node_mut(node);
            n.prev = prev;
            n.next = at;
        }
        self.node_mut(prev).next = node;
        self.node_mut(at).prev = node;
    }

    /// Insert `node` just after `at` in `at`'s ring
    fn link_next(&mut self, at: NodeIndex, node: NodeIndex) {
        let next = self.node(at).next;
        {
            let n = self.node_mut(node);
            n.prev = at;
            n.next = next;
        }
        self.node_mut(next).prev = node;
        self.node_mut(at).next = node;
    }

    fn unlink(&mut self, node: NodeIndex) {
        let (prev, next) = {
            let n = self.node(node);
            (n.prev, n.next)
        };
        self.node_mut(prev).next = next;
        self.node_mut(next).prev = prev;
        let n = self.node_mut(node);
        n.prev = node;
        n.next = node;
    }
}

/// Iterator over a sibling ring
#[derive(Debug, Clone)]
pub struct Children<'a> {
    tree: &'a EcsTree,
    current: NodeIndex,
    remaining: u16,
}

impl Iterator for Children<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.current;
        self.current = self.tree.node(index).next;
        self.remaining -= 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl ExactSizeIterator for Children<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(count: u16) -> EcsTree {
        let mut tree = EcsTree::new(count as usize);
        for i in 0..count {
            tree.create(i);
        }
        tree
    }

    /// Ring walked forward and backward matches `num_children`, and every
    /// member points back at the parent.
    fn assert_ring(tree: &EcsTree, parent: NodeIndex) {
        let node = tree.node(parent);
        let forward: Vec<_> = tree.children(parent).collect();
        assert_eq!(forward.len(), node.num_children() as usize);
        if forward.is_empty() {
            assert_eq!(node.child(), EcsNode::INVALID);
            return;
        }
        let mut backward = Vec::new();
        let mut current = tree.node(node.child()).prev();
        for _ in 0..node.num_children() {
            backward.push(current);
            current = tree.node(current).prev();
        }
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(current, tree.node(node.child()).prev());
        for child in forward {
            assert_eq!(tree.node(child).parent(), parent);
        }
    }

    #[test]
    fn test_create_links_under_root_in_order() {
        let tree = tree_with(4);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_ring(&tree, EcsNode::ROOT);
    }

    #[test]
    fn test_single_child_links_to_itself() {
        let mut tree = tree_with(2);
        tree.set_parent(1, 0);
        let child = tree.node(1);
        assert_eq!(child.prev(), 1);
        assert_eq!(child.next(), 1);
        assert_eq!(tree.node(0).child(), 1);

        tree.remove_child(0, 1);
        assert_eq!(tree.node(0).child(), EcsNode::INVALID);
        assert_eq!(tree.node(0).num_children(), 0);
        assert!(!tree.node(1).is_attached());
    }

    #[test]
    fn test_removing_head_advances_ring() {
        let mut tree = tree_with(3);
        tree.remove_child(EcsNode::ROOT, 0);
        assert_eq!(tree.root().child(), 1);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![1, 2]);
        assert_ring(&tree, EcsNode::ROOT);
    }

    #[test]
    fn test_reparent_keeps_other_links() {
        let mut tree = tree_with(12);
        for i in 2..12 {
            tree.set_parent(i, 0);
        }
        let before: Vec<_> = (2..12).map(|i| *tree.node(i)).collect();

        tree.set_parent(5, 1);

        assert_eq!(tree.node(0).num_children(), 9);
        assert_eq!(tree.node(1).num_children(), 1);
        assert_ring(&tree, 0);
        assert_ring(&tree, 1);
        for (offset, node) in before.iter().enumerate() {
            let index = offset as u16 + 2;
            if index == 4 || index == 5 || index == 6 {
                continue;
            }
            assert_eq!(tree.node(index), node);
        }
        assert_eq!(tree.node(4).next(), 6);
        assert_eq!(tree.node(6).prev(), 4);
    }

    #[test]
    fn test_set_first_and_last_sibling() {
        let mut tree = tree_with(4);

        tree.set_first_sibling(2);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![2, 0, 1, 3]);

        tree.set_last_sibling(0);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![2, 1, 3, 0]);

        tree.set_last_sibling(2);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![1, 3, 0, 2]);

        tree.set_last_sibling(2);
        tree.set_first_sibling(1);
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![1, 3, 0, 2]);
        assert_ring(&tree, EcsNode::ROOT);
    }

    #[test]
    fn test_get_child_walks_ring() {
        let tree = tree_with(5);
        assert_eq!(tree.get_child(EcsNode::ROOT, 0), 0);
        assert_eq!(tree.get_child(EcsNode::ROOT, 3), 3);
        assert_eq!(tree.get_child(EcsNode::ROOT, 5), EcsNode::INVALID);
    }

    #[test]
    fn test_destroy_moves_children_to_root() {
        let mut tree = tree_with(4);
        tree.set_parent(1, 0);
        tree.set_parent(2, 0);

        tree.destroy(0);

        assert!(!tree.contains(0));
        assert_eq!(tree.children(EcsNode::ROOT).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_ring(&tree, EcsNode::ROOT);
    }

    #[test]
    fn test_is_ancestor() {
        let mut tree = tree_with(3);
        tree.set_parent(1, 0);
        tree.set_parent(2, 1);
        assert!(tree.is_ancestor(0, 2));
        assert!(tree.is_ancestor(EcsNode::ROOT, 2));
        assert!(!tree.is_ancestor(2, 0));
    }

    #[test]
    fn test_link_next_inserts_after() {
        let mut tree = tree_with(3);
        tree.unlink(2);
        tree.link_next(0, 2);
        assert_eq!(tree.node(0).next(), 2);
        assert_eq!(tree.node(2).next(), 1);
        assert_eq!(tree.node(1).prev(), 2);
    }
}
