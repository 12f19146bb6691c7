//! Tree nodes bound to entities, with a breadth-first processing order

use super::entity::Entity;
use super::tree::{EcsNode, EcsTree, NodeIndex};

/// An [`EcsTree`] whose slots are paired with the entity that owns them
///
/// The processing order is a flattened breadth-first walk. It is derived
/// data: it goes stale on any shape change and is rebuilt by
/// [`EcsEntityTree::traverse`].
#[derive(Debug, Clone)]
pub struct EcsEntityTree {
    tree: EcsTree,
    entities: Vec<Entity>,
    process_ids: Vec<NodeIndex>,
    process_entities: Vec<Entity>,
}

impl EcsEntityTree {
    /// Create a tree with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        Self {
            tree: EcsTree::new(capacity),
            entities: vec![Entity::NULL; capacity],
            process_ids: Vec::with_capacity(capacity),
            process_entities: Vec::with_capacity(capacity),
        }
    }

    /// Grow the slot arrays
    ///
    /// The processing order is kept; indices stay valid as slots only grow.
    pub fn resize(&mut self, capacity: usize) {
        self.tree.resize(capacity);
        self.entities.resize(capacity, Entity::NULL);
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.tree.capacity()
    }

    /// Link a new node for `entity` as the root's last child
    pub fn create(&mut self, index: NodeIndex, entity: Entity) {
        self.tree.create(index);
        self.entities[index as usize] = entity;
    }

    /// Free a single node; any children move under the root
    pub fn destroy(&mut self, index: NodeIndex) {
        self.tree.destroy(index);
        self.entities[index as usize] = Entity::NULL;
    }

    /// Free a node and its whole subtree, children first
    ///
    /// `visit` sees each node and its entity just before the node is freed.
    pub fn destroy_recurse<F>(&mut self, index: NodeIndex, visit: &mut F)
    where
        F: FnMut(NodeIndex, Entity),
    {
        while self.tree.node(index).num_children() > 0 {
            let child = self.tree.node(index).child();
            self.destroy_recurse(child, visit);
        }
        visit(index, self.entity(index));
        self.destroy(index);
    }

    /// Entity bound to the node; `NULL` for the root or a free slot
    pub fn entity(&self, index: NodeIndex) -> Entity {
        self.entities.get(index as usize).copied().unwrap_or(Entity::NULL)
    }

    /// Underlying tree
    pub const fn tree(&self) -> &EcsTree {
        &self.tree
    }

    /// Underlying tree, mutable
    pub fn tree_mut(&mut self) -> &mut EcsTree {
        &mut self.tree
    }

    /// Rebuild the breadth-first processing order
    pub fn traverse(&mut self) {
        self.process_ids.clear();
        self.process_ids.extend(self.tree.children(EcsNode::ROOT));

        let mut cursor = 0;
        while cursor < self.process_ids.len() {
            let index = self.process_ids[cursor];
            self.process_ids.extend(self.tree.children(index));
            cursor += 1;
        }

        self.process_entities.clear();
        self.process_entities
            .extend(self.process_ids.iter().map(|index| self.entities[*index as usize]));
    }

    /// Node indices in processing order
    pub fn process_ids(&self) -> &[NodeIndex] {
        &self.process_ids
    }

    /// Entities in processing order
    pub fn process_entities(&self) -> &[Entity] {
        &self.process_entities
    }
}
