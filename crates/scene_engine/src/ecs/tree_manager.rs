//! Tree-structured component managers
//!
//! [`ComponentTreeManager`] owns the anchor components of one hierarchy
//! (logical or geometric). Storage is allocated and tree-linked as soon as a
//! component is created, but destroy cascades and the processing-order
//! rebuild wait in an operation queue until [`ComponentTreeManager::update`]
//! runs during post-update.

use std::fmt;

use log::{debug, trace};

use super::component::ComponentManager;
use super::entity::{Entity, EntityFlags, EntityRegistry};
use super::entity_tree::EcsEntityTree;
use super::error::EcsResult;
use super::id::{Category, Id, IdTable};
use super::operation::{Operation, OperationType};
use super::tree::{EcsNode, NodeIndex};

/// Short component name stored inline with every tree component
///
/// Names longer than `CAPACITY - 1` bytes are truncated on a char boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NameString(String);

impl NameString {
    /// Buffer size, terminator included
    pub const CAPACITY: usize = 16;

    /// Create a name, truncating if needed
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(Self::CAPACITY - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self(name[..end].to_string())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reset to the empty name
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Whether the name is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NameString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A component type that anchors entities in a [`ComponentTreeManager`]
pub trait TreeComponent: fmt::Debug {
    /// Category of the owning manager
    const CATEGORY: Category;

    /// Fresh component for a newly allocated slot
    fn with_id(id: Id) -> Self;

    /// Identifier of this component
    fn id(&self) -> Id;
}

/// Anchor of an entity in the logical hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentLogical {
    id: Id,
}

impl TreeComponent for ComponentLogical {
    const CATEGORY: Category = Category::Logical;

    fn with_id(id: Id) -> Self {
        Self { id }
    }

    fn id(&self) -> Id {
        self.id
    }
}

/// Manager of the logical hierarchy
pub type ComponentLogicalManager = ComponentTreeManager<ComponentLogical>;

/// Manager owning one hierarchy of anchor components
#[derive(Debug)]
pub struct ComponentTreeManager<T: TreeComponent> {
    dirty: bool,
    ids: IdTable,
    components: Vec<Option<T>>,
    names: Vec<NameString>,
    operations: Vec<Operation>,
    work_operations: Vec<Operation>,
    entity_tree: EcsEntityTree,
}

impl<T: TreeComponent> ComponentTreeManager<T> {
    /// Create a manager with `capacity` slots
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        let ids = IdTable::new(T::CATEGORY, capacity, expand_size);
        let capacity = ids.capacity();
        Self {
            dirty: false,
            ids,
            components: std::iter::repeat_with(|| None).take(capacity).collect(),
            names: vec![NameString::default(); capacity],
            operations: Vec::new(),
            work_operations: Vec::new(),
            entity_tree: EcsEntityTree::new(capacity),
        }
    }

    /// Number of slots backed by storage
    pub fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    /// Allocate a component for `entity` and link it under the root
    ///
    /// Growing the slot table grows every array keyed by slot index.
    pub fn create(&mut self, entity: Entity) -> EcsResult<Id> {
        let capacity = self.ids.capacity();
        let id = self.ids.create()?;
        if self.ids.capacity() != capacity {
            self.expand();
        }

        let index = id.slot();
        self.components[index] = Some(T::with_id(id));
        self.names[index].clear();
        self.entity_tree.create(id.index(), entity);
        trace!("Created {:?} for {}", id, entity);
        Ok(id)
    }

    fn expand(&mut self) {
        let capacity = self.ids.capacity();
        debug!("Expanding {:?} tree storage to {} slots", T::CATEGORY, capacity);
        self.components.resize_with(capacity, || None);
        self.names.resize(capacity, NameString::default());
        self.entity_tree.resize(capacity);
        self.dirty = true;
    }

    /// Destroy one component immediately
    ///
    /// Children still attached move under the root.
    pub fn destroy(&mut self, id: Id) -> bool {
        if !self.ids.contains(id) {
            return false;
        }
        self.entity_tree.destroy(id.index());
        self.components[id.slot()] = None;
        self.names[id.slot()].clear();
        self.ids.destroy(id);
        self.dirty = true;
        trace!("Destroyed {:?}", id);
        true
    }

    /// Whether `id` is a live component of this manager
    pub fn contains(&self, id: Id) -> bool {
        self.ids.contains(id)
    }

    /// Component data
    pub fn get(&self, id: Id) -> Option<&T> {
        if !self.contains(id) {
            return None;
        }
        self.components.get(id.slot())?.as_ref()
    }

    /// Component data, mutable
    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        self.components.get_mut(id.slot())?.as_mut()
    }

    /// All live components in slot order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.components.iter().flatten()
    }

    /// Entity owning the component
    pub fn entity(&self, id: Id) -> Option<Entity> {
        self.contains(id).then(|| self.entity_tree.entity(id.index()))
    }

    /// Name of the component
    pub fn name(&self, id: Id) -> Option<&str> {
        self.contains(id).then(|| self.names[id.slot()].as_str())
    }

    /// Rename the component
    pub fn set_name(&mut self, id: Id, name: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.names[id.slot()] = NameString::new(name);
        true
    }

    /// Tree node of the component
    pub fn node(&self, id: Id) -> Option<&EcsNode> {
        self.contains(id).then(|| self.entity_tree.tree().node(id.index()))
    }

    /// The synthetic root node
    pub const fn root(&self) -> &EcsNode {
        self.entity_tree.tree().root()
    }

    /// Parent component; `None` for top-level components
    pub fn parent(&self, id: Id) -> Option<Id> {
        let parent = self.node(id)?.parent();
        (parent != EcsNode::ROOT && parent != EcsNode::INVALID).then(|| Id::new(T::CATEGORY, parent))
    }

    /// Move `id` under `parent`, or under the root for `None`
    ///
    /// Refuses unknown ids and moves that would create a cycle.
    pub fn set_parent(&mut self, id: Id, parent: Option<Id>) -> bool {
        if !self.contains(id) {
            return false;
        }
        let target = match parent {
            Some(parent) => {
                if !self.contains(parent) || parent == id {
                    return false;
                }
                if self.entity_tree.tree().is_ancestor(id.index(), parent.index()) {
                    log::warn!("Refusing to parent {:?} under its own descendant {:?}", id, parent);
                    return false;
                }
                parent.index()
            }
            None => EcsNode::ROOT,
        };
        self.entity_tree.tree_mut().set_parent(id.index(), target);
        self.dirty = true;
        true
    }

    /// Move `id` to the front of its sibling ring
    pub fn set_first_sibling(&mut self, id: Id) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.entity_tree.tree_mut().set_first_sibling(id.index());
        self.dirty = true;
        true
    }

    /// Move `id` to the back of its sibling ring
    pub fn set_last_sibling(&mut self, id: Id) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.entity_tree.tree_mut().set_last_sibling(id.index());
        self.dirty = true;
        true
    }

    /// Request a processing-order rebuild on the next update
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a rebuild is pending
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Queue an operation; a second request for the same id replaces the first
    pub fn add(&mut self, id: Id, kind: OperationType, entity: Entity) {
        if let Some(queued) = self.operations.iter_mut().find(|op| op.id == id) {
            queued.kind = kind;
            queued.entity = entity;
        } else {
            self.operations.push(Operation { kind, id, entity });
        }
        self.dirty = true;
    }

    /// Operations waiting for the next update
    pub fn pending_operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Apply queued operations and refresh the processing order and flags
    ///
    /// Destroy cascades release the owning entities from `registry`; ids of
    /// their components owned by other managers are pushed to `released` for
    /// the caller to destroy. Returns whether the tree changed.
    pub fn update(&mut self, registry: &mut EntityRegistry, released: &mut Vec<Id>) -> bool {
        let mut work = std::mem::replace(&mut self.operations, std::mem::take(&mut self.work_operations));
        for operation in &work {
            match operation.kind {
                OperationType::Create => {}
                OperationType::Destroy => {
                    if !self.contains(operation.id)
                        || self.entity_tree.entity(operation.id.index()) != operation.entity
                    {
                        continue;
                    }
                    let destroyed = self.destroy_recurse(operation.id.index(), registry, released);
                    debug!("Destroyed {} entities under {}", destroyed, operation.entity);
                }
            }
        }
        work.clear();
        self.work_operations = work;

        if !self.dirty {
            return false;
        }
        self.dirty = false;
        self.entity_tree.traverse();

        let tree = self.entity_tree.tree();
        let ids = self.entity_tree.process_ids();
        let entities = self.entity_tree.process_entities();

        let mut position = 0;
        while position < ids.len() && tree.node(ids[position]).parent() == EcsNode::ROOT {
            update_root_flags(registry, entities[position]);
            position += 1;
        }
        for position in position..ids.len() {
            let parent = self.entity_tree.entity(tree.node(ids[position]).parent());
            update_flags(registry, entities[position], parent);
        }
        true
    }

    fn destroy_recurse(&mut self, index: NodeIndex, registry: &mut EntityRegistry, released: &mut Vec<Id>) -> usize {
        let Self {
            ids,
            components,
            names,
            entity_tree,
            ..
        } = self;

        let mut destroyed = 0;
        entity_tree.destroy_recurse(index, &mut |index, entity| {
            if let Some(owned) = registry.release(entity) {
                released.extend(owned.into_iter().filter(|id| id.category() != T::CATEGORY));
                destroyed += 1;
            }
            let id = Id::new(T::CATEGORY, index);
            if ids.destroy(id) {
                components[id.slot()] = None;
                names[id.slot()].clear();
                trace!("Destroyed {:?}", id);
            }
        });
        self.dirty = true;
        destroyed
    }

    /// Number of direct children
    pub fn num_children(&self, id: Id) -> usize {
        self.node(id).map_or(0, |node| node.num_children() as usize)
    }

    /// The `position`-th child, walking the sibling ring
    pub fn child(&self, id: Id, position: usize) -> Option<Id> {
        self.children(id).nth(position)
    }

    /// Children of `id` in ring order
    pub fn children(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        self.contains(id)
            .then(|| self.entity_tree.tree().children(id.index()))
            .into_iter()
            .flatten()
            .map(|index| Id::new(T::CATEGORY, index))
    }

    /// Top-level components in ring order
    pub fn root_children(&self) -> impl Iterator<Item = Id> + '_ {
        self.entity_tree
            .tree()
            .children(EcsNode::ROOT)
            .map(|index| Id::new(T::CATEGORY, index))
    }

    /// Entities in the current processing order
    pub fn process_order(&self) -> &[Entity] {
        self.entity_tree.process_entities()
    }

    /// Components in the current processing order
    pub fn process_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.entity_tree
            .process_ids()
            .iter()
            .map(|index| Id::new(T::CATEGORY, *index))
    }

    /// Underlying entity tree
    pub const fn entity_tree(&self) -> &EcsEntityTree {
        &self.entity_tree
    }

    /// Resolve a `/`-separated path of names from the root
    ///
    /// One leading `/` is optional. Empty paths and empty segments never
    /// match.
    pub fn find(&self, path: &str) -> Option<Id> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return None;
        }

        let tree = self.entity_tree.tree();
        let mut current = EcsNode::ROOT;
        for segment in path.split('/') {
            if segment.is_empty() {
                return None;
            }
            let name = NameString::new(segment);
            current = tree
                .children(current)
                .find(|index| self.names[*index as usize] == name)?;
        }
        Some(Id::new(T::CATEGORY, current))
    }

    /// Depth-first pre-order walk from the root's children
    pub fn traverse<F>(&self, mut visit: F)
    where
        F: FnMut(usize, Id),
    {
        self.traverse_with(
            |depth, id| {
                visit(depth, id);
                true
            },
            |_, _| {},
        );
    }

    /// Depth-first walk with enter and leave callbacks
    ///
    /// When `begin` returns `false` the subtree is skipped and `end` is not
    /// called for that component.
    pub fn traverse_with<B, E>(&self, mut begin: B, mut end: E)
    where
        B: FnMut(usize, Id) -> bool,
        E: FnMut(usize, Id),
    {
        for index in self.entity_tree.tree().children(EcsNode::ROOT) {
            self.traverse_node(index, 0, &mut begin, &mut end);
        }
    }

    fn traverse_node<B, E>(&self, index: NodeIndex, depth: usize, begin: &mut B, end: &mut E)
    where
        B: FnMut(usize, Id) -> bool,
        E: FnMut(usize, Id),
    {
        let id = Id::new(T::CATEGORY, index);
        if !begin(depth, id) {
            return;
        }
        for child in self.entity_tree.tree().children(index) {
            self.traverse_node(child, depth + 1, begin, end);
        }
        end(depth, id);
    }
}

impl<T: TreeComponent> ComponentManager for ComponentTreeManager<T> {
    fn category(&self) -> Category {
        T::CATEGORY
    }

    fn destroy(&mut self, id: Id) {
        Self::destroy(self, id);
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

fn update_root_flags(registry: &mut EntityRegistry, entity: Entity) {
    let flags = registry.flags(entity);
    registry.assign_flag(entity, EntityFlags::UPDATE, flags.contains(EntityFlags::UPDATE_SELF));
    registry.assign_flag(entity, EntityFlags::RENDER, flags.contains(EntityFlags::RENDER_SELF));
}

fn update_flags(registry: &mut EntityRegistry, entity: Entity, parent: Entity) {
    let flags = registry.flags(entity);
    let parent_flags = registry.flags(parent);
    registry.assign_flag(
        entity,
        EntityFlags::UPDATE,
        flags.contains(EntityFlags::UPDATE_SELF) && parent_flags.contains(EntityFlags::UPDATE),
    );
    registry.assign_flag(
        entity,
        EntityFlags::RENDER,
        flags.contains(EntityFlags::RENDER_SELF) && parent_flags.contains(EntityFlags::RENDER),
    );
}
