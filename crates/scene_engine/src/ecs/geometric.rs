//! Geometric hierarchy
//!
//! Transforms are stored structure-of-arrays, indexed by the same slot as
//! the tree node. World matrices are recomputed in one forward pass over the
//! breadth-first processing order, so a parent's matrix is always final
//! before any child reads it.

use log::debug;

use crate::foundation::math::{compose_matrix, look_rotation, Mat4, Quat, Transform, Vec3};

use super::component::ComponentManager;
use super::entity::{Entity, EntityRegistry};
use super::error::EcsResult;
use super::id::{Category, Id};
use super::tree::EcsNode;
use super::tree_manager::{ComponentTreeManager, TreeComponent};

/// Anchor of an entity in the geometric hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGeometric {
    id: Id,
}

impl TreeComponent for ComponentGeometric {
    const CATEGORY: Category = Category::Geometric;

    fn with_id(id: Id) -> Self {
        Self { id }
    }

    fn id(&self) -> Id {
        self.id
    }
}

/// Manager of the geometric hierarchy and its transforms
#[derive(Debug)]
pub struct ComponentGeometricManager {
    tree: ComponentTreeManager<ComponentGeometric>,
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
    matrices: Vec<Mat4>,
}

impl ComponentGeometricManager {
    /// Create a manager with `capacity` slots
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        let tree = ComponentTreeManager::new(capacity, expand_size);
        let capacity = tree.capacity();
        Self {
            tree,
            positions: vec![Vec3::zeros(); capacity],
            rotations: vec![Quat::identity(); capacity],
            scales: vec![Vec3::repeat(1.0); capacity],
            matrices: vec![Mat4::identity(); capacity],
        }
    }

    /// Allocate a component with an identity transform
    pub fn create(&mut self, entity: Entity) -> EcsResult<Id> {
        let capacity = self.tree.capacity();
        let id = self.tree.create(entity)?;
        if self.tree.capacity() != capacity {
            self.expand();
        }

        let index = id.slot();
        self.positions[index] = Vec3::zeros();
        self.rotations[index] = Quat::identity();
        self.scales[index] = Vec3::repeat(1.0);
        self.matrices[index] = Mat4::identity();
        Ok(id)
    }

    fn expand(&mut self) {
        let capacity = self.tree.capacity();
        debug!("Expanding geometric transform arrays to {} slots", capacity);
        self.positions.resize(capacity, Vec3::zeros());
        self.rotations.resize(capacity, Quat::identity());
        self.scales.resize(capacity, Vec3::repeat(1.0));
        self.matrices.resize(capacity, Mat4::identity());
    }

    /// Destroy one component immediately
    pub fn destroy(&mut self, id: Id) -> bool {
        self.tree.destroy(id)
    }

    /// Hierarchy, names and operation queue
    pub const fn tree(&self) -> &ComponentTreeManager<ComponentGeometric> {
        &self.tree
    }

    /// Hierarchy, names and operation queue, mutable
    pub fn tree_mut(&mut self) -> &mut ComponentTreeManager<ComponentGeometric> {
        &mut self.tree
    }

    /// Apply queued operations; see [`ComponentTreeManager::update`]
    pub fn update(&mut self, registry: &mut EntityRegistry, released: &mut Vec<Id>) -> bool {
        self.tree.update(registry, released)
    }

    /// Local position
    pub fn position(&self, id: Id) -> Option<&Vec3> {
        self.tree.contains(id).then(|| &self.positions[id.slot()])
    }

    /// Set the local position
    pub fn set_position(&mut self, id: Id, position: Vec3) {
        if self.tree.contains(id) {
            self.positions[id.slot()] = position;
        }
    }

    /// Local rotation
    pub fn rotation(&self, id: Id) -> Option<&Quat> {
        self.tree.contains(id).then(|| &self.rotations[id.slot()])
    }

    /// Set the local rotation
    pub fn set_rotation(&mut self, id: Id, rotation: Quat) {
        if self.tree.contains(id) {
            self.rotations[id.slot()] = rotation;
        }
    }

    /// Local scale
    pub fn scale(&self, id: Id) -> Option<&Vec3> {
        self.tree.contains(id).then(|| &self.scales[id.slot()])
    }

    /// Set the local scale
    pub fn set_scale(&mut self, id: Id, scale: Vec3) {
        if self.tree.contains(id) {
            self.scales[id.slot()] = scale;
        }
    }

    /// Local transform as a value
    pub fn transform(&self, id: Id) -> Option<Transform> {
        self.tree.contains(id).then(|| {
            let index = id.slot();
            Transform::new(self.positions[index], self.rotations[index], self.scales[index])
        })
    }

    /// Replace the whole local transform
    pub fn set_transform(&mut self, id: Id, transform: &Transform) {
        if self.tree.contains(id) {
            let index = id.slot();
            self.positions[index] = transform.position;
            self.rotations[index] = transform.rotation;
            self.scales[index] = transform.scale;
        }
    }

    /// Local matrix, `T * R * S`
    pub fn local_matrix(&self, id: Id) -> Option<Mat4> {
        self.tree.contains(id).then(|| {
            let index = id.slot();
            compose_matrix(&self.positions[index], &self.rotations[index], &self.scales[index])
        })
    }

    /// World matrix as of the last [`ComponentGeometricManager::update_matrices`]
    pub fn matrix(&self, id: Id) -> Option<&Mat4> {
        self.tree.contains(id).then(|| &self.matrices[id.slot()])
    }

    /// World-space position as of the last matrix update
    pub fn world_position(&self, id: Id) -> Option<Vec3> {
        self.matrix(id).map(|m| Vec3::new(m.m14, m.m24, m.m34))
    }

    /// Rotate so the local -Z axis points from the position toward `target`
    pub fn look_at(&mut self, id: Id, target: &Vec3, up: &Vec3) {
        if self.tree.contains(id) {
            let index = id.slot();
            let forward = target - self.positions[index];
            self.rotations[index] = look_rotation(&forward, up);
        }
    }

    /// Recompute every world matrix in processing order
    pub fn update_matrices(&mut self) {
        let Self { tree, positions, rotations, scales, matrices } = self;
        let nodes = tree.entity_tree().tree();

        for &index in tree.entity_tree().process_ids() {
            let slot = index as usize;
            let local = compose_matrix(&positions[slot], &rotations[slot], &scales[slot]);
            let parent = nodes.node(index).parent();
            matrices[slot] = if parent == EcsNode::ROOT {
                local
            } else {
                matrices[parent as usize] * local
            };
        }
    }
}

impl ComponentManager for ComponentGeometricManager {
    fn category(&self) -> Category {
        Category::Geometric
    }

    fn destroy(&mut self, id: Id) {
        Self::destroy(self, id);
    }

    fn len(&self) -> usize {
        ComponentManager::len(&self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::operation::OperationType;
    use approx::assert_relative_eq;

    fn spawn(manager: &mut ComponentGeometricManager, registry: &mut EntityRegistry) -> Id {
        let entity = registry.create().unwrap();
        let id = manager.create(entity).unwrap();
        registry.set_anchor(entity, id).unwrap();
        manager.tree_mut().add(id, OperationType::Create, entity);
        id
    }

    #[test]
    fn test_two_level_matrix_propagation() {
        let mut registry = EntityRegistry::new(4, 4);
        let mut manager = ComponentGeometricManager::new(4, 4);
        let parent = spawn(&mut manager, &mut registry);
        let child = spawn(&mut manager, &mut registry);
        manager.tree_mut().set_parent(child, Some(parent));

        manager.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
        manager.set_rotation(parent, Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2));
        manager.set_scale(parent, Vec3::new(2.0, 2.0, 2.0));
        manager.set_position(child, Vec3::new(1.0, 0.0, 0.0));
        manager.set_scale(child, Vec3::new(0.5, 0.5, 0.5));

        manager.update(&mut registry, &mut Vec::new());
        manager.update_matrices();

        let parent_world = *manager.matrix(parent).unwrap();
        let child_world = *manager.matrix(child).unwrap();
        let child_local = manager.local_matrix(child).unwrap();

        assert_relative_eq!(parent_world, manager.local_matrix(parent).unwrap(), epsilon = 1.0e-5);
        assert_relative_eq!(child_world, parent_world * child_local, epsilon = 1.0e-5);

        // Parent scales the child's offset by 2 and turns +X into +Y
        assert_relative_eq!(
            manager.world_position(child).unwrap(),
            Vec3::new(10.0, 2.0, 0.0),
            epsilon = 1.0e-5
        );
        let decomposed = Transform::from_matrix(&child_world);
        assert_relative_eq!(decomposed.scale, Vec3::new(1.0, 1.0, 1.0), epsilon = 1.0e-5);
    }

    #[test]
    fn test_new_slots_start_at_identity() {
        let mut registry = EntityRegistry::new(1, 1);
        let mut manager = ComponentGeometricManager::new(1, 1);
        let ids: Vec<_> = (0..3).map(|_| spawn(&mut manager, &mut registry)).collect();

        for id in ids {
            assert_eq!(manager.position(id), Some(&Vec3::zeros()));
            assert_eq!(manager.scale(id), Some(&Vec3::repeat(1.0)));
            assert_eq!(manager.matrix(id), Some(&Mat4::identity()));
        }
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut registry = EntityRegistry::new(1, 1);
        let mut manager = ComponentGeometricManager::new(1, 1);
        let id = spawn(&mut manager, &mut registry);
        manager.set_position(id, Vec3::new(0.0, 0.0, 5.0));
        manager.look_at(id, &Vec3::zeros(), &Vec3::y());

        let facing = manager.rotation(id).unwrap() * -Vec3::z();
        assert_relative_eq!(facing, Vec3::new(0.0, 0.0, -1.0), epsilon = 1.0e-5);
    }

    #[test]
    fn test_transform_round_trip() {
        let mut registry = EntityRegistry::new(1, 1);
        let mut manager = ComponentGeometricManager::new(1, 1);
        let id = spawn(&mut manager, &mut registry);

        manager.set_transform(id, &Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        let transform = manager.transform(id).unwrap();
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::repeat(1.0));
        assert_relative_eq!(manager.local_matrix(id).unwrap(), transform.to_matrix(), epsilon = 1.0e-6);
    }

    #[test]
    fn test_destroyed_slot_rejects_access() {
        let mut registry = EntityRegistry::new(1, 1);
        let mut manager = ComponentGeometricManager::new(1, 1);
        let id = spawn(&mut manager, &mut registry);
        assert!(manager.destroy(id));

        manager.set_position(id, Vec3::new(1.0, 2.0, 3.0));
        assert!(manager.position(id).is_none());
        assert!(manager.matrix(id).is_none());
    }
}
