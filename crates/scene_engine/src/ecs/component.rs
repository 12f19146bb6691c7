//! Component manager traits
//!
//! Every category is owned by exactly one manager. Logical, geometric,
//! behavior and scene-element managers are built in; renderer and user
//! categories are served by [`ExternalManager`]s the host registers.

use std::any::Any;

use crate::foundation::math::Mat4;

use super::entity::{Entity, EntityFlags, EntityRegistry};
use super::error::EcsResult;
use super::geometric::ComponentGeometricManager;
use super::id::{Category, ComponentType, Id};

/// Upcast to [`Any`] for downcasting trait objects
pub trait AsAny: Any {
    /// Borrow as `&dyn Any`
    fn as_any(&self) -> &dyn Any;

    /// Borrow as `&mut dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Capabilities shared by every component manager
pub trait ComponentManager {
    /// Category stamped into this manager's ids
    fn category(&self) -> Category;

    /// Destroy a component immediately; unknown ids are ignored
    fn destroy(&mut self, id: Id);

    /// Per-frame update of one component
    fn update_component(&mut self, _id: Id) {}

    /// Number of live components
    fn len(&self) -> usize;

    /// Whether no component is live
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Called once when the owning ECS starts
    fn initialize(&mut self) {}

    /// Called once when the owning ECS shuts down
    fn terminate(&mut self) {}
}

/// A manager for the renderer or user category, supplied by the host
pub trait ExternalManager: ComponentManager + AsAny {
    /// Allocate a component for `entity`
    fn create(&mut self, entity: Entity, component_type: ComponentType) -> EcsResult<Id>;

    /// Type of a live component
    fn component_type(&self, id: Id) -> Option<ComponentType>;

    /// Runs after world matrices and scene elements are up to date
    fn post_update_components(&mut self, _scene: &SceneView<'_>) {}
}

/// Read-only view of committed per-frame state
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    registry: &'a EntityRegistry,
    geometric: &'a ComponentGeometricManager,
}

impl<'a> SceneView<'a> {
    pub(crate) const fn new(registry: &'a EntityRegistry, geometric: &'a ComponentGeometricManager) -> Self {
        Self { registry, geometric }
    }

    /// World matrix of a geometric entity
    pub fn world_matrix(&self, entity: Entity) -> Option<&'a Mat4> {
        let anchor = self.registry.anchor(entity)?;
        if anchor.category() != Category::Geometric {
            return None;
        }
        self.geometric.matrix(anchor)
    }

    /// Whether the entity is live and has every bit of `flag`
    pub fn check_flag(&self, entity: Entity, flag: EntityFlags) -> bool {
        self.registry.check_flag(entity, flag)
    }

    /// Layer of a live entity
    pub fn layer(&self, entity: Entity) -> Option<u32> {
        self.registry.layer(entity)
    }

    /// Geometric entities in processing order
    pub fn geometric_entities(&self) -> &'a [Entity] {
        self.geometric.tree().process_order()
    }
}
