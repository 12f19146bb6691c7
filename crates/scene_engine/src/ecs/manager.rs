//! ECS context and frame cycle
//!
//! [`EcsManager`] owns the entity registry and every component manager. A
//! frame is two calls: [`EcsManager::update`] walks both hierarchies and runs
//! per-component logic, which may only *request* structural changes;
//! [`EcsManager::post_update`] then applies everything that was requested,
//! rebuilds the processing orders and flags, and recomputes world matrices.

use log::{debug, info, trace, warn};

use crate::config::EcsConfig;
use crate::foundation::math::{Mat4, Quat, Vec3};

use super::behavior::{Behavior, ComponentBehaviorManager, PassiveBehavior};
use super::component::{ComponentManager, ExternalManager, SceneView};
use super::entity::{Entity, EntityFlags, EntityRegistry};
use super::error::{EcsError, EcsResult};
use super::geometric::ComponentGeometricManager;
use super::id::{Category, ComponentType, Id};
use super::operation::{ComponentOperation, ComponentOperationType, OperationType};
use super::scene_element::{Camera, ComponentSceneElementManager, Light};
use super::tree_manager::ComponentLogicalManager;

/// Run `$body` against the tree manager owning anchor `$id`
macro_rules! with_tree {
    ($self:ident, $id:expr, |$tree:ident| $body:expr, $default:expr) => {
        match $id.category() {
            Category::Logical => {
                let $tree = &$self.logical;
                $body
            }
            Category::Geometric => {
                let $tree = $self.geometric.tree();
                $body
            }
            _ => $default,
        }
    };
}

/// Mutable form of [`with_tree!`]
macro_rules! with_tree_mut {
    ($self:ident, $id:expr, |$tree:ident| $body:expr, $default:expr) => {
        match $id.category() {
            Category::Logical => {
                let $tree = &mut $self.logical;
                $body
            }
            Category::Geometric => {
                let $tree = $self.geometric.tree_mut();
                $body
            }
            _ => $default,
        }
    };
}

/// Owner of all entities and component managers
///
/// Every subsystem receives the manager by reference; there is no global
/// instance. Dropping it terminates every component.
pub struct EcsManager {
    config: EcsConfig,
    registry: EntityRegistry,
    logical: ComponentLogicalManager,
    geometric: ComponentGeometricManager,
    behaviors: ComponentBehaviorManager,
    scene_elements: ComponentSceneElementManager,
    renderer: Option<Box<dyn ExternalManager>>,
    user: Option<Box<dyn ExternalManager>>,
    component_operations: Vec<ComponentOperation>,
    work_operations: Vec<ComponentOperation>,
    update_order: Vec<Entity>,
    update_components: Vec<Id>,
    released: Vec<Id>,
    terminated: bool,
}

impl std::fmt::Debug for EcsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsManager")
            .field("entities", &self.registry.len())
            .field("logical", &ComponentManager::len(&self.logical))
            .field("geometric", &ComponentManager::len(&self.geometric))
            .field("behaviors", &ComponentManager::len(&self.behaviors))
            .field("scene_elements", &ComponentManager::len(&self.scene_elements))
            .field("renderer", &self.renderer.is_some())
            .field("user", &self.user.is_some())
            .field("pending_component_operations", &self.component_operations.len())
            .finish()
    }
}

impl EcsManager {
    /// Create a context sized by `config`
    pub fn new(config: EcsConfig) -> EcsResult<Self> {
        config.validate()?;
        let manager = Self::with_config(config);
        info!(
            "ECS initialized: {} entities, {} components per category",
            manager.config.entity_capacity, manager.config.component_capacity
        );
        Ok(manager)
    }

    fn with_config(config: EcsConfig) -> Self {
        let capacity = config.component_capacity;
        let expand_size = config.component_expand_size;
        Self {
            registry: EntityRegistry::new(config.entity_capacity, config.entity_expand_size),
            logical: ComponentLogicalManager::new(capacity, expand_size),
            geometric: ComponentGeometricManager::new(capacity, expand_size),
            behaviors: ComponentBehaviorManager::new(capacity, expand_size),
            scene_elements: ComponentSceneElementManager::new(capacity, expand_size),
            renderer: None,
            user: None,
            component_operations: Vec::new(),
            work_operations: Vec::new(),
            update_order: Vec::new(),
            update_components: Vec::new(),
            released: Vec::new(),
            terminated: false,
            config,
        }
    }

    /// Configuration the context was built from
    pub const fn config(&self) -> &EcsConfig {
        &self.config
    }

    // ===== Entities =====

    /// Create an entity anchored in the logical hierarchy, under the root
    pub fn request_create_logical(&mut self, name: &str) -> EcsResult<Entity> {
        let entity = self.registry.create()?;
        let id = match self.logical.create(entity) {
            Ok(id) => id,
            Err(error) => {
                self.registry.release(entity);
                return Err(error);
            }
        };
        self.registry.set_anchor(entity, id)?;
        self.logical.set_name(id, name);
        self.logical.add(id, OperationType::Create, entity);
        trace!("Created logical {} '{}'", entity, name);
        Ok(entity)
    }

    /// Create an entity anchored in the geometric hierarchy, under the root
    pub fn request_create_geometric(&mut self, name: &str) -> EcsResult<Entity> {
        let entity = self.registry.create()?;
        let id = match self.geometric.create(entity) {
            Ok(id) => id,
            Err(error) => {
                self.registry.release(entity);
                return Err(error);
            }
        };
        self.registry.set_anchor(entity, id)?;
        let tree = self.geometric.tree_mut();
        tree.set_name(id, name);
        tree.add(id, OperationType::Create, entity);
        trace!("Created geometric {} '{}'", entity, name);
        Ok(entity)
    }

    /// Whether the handle refers to a live entity
    pub fn is_valid_entity(&self, entity: Entity) -> bool {
        self.registry.is_valid(entity)
    }

    /// Number of live entities
    pub const fn num_entities(&self) -> usize {
        self.registry.len()
    }

    /// Queue destruction of an entity and its whole subtree
    ///
    /// Takes effect in the next [`EcsManager::post_update`]. Invalid entities
    /// are ignored.
    pub fn request_destroy(&mut self, entity: Entity) {
        let Some(id) = self.registry.anchor(entity) else {
            trace!("Ignoring destroy request for invalid {}", entity);
            return;
        };
        with_tree_mut!(self, id, |tree| tree.add(id, OperationType::Destroy, entity), ());
    }

    /// Destroy an entity and all of its components now
    ///
    /// Children of the entity survive and move under the root on the next
    /// post-update. Returns `false` for an invalid entity.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        let Some(components) = self.registry.release(entity) else {
            return false;
        };
        for id in components {
            self.destroy_component(id);
        }
        trace!("Destroyed {}", entity);
        true
    }

    fn destroy_component(&mut self, id: Id) {
        match id.category() {
            Category::Logical => {
                self.logical.destroy(id);
            }
            Category::Geometric => {
                self.geometric.destroy(id);
            }
            Category::Behavior => ComponentManager::destroy(&mut self.behaviors, id),
            Category::SceneElement => {
                self.scene_elements.destroy(id);
            }
            category @ (Category::Renderer | Category::User) => {
                if let Some(manager) = self.external_slot(category).as_mut() {
                    manager.destroy(id);
                }
            }
            Category::None => {}
        }
    }

    // ===== Flags, layers and names =====

    /// Whether the entity is live and has every bit of `flag`
    pub fn check_flag(&self, entity: Entity, flag: EntityFlags) -> bool {
        self.registry.check_flag(entity, flag)
    }

    /// Set a self flag; it takes effect down the tree on the next post-update
    ///
    /// `UPDATE` and `RENDER` are computed from the hierarchy and are ignored here.
    pub fn set_flag(&mut self, entity: Entity, flag: EntityFlags) {
        self.assign_flag(entity, flag, true);
    }

    /// Clear a self flag; it takes effect down the tree on the next post-update
    ///
    /// `UPDATE` and `RENDER` are computed from the hierarchy and are ignored here.
    pub fn reset_flag(&mut self, entity: Entity, flag: EntityFlags) {
        self.assign_flag(entity, flag, false);
    }

    fn assign_flag(&mut self, entity: Entity, flag: EntityFlags, value: bool) {
        let Some(id) = self.registry.anchor(entity) else {
            return;
        };
        let own = flag & EntityFlags::SELF_FLAGS;
        if own != flag {
            warn!("Ignoring computed flags {:?} on {}", flag - EntityFlags::SELF_FLAGS, entity);
        }
        if own.is_empty() {
            return;
        }
        self.registry.assign_flag(entity, own, value);
        with_tree_mut!(self, id, |tree| tree.set_dirty(), ());
    }

    /// Layer of a live entity
    pub fn layer(&self, entity: Entity) -> Option<u32> {
        self.registry.layer(entity)
    }

    /// Change the layer of a live entity
    pub fn set_layer(&mut self, entity: Entity, layer: u32) {
        self.registry.set_layer(entity, layer);
    }

    /// Name of the entity's anchor
    pub fn name(&self, entity: Entity) -> Option<&str> {
        let id = self.registry.anchor(entity)?;
        with_tree!(self, id, |tree| tree.name(id), None)
    }

    /// Rename the entity's anchor; names longer than 15 bytes are truncated
    pub fn set_name(&mut self, entity: Entity, name: &str) -> bool {
        let Some(id) = self.registry.anchor(entity) else {
            return false;
        };
        with_tree_mut!(self, id, |tree| tree.set_name(id, name), false)
    }

    /// Whether the entity lives in the logical hierarchy
    pub fn is_logical(&self, entity: Entity) -> bool {
        self.logical(entity).is_some()
    }

    /// Whether the entity lives in the geometric hierarchy
    pub fn is_geometric(&self, entity: Entity) -> bool {
        self.geometric(entity).is_some()
    }

    // ===== Components =====

    /// Create a component and queue linking it to `entity`
    ///
    /// The component shows up in the entity's list after the next
    /// post-update. Behavior components need `behavior`; scene elements use
    /// a passive behavior when it is `None`.
    pub fn add_component(
        &mut self,
        entity: Entity,
        category: Category,
        component_type: ComponentType,
        behavior: Option<Box<dyn Behavior>>,
    ) -> EcsResult<Id> {
        if !self.registry.is_valid(entity) {
            warn!("Cannot add a {:?} component to invalid {}", category, entity);
            return Err(EcsError::InvalidEntity(entity));
        }

        let id = match category {
            Category::Behavior => match behavior {
                Some(behavior) => self.behaviors.create(entity, behavior)?,
                None => {
                    warn!("Behavior component for {} has no behavior", entity);
                    return Err(EcsError::InvalidComponentType { category, component_type });
                }
            },
            Category::SceneElement => {
                let behavior = behavior.unwrap_or_else(|| Box::new(PassiveBehavior));
                self.scene_elements.create(entity, component_type, behavior)?
            }
            Category::Renderer | Category::User => match self.external_slot(category).as_mut() {
                Some(manager) => manager.create(entity, component_type)?,
                None => {
                    warn!("No manager registered for {:?}", category);
                    return Err(EcsError::MissingManager(category));
                }
            },
            Category::Logical | Category::Geometric | Category::None => {
                warn!("{:?} components cannot be added to an entity", category);
                return Err(EcsError::InvalidComponentType { category, component_type });
            }
        };

        self.component_operations.push(ComponentOperation {
            kind: ComponentOperationType::Add,
            entity,
            id,
        });
        Ok(id)
    }

    /// Attach a behavior
    pub fn add_behavior(&mut self, entity: Entity, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.add_component(entity, Category::Behavior, ComponentType::Behavior, Some(behavior))
    }

    /// Attach a camera driven by `behavior`
    pub fn add_camera(&mut self, entity: Entity, camera: Camera, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.add_scene_element(entity, |elements| elements.create_camera(entity, camera, behavior))
    }

    /// Attach a light driven by `behavior`
    pub fn add_light(&mut self, entity: Entity, light: Light, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.add_scene_element(entity, |elements| elements.create_light(entity, light, behavior))
    }

    fn add_scene_element<F>(&mut self, entity: Entity, create: F) -> EcsResult<Id>
    where
        F: FnOnce(&mut ComponentSceneElementManager) -> EcsResult<Id>,
    {
        if !self.registry.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }
        let id = create(&mut self.scene_elements)?;
        self.component_operations.push(ComponentOperation {
            kind: ComponentOperationType::Add,
            entity,
            id,
        });
        Ok(id)
    }

    /// Queue destruction of a non-anchor component
    ///
    /// Also cancels an add queued this frame. Returns `false` when the entity
    /// neither lists nor awaits `id`, or when `id` is its anchor.
    pub fn remove_component(&mut self, entity: Entity, id: Id) -> bool {
        if id.category().is_anchor() {
            return false;
        }
        // A pending add is applied first in the same drain, so the destroy still finds it
        let pending = self.component_operations.iter().any(|operation| {
            operation.kind == ComponentOperationType::Add && operation.entity == entity && operation.id == id
        });
        if !pending && !self.registry.components(entity).contains(&id) {
            return false;
        }
        self.component_operations.push(ComponentOperation {
            kind: ComponentOperationType::Destroy,
            entity,
            id,
        });
        true
    }

    /// Component ids of a live entity, anchor first
    pub fn components(&self, entity: Entity) -> &[Id] {
        self.registry.components(entity)
    }

    /// Logical anchor of the entity
    pub fn logical(&self, entity: Entity) -> Option<Id> {
        self.registry
            .anchor(entity)
            .filter(|id| id.category() == Category::Logical)
    }

    /// Geometric anchor of the entity
    pub fn geometric(&self, entity: Entity) -> Option<Id> {
        self.registry
            .anchor(entity)
            .filter(|id| id.category() == Category::Geometric)
    }

    /// First component of `category` and `component_type` on the entity
    pub fn get_component(&self, entity: Entity, category: Category, component_type: ComponentType) -> Option<Id> {
        self.registry
            .components(entity)
            .iter()
            .copied()
            .filter(|id| id.category() == category)
            .find(|id| self.component_type(*id) == Some(component_type))
    }

    /// First component of `category` on the entity, whatever its type
    pub fn get_component_by_category(&self, entity: Entity, category: Category) -> Option<Id> {
        self.registry
            .components(entity)
            .iter()
            .copied()
            .find(|id| id.category() == category)
    }

    /// Type of a live component
    pub fn component_type(&self, id: Id) -> Option<ComponentType> {
        match id.category() {
            Category::Logical => self.logical.contains(id).then_some(ComponentType::Logical),
            Category::Geometric => self.geometric.tree().contains(id).then_some(ComponentType::Geometric),
            Category::Behavior => self.behaviors.slots().component_type(id),
            Category::SceneElement => self.scene_elements.component_type(id),
            category @ (Category::Renderer | Category::User) => self.external(category)?.component_type(id),
            Category::None => None,
        }
    }

    /// First behavior of type `T` attached to the entity
    ///
    /// Behaviors currently running are not visible.
    pub fn behavior<T: Behavior>(&self, entity: Entity) -> Option<&T> {
        self.registry.components(entity).iter().find_map(|id| match id.category() {
            Category::Behavior => self.behaviors.slots().downcast_ref::<T>(*id),
            Category::SceneElement => self.scene_elements.slots().downcast_ref::<T>(*id),
            _ => None,
        })
    }

    /// First behavior of type `T` attached to the entity, mutably
    pub fn behavior_mut<T: Behavior>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.registry.components(entity).iter().copied().find(|id| match id.category() {
            Category::Behavior => self.behaviors.slots().downcast_ref::<T>(*id).is_some(),
            Category::SceneElement => self.scene_elements.slots().downcast_ref::<T>(*id).is_some(),
            _ => false,
        })?;
        match id.category() {
            Category::Behavior => self.behaviors.slots_mut().downcast_mut::<T>(id),
            _ => self.scene_elements.slots_mut().downcast_mut::<T>(id),
        }
    }

    // ===== Hierarchy =====

    /// Move `entity` under `parent`, or to the top level for `None`
    ///
    /// Both entities must live in the same hierarchy. Refuses moves that
    /// would create a cycle.
    pub fn set_parent(&mut self, entity: Entity, parent: Option<Entity>) -> bool {
        let Some(id) = self.registry.anchor(entity) else {
            return false;
        };
        let parent_id = match parent {
            Some(parent) => match self.registry.anchor(parent) {
                Some(parent_id) if parent_id.category() == id.category() => Some(parent_id),
                _ => {
                    warn!("Cannot parent {} under {}", entity, parent);
                    return false;
                }
            },
            None => None,
        };
        with_tree_mut!(self, id, |tree| tree.set_parent(id, parent_id), false)
    }

    /// Parent entity; `None` at the top level
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        let id = self.registry.anchor(entity)?;
        with_tree!(self, id, |tree| tree.parent(id).and_then(|parent| tree.entity(parent)), None)
    }

    /// Direct children in sibling order
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        let Some(id) = self.registry.anchor(entity) else {
            return Vec::new();
        };
        with_tree!(
            self,
            id,
            |tree| tree.children(id).filter_map(|child| tree.entity(child)).collect(),
            Vec::new()
        )
    }

    /// Move the entity to the front of its siblings
    pub fn set_first_sibling(&mut self, entity: Entity) -> bool {
        let Some(id) = self.registry.anchor(entity) else {
            return false;
        };
        with_tree_mut!(self, id, |tree| tree.set_first_sibling(id), false)
    }

    /// Move the entity to the back of its siblings
    pub fn set_last_sibling(&mut self, entity: Entity) -> bool {
        let Some(id) = self.registry.anchor(entity) else {
            return false;
        };
        with_tree_mut!(self, id, |tree| tree.set_last_sibling(id), false)
    }

    /// Resolve a `/`-separated name path in the logical hierarchy
    pub fn find_logical(&self, path: &str) -> Option<Entity> {
        let id = self.logical.find(path)?;
        self.logical.entity(id)
    }

    /// Resolve a `/`-separated name path in the geometric hierarchy
    pub fn find_geometric(&self, path: &str) -> Option<Entity> {
        let tree = self.geometric.tree();
        let id = tree.find(path)?;
        tree.entity(id)
    }

    // ===== Transforms =====

    /// Local position of a geometric entity
    pub fn position(&self, entity: Entity) -> Option<Vec3> {
        self.geometric.position(self.geometric(entity)?).copied()
    }

    /// Set the local position of a geometric entity
    pub fn set_position(&mut self, entity: Entity, position: Vec3) {
        if let Some(id) = self.geometric(entity) {
            self.geometric.set_position(id, position);
        }
    }

    /// Local rotation of a geometric entity
    pub fn rotation(&self, entity: Entity) -> Option<Quat> {
        self.geometric.rotation(self.geometric(entity)?).copied()
    }

    /// Set the local rotation of a geometric entity
    pub fn set_rotation(&mut self, entity: Entity, rotation: Quat) {
        if let Some(id) = self.geometric(entity) {
            self.geometric.set_rotation(id, rotation);
        }
    }

    /// Set the local scale of a geometric entity
    pub fn set_scale(&mut self, entity: Entity, scale: Vec3) {
        if let Some(id) = self.geometric(entity) {
            self.geometric.set_scale(id, scale);
        }
    }

    /// Turn a geometric entity so its -Z axis faces `target`
    pub fn look_at(&mut self, entity: Entity, target: &Vec3, up: &Vec3) {
        if let Some(id) = self.geometric(entity) {
            self.geometric.look_at(id, target, up);
        }
    }

    /// World matrix as of the last post-update
    pub fn world_matrix(&self, entity: Entity) -> Option<&Mat4> {
        self.geometric.matrix(self.geometric(entity)?)
    }

    /// World position as of the last post-update
    pub fn world_position(&self, entity: Entity) -> Option<Vec3> {
        self.geometric.world_position(self.geometric(entity)?)
    }

    /// Geometric entities whose computed `flag` is set, in processing order
    pub fn active_geometric(&self, flag: EntityFlags) -> impl Iterator<Item = (Entity, &Mat4)> + '_ {
        let tree = self.geometric.tree();
        tree.process_ids()
            .zip(tree.process_order().iter().copied())
            .filter(move |(_, entity)| self.registry.check_flag(*entity, flag))
            .filter_map(move |(id, entity)| self.geometric.matrix(id).map(|matrix| (entity, matrix)))
    }

    // ===== Frame cycle =====

    /// Run per-component logic for every updatable entity
    ///
    /// Logical entities go first, then geometric, each in processing order.
    /// Structural requests made here are applied by the next
    /// [`EcsManager::post_update`].
    pub fn update(&mut self) {
        for category in [Category::Logical, Category::Geometric] {
            let mut order = std::mem::take(&mut self.update_order);
            order.clear();
            match category {
                Category::Logical => order.extend_from_slice(self.logical.process_order()),
                _ => order.extend_from_slice(self.geometric.tree().process_order()),
            }

            for &entity in &order {
                if !self.registry.check_flag(entity, EntityFlags::UPDATE) {
                    continue;
                }
                let mut components = std::mem::take(&mut self.update_components);
                components.clear();
                components.extend(self.registry.components(entity).iter().skip(1));
                for &id in &components {
                    self.update_component(id);
                }
                self.update_components = components;
            }
            self.update_order = order;
        }
    }

    fn update_component(&mut self, id: Id) {
        match id.category() {
            Category::Behavior => {
                if let Some(mut checked) = self.behaviors.slots_mut().checkout(id) {
                    checked.run(self);
                    self.behaviors.slots_mut().check_in(checked);
                }
            }
            Category::SceneElement => {
                if let Some(mut checked) = self.scene_elements.slots_mut().checkout(id) {
                    checked.run(self);
                    self.scene_elements.slots_mut().check_in(checked);
                }
            }
            category @ (Category::Renderer | Category::User) => {
                if let Some(manager) = self.external_slot(category).as_mut() {
                    manager.update_component(id);
                }
            }
            Category::Logical | Category::Geometric | Category::None => {}
        }
    }

    /// Apply every queued request and refresh derived state
    ///
    /// Order: component adds and removals, logical tree, geometric tree,
    /// world matrices, scene elements, then external managers.
    pub fn post_update(&mut self) {
        self.apply_component_operations();

        let mut released = std::mem::take(&mut self.released);
        self.logical.update(&mut self.registry, &mut released);
        self.destroy_released(&mut released);
        self.geometric.update(&mut self.registry, &mut released);
        self.destroy_released(&mut released);
        self.released = released;

        self.geometric.update_matrices();

        let scene = SceneView::new(&self.registry, &self.geometric);
        self.scene_elements.post_update_components(&scene);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.post_update_components(&scene);
        }
        if let Some(user) = self.user.as_mut() {
            user.post_update_components(&scene);
        }
    }

    fn apply_component_operations(&mut self) {
        let mut work = std::mem::replace(
            &mut self.component_operations,
            std::mem::take(&mut self.work_operations),
        );
        if !work.is_empty() {
            debug!("Applying {} component operations", work.len());
        }

        for operation in work.drain(..) {
            match operation.kind {
                ComponentOperationType::Add => {
                    if !self.registry.attach(operation.entity, operation.id) {
                        trace!("Dropping {:?} added to destroyed {}", operation.id, operation.entity);
                        self.destroy_component(operation.id);
                    }
                }
                ComponentOperationType::Destroy => {
                    if !self.registry.components(operation.entity).contains(&operation.id) {
                        continue;
                    }
                    self.destroy_component(operation.id);
                    self.registry.detach(operation.entity, operation.id);
                }
            }
        }
        self.work_operations = work;
    }

    fn destroy_released(&mut self, released: &mut Vec<Id>) {
        for id in released.drain(..) {
            self.destroy_component(id);
        }
    }

    /// Destroy every entity and shut every manager down
    ///
    /// Called by `Drop` when not called explicitly.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }

        let roots: Vec<_> = self
            .logical
            .root_children()
            .chain(self.geometric.tree().root_children())
            .collect();
        for id in roots {
            let entity = with_tree!(self, id, |tree| tree.entity(id), None);
            if let Some(entity) = entity {
                with_tree_mut!(self, id, |tree| tree.add(id, OperationType::Destroy, entity), ());
            }
        }
        self.post_update();

        self.behaviors.terminate();
        self.scene_elements.terminate();
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.terminate();
        }
        if let Some(user) = self.user.as_mut() {
            user.terminate();
        }
        self.geometric.terminate();
        self.logical.terminate();
        self.terminated = true;
        info!("ECS terminated, {} entities left", self.registry.len());
    }

    // ===== Managers =====

    fn external_slot(&mut self, category: Category) -> &mut Option<Box<dyn ExternalManager>> {
        match category {
            Category::User => &mut self.user,
            _ => &mut self.renderer,
        }
    }

    fn external(&self, category: Category) -> Option<&dyn ExternalManager> {
        match category {
            Category::Renderer => self.renderer.as_deref(),
            Category::User => self.user.as_deref(),
            _ => None,
        }
    }

    /// Register the manager for the renderer or user category
    ///
    /// Returns the manager it replaces.
    pub fn register_manager(
        &mut self,
        mut manager: Box<dyn ExternalManager>,
    ) -> EcsResult<Option<Box<dyn ExternalManager>>> {
        let category = manager.category();
        if !category.is_external() {
            return Err(EcsError::UnsupportedCategory(category));
        }
        manager.initialize();
        debug!("Registered {:?} manager", category);
        Ok(self.external_slot(category).replace(manager))
    }

    /// Downcast the registered manager for `category`
    pub fn external_manager<T: ExternalManager>(&self, category: Category) -> Option<&T> {
        self.external(category)?.as_any().downcast_ref::<T>()
    }

    /// Downcast the registered manager for `category`, mutably
    pub fn external_manager_mut<T: ExternalManager>(&mut self, category: Category) -> Option<&mut T> {
        if !category.is_external() {
            return None;
        }
        let manager = self.external_slot(category).as_deref_mut()?;
        manager.as_any_mut().downcast_mut::<T>()
    }

    /// Entity registry
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Logical hierarchy
    pub const fn logical_manager(&self) -> &ComponentLogicalManager {
        &self.logical
    }

    /// Geometric hierarchy and transforms
    pub const fn geometric_manager(&self) -> &ComponentGeometricManager {
        &self.geometric
    }

    /// Geometric hierarchy and transforms, mutable
    pub fn geometric_manager_mut(&mut self) -> &mut ComponentGeometricManager {
        &mut self.geometric
    }

    /// Behaviors
    pub const fn behavior_manager(&self) -> &ComponentBehaviorManager {
        &self.behaviors
    }

    /// Cameras and lights
    pub const fn scene_element_manager(&self) -> &ComponentSceneElementManager {
        &self.scene_elements
    }

    /// Cameras and lights, mutable
    pub fn scene_element_manager_mut(&mut self) -> &mut ComponentSceneElementManager {
        &mut self.scene_elements
    }
}

impl Default for EcsManager {
    /// Context built from [`EcsConfig::default`], which always validates
    fn default() -> Self {
        Self::with_config(EcsConfig::default())
    }
}

impl Drop for EcsManager {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct TagManager {
        ids: Vec<(Id, Entity, ComponentType)>,
        next: u16,
        updates: usize,
        post_updates: usize,
    }

    impl ComponentManager for TagManager {
        fn category(&self) -> Category {
            Category::User
        }

        fn destroy(&mut self, id: Id) {
            self.ids.retain(|(live, _, _)| *live != id);
        }

        fn update_component(&mut self, _id: Id) {
            self.updates += 1;
        }

        fn len(&self) -> usize {
            self.ids.len()
        }
    }

    impl ExternalManager for TagManager {
        fn create(&mut self, entity: Entity, component_type: ComponentType) -> EcsResult<Id> {
            let id = Id::new(Category::User, self.next);
            self.next += 1;
            self.ids.push((id, entity, component_type));
            Ok(id)
        }

        fn component_type(&self, id: Id) -> Option<ComponentType> {
            self.ids.iter().find(|(live, _, _)| *live == id).map(|(_, _, ty)| *ty)
        }

        fn post_update_components(&mut self, _scene: &SceneView<'_>) {
            self.post_updates += 1;
        }
    }

    #[derive(Debug)]
    struct WrongCategory;

    impl ComponentManager for WrongCategory {
        fn category(&self) -> Category {
            Category::Behavior
        }

        fn destroy(&mut self, _id: Id) {}

        fn len(&self) -> usize {
            0
        }
    }

    impl ExternalManager for WrongCategory {
        fn create(&mut self, _entity: Entity, _component_type: ComponentType) -> EcsResult<Id> {
            Ok(Id::INVALID)
        }

        fn component_type(&self, _id: Id) -> Option<ComponentType> {
            None
        }
    }

    fn manager() -> EcsManager {
        EcsManager::new(EcsConfig::new().with_entity_capacity(8).with_component_capacity(8)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EcsConfig::new().with_expand_sizes(0, 1);
        assert!(matches!(EcsManager::new(config), Err(EcsError::Config(_))));
    }

    #[test]
    fn test_add_component_validates_category() {
        let mut ecs = manager();
        let entity = ecs.request_create_geometric("e").unwrap();

        assert!(matches!(
            ecs.add_component(entity, Category::Geometric, ComponentType::Geometric, None),
            Err(EcsError::InvalidComponentType { .. })
        ));
        assert!(matches!(
            ecs.add_component(entity, Category::Behavior, ComponentType::Behavior, None),
            Err(EcsError::InvalidComponentType { .. })
        ));
        assert!(matches!(
            ecs.add_component(entity, Category::User, ComponentType::User(1), None),
            Err(EcsError::MissingManager(Category::User))
        ));
        assert!(matches!(
            ecs.add_component(entity, Category::SceneElement, ComponentType::Renderer, None),
            Err(EcsError::InvalidComponentType { .. })
        ));
    }

    #[test]
    fn test_register_manager_checks_category() {
        let mut ecs = manager();
        assert!(matches!(
            ecs.register_manager(Box::new(WrongCategory)),
            Err(EcsError::UnsupportedCategory(Category::Behavior))
        ));
        assert!(ecs.register_manager(Box::new(TagManager::default())).unwrap().is_none());
        assert!(ecs.register_manager(Box::new(TagManager::default())).unwrap().is_some());
    }

    #[test]
    fn test_external_components_are_dispatched() {
        let mut ecs = manager();
        ecs.register_manager(Box::new(TagManager::default())).unwrap();
        let entity = ecs.request_create_geometric("tagged").unwrap();
        let id = ecs
            .add_component(entity, Category::User, ComponentType::User(3), None)
            .unwrap();

        // Linked only once post-update runs
        assert!(ecs.get_component(entity, Category::User, ComponentType::User(3)).is_none());
        ecs.post_update();
        assert_eq!(ecs.get_component(entity, Category::User, ComponentType::User(3)), Some(id));
        assert_eq!(ecs.get_component(entity, Category::User, ComponentType::User(4)), None);
        assert_eq!(ecs.get_component_by_category(entity, Category::User), Some(id));

        ecs.update();
        ecs.post_update();
        let tags = ecs.external_manager::<TagManager>(Category::User).unwrap();
        assert_eq!(tags.updates, 1);
        assert_eq!(tags.post_updates, 2);
        assert!(ecs.external_manager::<TagManager>(Category::Renderer).is_none());

        assert!(ecs.remove_component(entity, id));
        ecs.post_update();
        assert!(ecs.components(entity).iter().all(|c| *c != id));
        assert!(ecs.external_manager_mut::<TagManager>(Category::User).unwrap().ids.is_empty());
    }

    #[test]
    fn test_remove_component_refuses_anchor() {
        let mut ecs = manager();
        let entity = ecs.request_create_logical("e").unwrap();
        let anchor = ecs.logical(entity).unwrap();
        assert!(!ecs.remove_component(entity, anchor));
        assert!(!ecs.remove_component(entity, Id::new(Category::Behavior, 0)));
    }

    #[test]
    fn test_names_and_lookup_by_path() {
        let mut ecs = manager();
        let parent = ecs.request_create_logical("parent").unwrap();
        let child = ecs.request_create_logical("child").unwrap();
        assert!(ecs.set_parent(child, Some(parent)));

        assert_eq!(ecs.find_logical("/parent/child"), Some(child));
        assert_eq!(ecs.find_geometric("/parent/child"), None);
        assert!(ecs.set_name(child, "renamed"));
        assert_eq!(ecs.name(child), Some("renamed"));
        assert_eq!(ecs.find_logical("/parent/renamed"), Some(child));
    }

    #[test]
    fn test_set_parent_rejects_mixed_hierarchies() {
        let mut ecs = manager();
        let logical = ecs.request_create_logical("l").unwrap();
        let geometric = ecs.request_create_geometric("g").unwrap();
        assert!(!ecs.set_parent(geometric, Some(logical)));
        assert_eq!(ecs.parent(geometric), None);
        assert!(ecs.is_logical(logical));
        assert!(ecs.is_geometric(geometric));
        assert!(!ecs.is_geometric(logical));
    }

    #[test]
    fn test_terminate_releases_everything() {
        let mut ecs = manager();
        let root = ecs.request_create_geometric("root").unwrap();
        let child = ecs.request_create_geometric("child").unwrap();
        ecs.set_parent(child, Some(root));
        ecs.request_create_logical("other").unwrap();
        ecs.post_update();

        ecs.terminate();
        assert_eq!(ecs.num_entities(), 0);
        assert!(!ecs.is_valid_entity(child));
        // Second call is a no-op
        ecs.terminate();
    }

    #[test]
    fn test_debug_summarizes_counts() {
        let mut ecs = manager();
        ecs.request_create_logical("a").unwrap();
        let text = format!("{:?}", ecs);
        assert!(text.contains("entities: 1"));
    }
}
