//! Scripted behaviors
//!
//! A [`Behavior`] is game logic attached to an entity. It runs with full
//! access to the [`EcsManager`], so while it runs its box is checked out of
//! the slot that owns it. A slot destroyed during that window is detected on
//! check-in through a per-slot serial number.

use log::{trace, warn};

use super::component::{AsAny, ComponentManager};
use super::entity::Entity;
use super::error::EcsResult;
use super::id::{Category, ComponentType, Id, IdTable};
use super::manager::EcsManager;

/// Per-entity game logic
///
/// Every hook has an empty default.
pub trait Behavior: AsAny {
    /// Called when the component is created
    fn on_create(&mut self, _id: Id, _entity: Entity) {}

    /// Called before the first [`Behavior::update`]
    fn on_start(&mut self, _ecs: &mut EcsManager, _entity: Entity) {}

    /// Called once per frame while the entity's `UPDATE` flag is set
    fn update(&mut self, _ecs: &mut EcsManager, _entity: Entity) {}

    /// Called when the component is destroyed
    fn on_destroy(&mut self, _entity: Entity) {}

    /// Type reported by component lookups
    fn component_type(&self) -> ComponentType {
        ComponentType::Behavior
    }
}

/// Behavior with no logic, for components that only carry data
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveBehavior;

impl Behavior for PassiveBehavior {}

/// A behavior taken out of its slot for the duration of one call
pub struct CheckedOut {
    id: Id,
    serial: u32,
    entity: Entity,
    started: bool,
    behavior: Box<dyn Behavior>,
}

impl CheckedOut {
    /// Component id
    pub const fn id(&self) -> Id {
        self.id
    }

    /// Owning entity
    pub const fn entity(&self) -> Entity {
        self.entity
    }

    /// Whether `on_start` already ran
    pub const fn started(&self) -> bool {
        self.started
    }

    /// Run `on_start` if needed, then `update`
    pub fn run(&mut self, ecs: &mut EcsManager) {
        if !self.started {
            self.behavior.on_start(ecs, self.entity);
            self.started = true;
        }
        self.behavior.update(ecs, self.entity);
    }
}

struct BehaviorSlot {
    behavior: Option<Box<dyn Behavior>>,
    entity: Entity,
    component_type: ComponentType,
    serial: u32,
    started: bool,
}

impl Default for BehaviorSlot {
    fn default() -> Self {
        Self {
            behavior: None,
            entity: Entity::NULL,
            component_type: ComponentType::None,
            serial: 0,
            started: false,
        }
    }
}

/// Slot storage for boxed behaviors, shared by every manager that runs them
pub struct BehaviorSlots {
    ids: IdTable,
    slots: Vec<BehaviorSlot>,
    next_serial: u32,
}

impl std::fmt::Debug for BehaviorSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorSlots")
            .field("category", &self.ids.category())
            .field("len", &self.ids.len())
            .field("capacity", &self.ids.capacity())
            .finish()
    }
}

impl BehaviorSlots {
    /// Create storage for `category` with `capacity` slots
    pub fn new(category: Category, capacity: usize, expand_size: usize) -> Self {
        let ids = IdTable::new(category, capacity, expand_size);
        let capacity = ids.capacity();
        Self {
            ids,
            slots: std::iter::repeat_with(BehaviorSlot::default).take(capacity).collect(),
            next_serial: 0,
        }
    }

    /// Number of slots backed by storage
    pub fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    /// Store `behavior` for `entity` and run its `on_create`
    pub fn create(&mut self, entity: Entity, mut behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        let id = self.ids.create()?;
        if self.slots.len() < self.ids.capacity() {
            self.slots.resize_with(self.ids.capacity(), BehaviorSlot::default);
        }

        self.next_serial = self.next_serial.wrapping_add(1);
        behavior.on_create(id, entity);
        self.slots[id.slot()] = BehaviorSlot {
            component_type: behavior.component_type(),
            behavior: Some(behavior),
            entity,
            serial: self.next_serial,
            started: false,
        };
        trace!("Created {:?} for {}", id, entity);
        Ok(id)
    }

    /// Destroy a behavior, running its `on_destroy` unless it is checked out
    pub fn destroy(&mut self, id: Id) -> bool {
        if !self.ids.destroy(id) {
            return false;
        }
        let slot = std::mem::take(&mut self.slots[id.slot()]);
        if let Some(mut behavior) = slot.behavior {
            behavior.on_destroy(slot.entity);
        }
        trace!("Destroyed {:?}", id);
        true
    }

    /// Whether `id` is live
    pub fn contains(&self, id: Id) -> bool {
        self.ids.contains(id)
    }

    /// Number of live behaviors
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no behavior is live
    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Live ids
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.ids.iter()
    }

    /// Behavior in the slot; `None` while it is checked out
    pub fn get(&self, id: Id) -> Option<&dyn Behavior> {
        if !self.contains(id) {
            return None;
        }
        self.slots[id.slot()].behavior.as_deref()
    }

    /// Downcast the behavior in the slot
    pub fn downcast_ref<T: Behavior>(&self, id: Id) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    /// Downcast the behavior in the slot, mutably
    pub fn downcast_mut<T: Behavior>(&mut self, id: Id) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        let behavior = self.slots[id.slot()].behavior.as_deref_mut()?;
        behavior.as_any_mut().downcast_mut::<T>()
    }

    /// Owning entity
    pub fn entity(&self, id: Id) -> Option<Entity> {
        self.contains(id).then(|| self.slots[id.slot()].entity)
    }

    /// Type reported by the behavior when it was created
    pub fn component_type(&self, id: Id) -> Option<ComponentType> {
        self.contains(id).then(|| self.slots[id.slot()].component_type)
    }

    /// Take the behavior out of its slot
    ///
    /// Returns `None` for unknown ids and for a behavior already checked out.
    pub fn checkout(&mut self, id: Id) -> Option<CheckedOut> {
        if !self.contains(id) {
            return None;
        }
        let slot = &mut self.slots[id.slot()];
        let behavior = slot.behavior.take()?;
        Some(CheckedOut {
            id,
            serial: slot.serial,
            entity: slot.entity,
            started: slot.started,
            behavior,
        })
    }

    /// Whether the slot a checked-out behavior came from is still the same
    pub fn is_current(&self, checked: &CheckedOut) -> bool {
        self.contains(checked.id) && self.slots[checked.id.slot()].serial == checked.serial
    }

    /// Put a behavior back
    ///
    /// If its slot was destroyed meanwhile, `on_destroy` runs now and the
    /// behavior is dropped. Returns whether the behavior was restored.
    pub fn check_in(&mut self, checked: CheckedOut) -> bool {
        let current = self.is_current(&checked);
        let CheckedOut { id, entity, started, mut behavior, .. } = checked;
        if !current {
            trace!("{:?} was destroyed while running", id);
            behavior.on_destroy(entity);
            return false;
        }
        let slot = &mut self.slots[id.slot()];
        slot.started = started;
        slot.behavior = Some(behavior);
        true
    }

    /// Destroy every live behavior
    pub fn clear(&mut self) {
        let ids: Vec<_> = self.ids.iter().collect();
        for id in ids {
            self.destroy(id);
        }
    }
}

/// Manager of the behavior category
#[derive(Debug)]
pub struct ComponentBehaviorManager {
    slots: BehaviorSlots,
}

impl ComponentBehaviorManager {
    /// Create a manager with `capacity` slots
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        Self {
            slots: BehaviorSlots::new(Category::Behavior, capacity, expand_size),
        }
    }

    /// Attach `behavior` to `entity`
    pub fn create(&mut self, entity: Entity, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.slots.create(entity, behavior)
    }

    /// Slot storage
    pub const fn slots(&self) -> &BehaviorSlots {
        &self.slots
    }

    /// Slot storage, mutable
    pub fn slots_mut(&mut self) -> &mut BehaviorSlots {
        &mut self.slots
    }
}

impl ComponentManager for ComponentBehaviorManager {
    fn category(&self) -> Category {
        Category::Behavior
    }

    fn destroy(&mut self, id: Id) {
        if !self.slots.destroy(id) {
            warn!("Ignoring destroy of unknown behavior {:?}", id);
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn terminate(&mut self) {
        self.slots.clear();
    }
}
