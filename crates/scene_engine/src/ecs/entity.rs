//! Entities and their out-of-line records
//!
//! An [`Entity`] is only a generation-tagged handle. Everything attached to
//! it (component list, flags, layer) lives in the [`EntityRegistry`], in
//! arrays indexed by the handle's slot.

use std::fmt;

use bitflags::bitflags;

use super::error::{EcsError, EcsResult};
use super::handle::{Handle, HandleTable};
use super::id::Id;
use super::id_buffer::{IdBufferAllocator, IdBufferKey, IDS_PER_BLOCK};

/// Layer assigned to new entities
pub const LAYER_DEFAULT: u32 = 1 << 0;

/// Entity handle
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Entity(Handle);

impl Entity {
    /// The null entity
    pub const NULL: Self = Self(Handle::NULL);

    /// Wrap a raw handle
    pub const fn from_handle(handle: Handle) -> Self {
        Self(handle)
    }

    /// Underlying handle
    pub const fn handle(self) -> Handle {
        self.0
    }

    /// Slot index of the handle
    pub const fn index(self) -> usize {
        self.0.index() as usize
    }

    /// Whether this is the null entity
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.0.index(), self.0.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Per-entity activity flags
    ///
    /// `UPDATE_SELF`/`RENDER_SELF` are set by the host. `UPDATE`/`RENDER`
    /// are recomputed by the anchor tree: a flag holds only while the entity's
    /// own flag and every ancestor's flag hold.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntityFlags: u8 {
        /// Entity wants per-frame updates
        const UPDATE_SELF = 1 << 0;
        /// Entity wants to be drawn
        const RENDER_SELF = 1 << 1;
        /// Effective update state
        const UPDATE = 1 << 2;
        /// Effective render state
        const RENDER = 1 << 3;

        /// Flags of a freshly created entity
        const DEFAULT = Self::UPDATE_SELF.bits()
            | Self::RENDER_SELF.bits()
            | Self::UPDATE.bits()
            | Self::RENDER.bits();
    }
}

impl EntityFlags {
    /// Flags the host sets directly
    pub const SELF_FLAGS: Self = Self::UPDATE_SELF.union(Self::RENDER_SELF);
}

/// Ordered component list of one entity
///
/// Element 0 is always the anchor (logical or geometric) component. The ids
/// live in a buffer borrowed from an [`IdBufferAllocator`], grown one block
/// at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EntityComponents {
    buffer: Option<IdBufferKey>,
    len: u16,
    capacity: u16,
}

impl EntityComponents {
    /// An empty list with no buffer
    pub const fn new() -> Self {
        Self {
            buffer: None,
            len: 0,
            capacity: 0,
        }
    }

    /// Number of ids
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the list holds no id
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the ids
    pub fn as_slice<'a>(&self, pool: &'a IdBufferAllocator) -> &'a [Id] {
        match self.buffer {
            Some(key) => &pool.get(key)[..self.len()],
            None => &[],
        }
    }

    /// The anchor component, if any
    pub fn anchor(&self, pool: &IdBufferAllocator) -> Option<Id> {
        self.as_slice(pool).first().copied()
    }

    /// Whether `id` is in the list
    pub fn contains(&self, pool: &IdBufferAllocator, id: Id) -> bool {
        self.as_slice(pool).contains(&id)
    }

    /// Append a non-anchor component
    ///
    /// Anchor categories are refused; use [`EntityComponents::force_add`].
    pub fn add(&mut self, pool: &mut IdBufferAllocator, id: Id) -> bool {
        debug_assert!(!id.category().is_anchor(), "anchor component {id:?} added as a regular component");
        if id.category().is_anchor() {
            return false;
        }
        self.force_add(pool, id);
        true
    }

    /// Append any component
    pub fn force_add(&mut self, pool: &mut IdBufferAllocator, id: Id) {
        if self.len == self.capacity {
            self.grow(pool);
        }
        if let Some(slots) = self.buffer.and_then(|key| pool.get_mut(key)) {
            slots[self.len as usize] = id;
            self.len += 1;
        }
    }

    /// Remove a non-anchor component, keeping the order of the rest
    pub fn remove(&mut self, pool: &mut IdBufferAllocator, id: Id) -> bool {
        if id.category().is_anchor() {
            return false;
        }
        self.force_remove(pool, id)
    }

    /// Remove any component, keeping the order of the rest
    pub fn force_remove(&mut self, pool: &mut IdBufferAllocator, id: Id) -> bool {
        let len = self.len();
        let Some(slots) = self.buffer.and_then(|key| pool.get_mut(key)) else {
            return false;
        };
        let Some(position) = slots[..len].iter().position(|current| *current == id) else {
            return false;
        };
        slots.copy_within(position + 1..len, position);
        slots[len - 1] = Id::INVALID;
        self.len -= 1;
        true
    }

    /// Give the buffer back to the pool
    pub fn release(&mut self, pool: &mut IdBufferAllocator) {
        if let Some(key) = self.buffer.take() {
            pool.release(key);
        }
        self.len = 0;
        self.capacity = 0;
    }

    fn grow(&mut self, pool: &mut IdBufferAllocator) {
        let blocks = self.capacity as usize / IDS_PER_BLOCK + 1;
        let key = pool.allocate(blocks);
        if let Some(old) = self.buffer {
            for i in 0..self.len() {
                let id = pool.get(old)[i];
                if let Some(slots) = pool.get_mut(key) {
                    slots[i] = id;
                }
            }
            pool.release(old);
        }
        self.buffer = Some(key);
        self.capacity = (blocks * IDS_PER_BLOCK) as u16;
    }
}

/// Entity handles plus every per-entity record
#[derive(Debug)]
pub struct EntityRegistry {
    handles: HandleTable,
    components: Vec<EntityComponents>,
    flags: Vec<EntityFlags>,
    layers: Vec<u32>,
    pool: IdBufferAllocator,
}

impl EntityRegistry {
    /// Create a registry with room for `capacity` entities
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        let handles = HandleTable::new(capacity, expand_size);
        let capacity = handles.capacity();
        Self {
            handles,
            components: vec![EntityComponents::new(); capacity],
            flags: vec![EntityFlags::empty(); capacity],
            layers: vec![LAYER_DEFAULT; capacity],
            pool: IdBufferAllocator::new(),
        }
    }

    /// Allocate a handle with default flags, default layer and no components
    pub fn create(&mut self) -> EcsResult<Entity> {
        let capacity = self.handles.capacity();
        let handle = self.handles.create()?;
        if self.handles.capacity() != capacity {
            self.expand();
        }

        let index = handle.index() as usize;
        self.components[index] = EntityComponents::new();
        self.flags[index] = EntityFlags::DEFAULT;
        self.layers[index] = LAYER_DEFAULT;
        Ok(Entity::from_handle(handle))
    }

    fn expand(&mut self) {
        let capacity = self.handles.capacity();
        self.components.resize(capacity, EntityComponents::new());
        self.flags.resize(capacity, EntityFlags::empty());
        self.layers.resize(capacity, LAYER_DEFAULT);
    }

    /// Invalidate the handle and hand back its component ids, anchor first
    ///
    /// Returns `None` when the entity was already invalid.
    pub fn release(&mut self, entity: Entity) -> Option<Vec<Id>> {
        if !self.handles.destroy(entity.handle()) {
            return None;
        }
        let index = entity.index();
        let ids = self.components[index].as_slice(&self.pool).to_vec();
        self.components[index].release(&mut self.pool);
        self.flags[index] = EntityFlags::empty();
        self.layers[index] = LAYER_DEFAULT;
        Some(ids)
    }

    /// Whether the handle is live
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.handles.is_valid(entity.handle())
    }

    /// Number of live entities
    pub const fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no entity is live
    pub const fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Component ids of a live entity, anchor first; empty when invalid
    pub fn components(&self, entity: Entity) -> &[Id] {
        if !self.is_valid(entity) {
            return &[];
        }
        self.components[entity.index()].as_slice(&self.pool)
    }

    /// Anchor component of a live entity
    pub fn anchor(&self, entity: Entity) -> Option<Id> {
        self.components(entity).first().copied()
    }

    /// Store the anchor component
    pub fn set_anchor(&mut self, entity: Entity, id: Id) -> EcsResult<()> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }
        let components = &mut self.components[entity.index()];
        debug_assert!(components.is_empty(), "{entity} already has an anchor");
        components.force_add(&mut self.pool, id);
        Ok(())
    }

    /// Attach a non-anchor component id
    pub fn attach(&mut self, entity: Entity, id: Id) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        self.components[entity.index()].add(&mut self.pool, id)
    }

    /// Detach a non-anchor component id
    pub fn detach(&mut self, entity: Entity, id: Id) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        self.components[entity.index()].remove(&mut self.pool, id)
    }

    /// Flags of a live entity; empty when invalid
    pub fn flags(&self, entity: Entity) -> EntityFlags {
        if self.is_valid(entity) {
            self.flags[entity.index()]
        } else {
            EntityFlags::empty()
        }
    }

    /// Whether every bit of `flag` is set
    pub fn check_flag(&self, entity: Entity, flag: EntityFlags) -> bool {
        self.flags(entity).contains(flag)
    }

    /// Set or clear `flag`
    pub fn assign_flag(&mut self, entity: Entity, flag: EntityFlags, value: bool) {
        if self.is_valid(entity) {
            self.flags[entity.index()].set(flag, value);
        }
    }

    /// Layer of a live entity
    pub fn layer(&self, entity: Entity) -> Option<u32> {
        self.is_valid(entity).then(|| self.layers[entity.index()])
    }

    /// Change the layer of a live entity
    pub fn set_layer(&mut self, entity: Entity, layer: u32) {
        if self.is_valid(entity) {
            self.layers[entity.index()] = layer;
        }
    }

    /// Component id buffer pool
    pub const fn pool(&self) -> &IdBufferAllocator {
        &self.pool
    }
}
