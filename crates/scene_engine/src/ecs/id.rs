//! Component identifiers and the slot table behind every component manager
//!
//! An [`Id`] packs an 8-bit [`Category`] (which manager owns it) with a
//! 16-bit slot index. [`IdTable`] hands those indices out, recycling freed
//! slots before touching fresh ones.

use std::fmt;

use super::error::{EcsError, EcsResult};

/// Highest number of slots a component manager can hold
///
/// The two indices above it are reserved as tree sentinels.
pub const MAX_COMPONENT_SLOTS: usize = 0xFFFD;

/// Component manager category
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// No category
    None = 0,
    /// Logical hierarchy anchor
    Logical = 1,
    /// Geometric hierarchy anchor
    Geometric = 2,
    /// Renderer components, served by an external manager
    Renderer = 3,
    /// Cameras and lights
    SceneElement = 4,
    /// Scripted behaviors
    Behavior = 5,
    /// Application-defined components, served by an external manager
    User = 6,
}

impl Category {
    /// Number of categories, `None` included
    pub const COUNT: usize = 7;

    /// Decode a raw category byte; unknown values map to `None`
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Logical,
            2 => Self::Geometric,
            3 => Self::Renderer,
            4 => Self::SceneElement,
            5 => Self::Behavior,
            6 => Self::User,
            _ => Self::None,
        }
    }

    /// Whether components of this category anchor an entity in a tree
    pub const fn is_anchor(self) -> bool {
        matches!(self, Self::Logical | Self::Geometric)
    }

    /// Whether this category is served by a manager the host registers
    pub const fn is_external(self) -> bool {
        matches!(self, Self::Renderer | Self::User)
    }
}

/// Concrete component type within a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// No type
    None,
    /// Logical anchor
    Logical,
    /// Geometric anchor
    Geometric,
    /// Renderer component
    Renderer,
    /// Camera scene element
    Camera,
    /// Light scene element
    Light,
    /// Generic behavior
    Behavior,
    /// Application-defined type tag
    User(u32),
}

/// Packed component identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);

impl Id {
    /// The invalid identifier
    pub const INVALID: Self = Self(u32::MAX);

    const CATEGORY_SHIFT: u32 = 24;
    const CATEGORY_MASK: u32 = 0xFF;
    const INDEX_MASK: u32 = 0xFFFF;

    /// Pack a category and slot index
    pub const fn new(category: Category, index: u16) -> Self {
        Self(((category as u32) << Self::CATEGORY_SHIFT) | index as u32)
    }

    /// Rebuild an identifier from its raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw packed value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Owning manager category
    pub const fn category(self) -> Category {
        if !self.is_valid() {
            return Category::None;
        }
        Category::from_u8(((self.0 >> Self::CATEGORY_SHIFT) & Self::CATEGORY_MASK) as u8)
    }

    /// Slot index inside the owning manager
    pub const fn index(self) -> u16 {
        (self.0 & Self::INDEX_MASK) as u16
    }

    /// Slot index as a `usize`
    pub const fn slot(self) -> usize {
        self.index() as usize
    }

    /// Whether this is not [`Id::INVALID`]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Id({:?}:{})", self.category(), self.index())
        } else {
            f.write_str("Id(invalid)")
        }
    }
}

/// Next capacity for a growing slot table
///
/// Grows by at least `expand_size` and at least doubles, clamped to `max`.
pub(crate) fn grown_capacity(current: usize, expand_size: usize, max: usize) -> usize {
    current
        .saturating_add(expand_size.max(current).max(1))
        .min(max)
}

/// Index-only slot table for component managers
///
/// Slots carry no generation: managers pair a slot with the owning entity
/// handle wherever staleness matters.
#[derive(Debug, Clone)]
pub struct IdTable {
    category: Category,
    expand_size: usize,
    next_index: usize,
    used: Vec<bool>,
    free: Vec<u16>,
    len: usize,
}

impl IdTable {
    /// Create a table with `capacity` slots reserved
    pub fn new(category: Category, capacity: usize, expand_size: usize) -> Self {
        Self {
            category,
            expand_size: expand_size.max(1),
            next_index: 0,
            used: vec![false; capacity.min(MAX_COMPONENT_SLOTS)],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Allocate a slot
    ///
    /// When the table grows, [`IdTable::capacity`] changes and the owner must
    /// grow every array it keys by slot index.
    pub fn create(&mut self) -> EcsResult<Id> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            if self.next_index >= MAX_COMPONENT_SLOTS {
                log::warn!("{:?} component table is full", self.category);
                return Err(EcsError::CapacityExceeded { category: self.category });
            }
            if self.next_index >= self.used.len() {
                let capacity = grown_capacity(self.used.len(), self.expand_size, MAX_COMPONENT_SLOTS);
                log::debug!(
                    "Growing {:?} component table: {} -> {} slots",
                    self.category,
                    self.used.len(),
                    capacity
                );
                self.used.resize(capacity, false);
            }
            let index = self.next_index as u16;
            self.next_index += 1;
            index
        };

        self.used[index as usize] = true;
        self.len += 1;
        Ok(Id::new(self.category, index))
    }

    /// Release a slot; returns `false` if it was not allocated
    pub fn destroy(&mut self, id: Id) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.used[id.slot()] = false;
        self.free.push(id.index());
        self.len -= 1;
        true
    }

    /// Whether `id` names a live slot of this table
    pub fn contains(&self, id: Id) -> bool {
        id.category() == self.category
            && id.slot() < self.next_index
            && self.used[id.slot()]
    }

    /// Category stamped into every created id
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Number of slots currently backed by storage
    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    /// Number of live slots
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot is live
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ids of every live slot in index order
    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.used[..self.next_index]
            .iter()
            .enumerate()
            .filter(|(_, used)| **used)
            .map(move |(index, _)| Id::new(self.category, index as u16))
    }
}
