//! Generation-tagged handle table for entities
//!
//! A [`Handle`] packs a 16-bit slot index, a 15-bit generation and a live
//! bit. Destroying a handle frees its slot; the next handle created in that
//! slot carries a bumped generation, so stale copies stop validating.

use std::fmt;

use super::error::{EcsError, EcsResult};
use super::id::grown_capacity;

/// Highest number of slots a [`HandleTable`] can hold
pub const MAX_HANDLES: usize = 0x1_0000;

/// Packed generation-tagged handle
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(u32);

impl Handle {
    /// The null handle; never valid
    pub const NULL: Self = Self(0);

    /// Largest generation before wrapping back to 1
    pub const MAX_GENERATION: u32 = 0x7FFF;

    const INDEX_MASK: u32 = 0xFFFF;
    const GENERATION_SHIFT: u32 = 16;
    const LIVE_FLAG: u32 = 0x8000_0000;

    const fn live(index: u16, generation: u32) -> Self {
        Self(Self::LIVE_FLAG | (generation << Self::GENERATION_SHIFT) | index as u32)
    }

    /// Slot index
    pub const fn index(self) -> u16 {
        (self.0 & Self::INDEX_MASK) as u16
    }

    /// Generation counter
    pub const fn generation(self) -> u32 {
        (self.0 >> Self::GENERATION_SHIFT) & Self::MAX_GENERATION
    }

    /// Raw packed value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from its raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Whether this is the null handle
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    const fn retired(self) -> Self {
        Self(self.0 & !Self::LIVE_FLAG)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index(), self.generation())
    }
}

/// Slot allocator producing [`Handle`]s
#[derive(Debug, Clone)]
pub struct HandleTable {
    slots: Vec<Handle>,
    free: Vec<u16>,
    next_index: usize,
    expand_size: usize,
    len: usize,
}

impl HandleTable {
    /// Create a table with `capacity` slots reserved
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        Self {
            slots: vec![Handle::NULL; capacity.min(MAX_HANDLES)],
            free: Vec::new(),
            next_index: 0,
            expand_size: expand_size.max(1),
            len: 0,
        }
    }

    /// Allocate a handle, reusing the most recently freed slot first
    pub fn create(&mut self) -> EcsResult<Handle> {
        let handle = if let Some(index) = self.free.pop() {
            let previous = self.slots[index as usize].generation();
            let generation = if previous >= Handle::MAX_GENERATION { 1 } else { previous + 1 };
            Handle::live(index, generation)
        } else {
            if self.next_index >= MAX_HANDLES {
                log::warn!("Entity handle table is full");
                return Err(EcsError::EntityCapacityExceeded);
            }
            if self.next_index >= self.slots.len() {
                let capacity = grown_capacity(self.slots.len(), self.expand_size, MAX_HANDLES);
                log::debug!("Growing entity handle table: {} -> {} slots", self.slots.len(), capacity);
                self.slots.resize(capacity, Handle::NULL);
            }
            let index = self.next_index as u16;
            self.next_index += 1;
            Handle::live(index, 1)
        };

        self.slots[handle.index() as usize] = handle;
        self.len += 1;
        Ok(handle)
    }

    /// Invalidate a handle; returns `false` if it was already stale
    pub fn destroy(&mut self, handle: Handle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let index = handle.index();
        self.slots[index as usize] = handle.retired();
        self.free.push(index);
        self.len -= 1;
        true
    }

    /// Whether `handle` is the current occupant of its slot
    pub fn is_valid(&self, handle: Handle) -> bool {
        let index = handle.index() as usize;
        !handle.is_null() && index < self.next_index && self.slots[index] == handle
    }

    /// Number of slots currently backed by storage
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live handles
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no handle is live
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_handles_are_unique() {
        let mut table = HandleTable::new(4, 4);
        let handles: Vec<_> = (0..100).map(|_| table.create().unwrap()).collect();
        let unique: HashSet<_> = handles.iter().copied().collect();

        assert_eq!(unique.len(), handles.len());
        assert!(handles.iter().all(|h| table.is_valid(*h)));
        assert!(table.capacity() >= 100);
    }

    #[test]
    fn test_reused_slot_bumps_generation() {
        let mut table = HandleTable::new(4, 4);
        let first = table.create().unwrap();
        assert!(table.destroy(first));

        let second = table.create().unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!table.is_valid(first));
        assert!(table.is_valid(second));
    }

    #[test]
    fn test_double_destroy_is_rejected() {
        let mut table = HandleTable::new(1, 1);
        let handle = table.create().unwrap();
        assert!(table.destroy(handle));
        assert!(!table.destroy(handle));
        assert!(table.is_empty());
    }

    #[test]
    fn test_generation_wraps_to_one() {
        let mut table = HandleTable::new(1, 1);
        let mut handle = table.create().unwrap();
        for _ in 0..Handle::MAX_GENERATION {
            table.destroy(handle);
            handle = table.create().unwrap();
        }
        assert_eq!(handle.generation(), 1);
        assert!(table.is_valid(handle));
    }

    #[test]
    fn test_null_and_out_of_range_are_invalid() {
        let table = HandleTable::new(8, 8);
        assert!(!table.is_valid(Handle::NULL));
        assert!(!table.is_valid(Handle::from_raw(0x8001_0005)));
    }
}
