//! Size-classed storage for per-entity component id lists
//!
//! Buffers are handed out in blocks of [`IDS_PER_BLOCK`] ids. Released
//! buffers go back to a free list for their size class, so entities that
//! churn through components do not hit the global allocator every frame.

use slotmap::{new_key_type, SlotMap};

use super::id::Id;

new_key_type! {
    /// Key of a buffer owned by an [`IdBufferAllocator`]
    pub struct IdBufferKey;
}

/// Number of ids per allocation block
pub const IDS_PER_BLOCK: usize = 4;

/// Buffers up to this many blocks are recycled; larger ones are freed
const RECYCLED_CLASSES: usize = 8;

/// Pool of component id buffers
#[derive(Debug, Default)]
pub struct IdBufferAllocator {
    buffers: SlotMap<IdBufferKey, Box<[Id]>>,
    free: [Vec<IdBufferKey>; RECYCLED_CLASSES],
}

impl IdBufferAllocator {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a buffer of `blocks * IDS_PER_BLOCK` ids, all invalid
    pub fn allocate(&mut self, blocks: usize) -> IdBufferKey {
        let blocks = blocks.max(1);
        if let Some(key) = self.free.get_mut(blocks - 1).and_then(Vec::pop) {
            if let Some(buffer) = self.buffers.get_mut(key) {
                buffer.fill(Id::INVALID);
                return key;
            }
        }
        self.buffers
            .insert(vec![Id::INVALID; blocks * IDS_PER_BLOCK].into_boxed_slice())
    }

    /// Return a buffer to the pool
    pub fn release(&mut self, key: IdBufferKey) {
        let Some(buffer) = self.buffers.get(key) else {
            log::warn!("Released an unknown id buffer");
            return;
        };
        let class = buffer.len() / IDS_PER_BLOCK - 1;
        if class < RECYCLED_CLASSES {
            debug_assert!(!self.free[class].contains(&key), "id buffer released twice");
            self.free[class].push(key);
        } else {
            self.buffers.remove(key);
        }
    }

    /// Read a buffer; unknown keys read as empty
    pub fn get(&self, key: IdBufferKey) -> &[Id] {
        self.buffers.get(key).map(|buffer| &buffer[..]).unwrap_or(&[])
    }

    /// Write access to a buffer
    pub fn get_mut(&mut self, key: IdBufferKey) -> Option<&mut [Id]> {
        self.buffers.get_mut(key).map(|buffer| &mut buffer[..])
    }

    /// Buffers currently handed out
    pub fn live_buffers(&self) -> usize {
        self.buffers.len() - self.pooled_buffers()
    }

    /// Buffers waiting in the free lists
    pub fn pooled_buffers(&self) -> usize {
        self.free.iter().map(Vec::len).sum()
    }
}
