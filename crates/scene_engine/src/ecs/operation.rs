//! Deferred structural mutations
//!
//! Requests made while a frame is running are buffered here and applied
//! once, in the next post-update.

use super::entity::Entity;
use super::id::Id;

/// Tree-level operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Creation marker; the node already exists when this is queued
    Create,
    /// Destroy the node, its subtree and the owning entities
    Destroy,
}

/// Queued operation on an anchor component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// What to do
    pub kind: OperationType,
    /// Anchor component the operation targets
    pub id: Id,
    /// Entity that owned the anchor when the operation was queued
    pub entity: Entity,
}

/// Component-list operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOperationType {
    /// Link the component into the entity's list
    Add,
    /// Destroy the component and unlink it
    Destroy,
}

/// Queued change to an entity's component list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentOperation {
    /// What to do
    pub kind: ComponentOperationType,
    /// Entity whose list changes
    pub entity: Entity,
    /// Component being linked or destroyed
    pub id: Id,
}
