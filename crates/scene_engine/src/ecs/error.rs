//! ECS error types

use crate::config::ConfigError;

use super::entity::Entity;
use super::id::{Category, ComponentType};

/// Errors surfaced by the ECS core
///
/// Only recoverable conditions live here. Misuse such as touching a
/// destroyed slot is caught by debug assertions instead.
#[derive(thiserror::Error, Debug)]
pub enum EcsError {
    /// A component slot table reached its index ceiling
    #[error("Component capacity exceeded for category {category:?}")]
    CapacityExceeded {
        /// Category whose manager is full
        category: Category,
    },

    /// The entity handle table reached its index ceiling
    #[error("Entity capacity exceeded")]
    EntityCapacityExceeded,

    /// The entity handle is stale or null
    #[error("Invalid entity: {0}")]
    InvalidEntity(Entity),

    /// A manager cannot create the requested component type
    #[error("Component type {component_type:?} is not supported by category {category:?}")]
    InvalidComponentType {
        /// Target category
        category: Category,
        /// Requested type
        component_type: ComponentType,
    },

    /// No manager is registered for the category
    #[error("No component manager registered for category {0:?}")]
    MissingManager(Category),

    /// The category cannot be served by an external manager
    #[error("Category {0:?} cannot be registered as an external manager")]
    UnsupportedCategory(Category),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for ECS operations
pub type EcsResult<T> = Result<T, EcsError>;
