//! Entity-Component-System core
//!
//! Entities are handles. Each one is anchored in either the logical or the
//! geometric hierarchy and owns a short list of component ids. Structural
//! changes are buffered and applied once per frame by
//! [`EcsManager::post_update`].

pub mod behavior;
pub mod component;
pub mod entity;
pub mod entity_tree;
pub mod error;
pub mod geometric;
pub mod handle;
pub mod id;
pub mod id_buffer;
pub mod manager;
pub mod operation;
pub mod scene_element;
pub mod tree;
pub mod tree_manager;

#[cfg(test)]
mod tests;

pub use behavior::{Behavior, ComponentBehaviorManager, PassiveBehavior};
pub use component::{AsAny, ComponentManager, ExternalManager, SceneView};
pub use entity::{Entity, EntityFlags, EntityRegistry, LAYER_DEFAULT};
pub use error::{EcsError, EcsResult};
pub use geometric::{ComponentGeometric, ComponentGeometricManager};
pub use handle::{Handle, HandleTable};
pub use id::{Category, ComponentType, Id, IdTable};
pub use manager::EcsManager;
pub use scene_element::{Camera, ComponentSceneElementManager, Light, LightType, SceneElement};
pub use tree::{EcsNode, EcsTree};
pub use tree_manager::{ComponentLogical, ComponentLogicalManager, ComponentTreeManager, NameString, TreeComponent};
