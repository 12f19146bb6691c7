//! # Scene Engine
//!
//! The entity-component-system core of a real-time 3D framework.
//!
//! ## Features
//!
//! - **Handles and ids**: generation-tagged entity handles, category-tagged component ids
//! - **Scene graphs**: logical and geometric hierarchies stored as index arenas
//! - **Deferred mutation**: structural changes are queued and applied once per frame
//! - **Active flags**: update/render enablement propagated down each hierarchy
//! - **Transforms**: world matrices recomputed in one breadth-first pass
//! - **Behaviors**: per-entity scripts with access to the whole context
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! struct Spin;
//!
//! impl Behavior for Spin {
//!     fn update(&mut self, ecs: &mut EcsManager, entity: Entity) {
//!         if let Some(rotation) = ecs.rotation(entity) {
//!             let step = Quat::from_axis_angle(&Vec3::y_axis(), 0.01);
//!             ecs.set_rotation(entity, step * rotation);
//!         }
//!     }
//! }
//!
//! fn main() -> Result<(), EcsError> {
//!     let mut ecs = EcsManager::new(EcsConfig::default())?;
//!     let ship = ecs.request_create_geometric("ship")?;
//!     ecs.add_behavior(ship, Box::new(Spin))?;
//!
//!     for _ in 0..3 {
//!         ecs.update();
//!         ecs.post_update();
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::cast_possible_truncation)]

pub mod config;
pub mod ecs;
pub mod foundation;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, EcsConfig},
        ecs::{
            Behavior, Camera, Category, ComponentManager, ComponentType, EcsError, EcsManager, EcsResult, Entity,
            EntityFlags, ExternalManager, Id, Light, LightType, SceneView,
        },
        foundation::math::{Mat4, Quat, Transform, Vec3},
    };
}
