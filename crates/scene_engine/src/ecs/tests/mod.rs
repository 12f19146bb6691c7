//! Scenario tests driving the whole frame cycle

mod frame_cycle;

use crate::config::EcsConfig;
use crate::ecs::{EcsManager, Entity};

fn ecs() -> EcsManager {
    let config = EcsConfig::new()
        .with_entity_capacity(16)
        .with_component_capacity(16)
        .with_expand_sizes(16, 16);
    EcsManager::new(config).unwrap()
}

fn frame(ecs: &mut EcsManager) {
    ecs.update();
    ecs.post_update();
}

/// Geometric entity named `name`, optionally under `parent`
fn spawn(ecs: &mut EcsManager, name: &str, parent: Option<Entity>) -> Entity {
    let entity = ecs.request_create_geometric(name).unwrap();
    if parent.is_some() {
        assert!(ecs.set_parent(entity, parent));
    }
    entity
}
