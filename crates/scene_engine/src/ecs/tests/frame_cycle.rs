use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use approx::assert_relative_eq;

use super::{ecs, frame, spawn};
use crate::config::EcsConfig;
use crate::ecs::{
    Behavior, Camera, Category, ComponentType, EcsManager, Entity, EntityFlags, Light, PassiveBehavior,
};
use crate::foundation::math::{Quat, Vec3};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

struct Probe {
    name: &'static str,
    log: Log,
}

impl Probe {
    fn boxed(name: &'static str, log: &Log) -> Box<Self> {
        Box::new(Self { name, log: log.clone() })
    }
}

impl Behavior for Probe {
    fn on_start(&mut self, _ecs: &mut EcsManager, _entity: Entity) {
        self.log.borrow_mut().push(format!("start {}", self.name));
    }

    fn update(&mut self, _ecs: &mut EcsManager, _entity: Entity) {
        self.log.borrow_mut().push(format!("update {}", self.name));
    }

    fn on_destroy(&mut self, _entity: Entity) {
        self.log.borrow_mut().push(format!("destroy {}", self.name));
    }
}

#[derive(Default)]
struct Counter {
    count: u32,
}

impl Behavior for Counter {
    fn update(&mut self, _ecs: &mut EcsManager, _entity: Entity) {
        self.count += 1;
    }

    fn component_type(&self) -> ComponentType {
        ComponentType::User(42)
    }
}

#[test]
fn test_handles_unique_and_reuse_detected() {
    let mut ecs = ecs();
    let entities: Vec<_> = (0..40)
        .map(|i| ecs.request_create_logical(&format!("e{i}")).unwrap())
        .collect();
    let unique: HashSet<_> = entities.iter().copied().collect();
    assert_eq!(unique.len(), entities.len());

    let first = entities[0];
    assert!(ecs.destroy_entity(first));
    assert!(!ecs.destroy_entity(first));

    let reused = ecs.request_create_logical("again").unwrap();
    assert_eq!(reused.index(), first.index());
    assert_ne!(reused, first);
    assert!(!ecs.is_valid_entity(first));
    assert!(ecs.is_valid_entity(reused));
}

#[test]
fn test_subtree_destroy_is_deferred_and_complete() {
    let mut ecs = ecs();
    let events = log();
    let root = spawn(&mut ecs, "root", None);
    let survivor = spawn(&mut ecs, "survivor", None);
    let mut subtree = vec![root];
    for i in 0..10 {
        let child = spawn(&mut ecs, &format!("child{i}"), Some(root));
        subtree.push(child);
        for j in 0..3 {
            subtree.push(spawn(&mut ecs, &format!("leaf{j}"), Some(child)));
        }
    }
    ecs.add_behavior(subtree[5], Probe::boxed("leaf", &events)).unwrap();
    frame(&mut ecs);
    assert_eq!(ecs.num_entities(), 42);

    ecs.request_destroy(root);
    ecs.update();
    assert!(subtree.iter().all(|e| ecs.is_valid_entity(*e)));

    ecs.post_update();
    assert!(subtree.iter().all(|e| !ecs.is_valid_entity(*e)));
    assert!(ecs.is_valid_entity(survivor));
    assert_eq!(ecs.num_entities(), 1);
    assert_eq!(ecs.geometric_manager().tree().process_order(), &[survivor]);
    assert_eq!(events.borrow().last().map(String::as_str), Some("destroy leaf"));
    assert!(ecs.behavior_manager().slots().is_empty());

    // Destroying again is a silent no-op
    ecs.request_destroy(root);
    frame(&mut ecs);
    assert_eq!(ecs.num_entities(), 1);
}

struct Spawner {
    target: Entity,
    spawned: Rc<RefCell<Vec<Entity>>>,
}

impl Behavior for Spawner {
    fn update(&mut self, ecs: &mut EcsManager, entity: Entity) {
        if !self.spawned.borrow().is_empty() {
            return;
        }
        let child = ecs.request_create_geometric("spawned").unwrap();
        ecs.set_parent(child, Some(entity));
        ecs.request_destroy(self.target);
        self.spawned.borrow_mut().push(child);
    }
}

#[test]
fn test_requests_during_update_apply_in_post_update() {
    let mut ecs = ecs();
    let spawned = Rc::new(RefCell::new(Vec::new()));
    let host = spawn(&mut ecs, "host", None);
    let target = spawn(&mut ecs, "target", None);
    ecs.add_behavior(host, Box::new(Spawner { target, spawned: spawned.clone() })).unwrap();
    frame(&mut ecs);

    ecs.update();
    let child = spawned.borrow()[0];
    assert!(ecs.is_valid_entity(child));
    assert!(ecs.is_valid_entity(target));
    assert!(!ecs.geometric_manager().tree().process_order().contains(&child));

    ecs.post_update();
    assert!(!ecs.is_valid_entity(target));
    assert_eq!(ecs.geometric_manager().tree().process_order(), &[host, child]);
    assert_eq!(ecs.parent(child), Some(host));

    // Only one spawn in total
    frame(&mut ecs);
    assert_eq!(spawned.borrow().len(), 1);
}

#[test]
fn test_update_flag_gates_behaviors_down_the_tree() {
    let mut ecs = ecs();
    let events = log();
    let parent = spawn(&mut ecs, "parent", None);
    let child = spawn(&mut ecs, "child", Some(parent));
    ecs.add_behavior(parent, Probe::boxed("p", &events)).unwrap();
    ecs.add_behavior(child, Probe::boxed("c", &events)).unwrap();

    // First frame only links the behaviors and builds the order
    frame(&mut ecs);
    assert!(events.borrow().is_empty());

    frame(&mut ecs);
    frame(&mut ecs);
    assert_eq!(
        *events.borrow(),
        vec!["start p", "update p", "start c", "update c", "update p", "update c"]
    );

    // The computed flag changes on the next post-update, so this frame still runs
    ecs.reset_flag(parent, EntityFlags::UPDATE_SELF);
    frame(&mut ecs);
    assert_eq!(events.borrow().len(), 8);
    assert!(!ecs.check_flag(parent, EntityFlags::UPDATE));
    assert!(!ecs.check_flag(child, EntityFlags::UPDATE));
    assert!(ecs.check_flag(child, EntityFlags::UPDATE_SELF));
    assert!(ecs.check_flag(child, EntityFlags::RENDER));

    frame(&mut ecs);
    assert_eq!(events.borrow().len(), 8);

    ecs.set_flag(parent, EntityFlags::UPDATE_SELF);
    frame(&mut ecs);
    frame(&mut ecs);
    assert_eq!(events.borrow()[8..], ["update p", "update c"]);
}

struct SelfDestruct {
    log: Log,
}

impl Behavior for SelfDestruct {
    fn update(&mut self, ecs: &mut EcsManager, entity: Entity) {
        self.log.borrow_mut().push("update".to_string());
        ecs.destroy_entity(entity);
    }

    fn on_destroy(&mut self, _entity: Entity) {
        self.log.borrow_mut().push("destroy".to_string());
    }
}

#[test]
fn test_behavior_destroying_its_own_entity() {
    let mut ecs = ecs();
    let events = log();
    let doomed = spawn(&mut ecs, "doomed", None);
    let orphan = spawn(&mut ecs, "orphan", Some(doomed));
    ecs.add_behavior(doomed, Box::new(SelfDestruct { log: events.clone() })).unwrap();
    frame(&mut ecs);

    frame(&mut ecs);
    assert_eq!(*events.borrow(), vec!["update", "destroy"]);
    assert!(!ecs.is_valid_entity(doomed));
    assert!(ecs.is_valid_entity(orphan));
    assert_eq!(ecs.parent(orphan), None);
    assert_eq!(ecs.geometric_manager().tree().process_order(), &[orphan]);
}

#[test]
fn test_add_to_entity_destroyed_before_post_update() {
    let mut ecs = ecs();
    let events = log();
    let entity = spawn(&mut ecs, "short", None);
    ecs.add_behavior(entity, Probe::boxed("late", &events)).unwrap();
    assert!(ecs.destroy_entity(entity));

    ecs.post_update();
    assert_eq!(*events.borrow(), vec!["destroy late"]);
    assert!(ecs.behavior_manager().slots().is_empty());
}

#[test]
fn test_remove_component_destroys_after_post_update() {
    let mut ecs = ecs();
    let events = log();
    let entity = spawn(&mut ecs, "e", None);
    let id = ecs.add_behavior(entity, Probe::boxed("b", &events)).unwrap();
    frame(&mut ecs);
    assert_eq!(ecs.components(entity).len(), 2);

    assert!(ecs.remove_component(entity, id));
    assert!(events.borrow().is_empty());
    ecs.post_update();
    assert_eq!(*events.borrow(), vec!["destroy b"]);
    assert_eq!(ecs.components(entity).len(), 1);
}

#[test]
fn test_add_then_remove_in_same_frame_cancels() {
    let mut ecs = ecs();
    let events = log();
    let entity = spawn(&mut ecs, "e", None);
    let id = ecs.add_behavior(entity, Probe::boxed("brief", &events)).unwrap();
    assert!(ecs.remove_component(entity, id));

    frame(&mut ecs);
    assert_eq!(*events.borrow(), vec!["destroy brief"]);
    assert_eq!(ecs.components(entity).len(), 1);
    assert!(ecs.behavior_manager().slots().is_empty());

    // Unknown ids are still refused
    assert!(!ecs.remove_component(entity, id));
}

#[test]
fn test_table_growth_keeps_behaviors_ticking() {
    let config = EcsConfig::new()
        .with_entity_capacity(2)
        .with_component_capacity(2)
        .with_expand_sizes(2, 2);
    let mut ecs = EcsManager::new(config).unwrap();
    let a = spawn(&mut ecs, "a", None);
    let b = spawn(&mut ecs, "b", Some(a));
    ecs.add_behavior(a, Box::<Counter>::default()).unwrap();
    ecs.add_behavior(b, Box::<Counter>::default()).unwrap();
    frame(&mut ecs);
    frame(&mut ecs);
    assert_eq!(ecs.behavior::<Counter>(a).map(|c| c.count), Some(1));

    // Third geometric slot forces every tree array to grow
    spawn(&mut ecs, "c", None);
    assert!(ecs.geometric_manager().tree().capacity() > 2);
    assert_eq!(ecs.geometric_manager().tree().process_order(), &[a, b]);
    assert_eq!(ecs.active_geometric(EntityFlags::UPDATE).count(), 2);

    frame(&mut ecs);
    assert_eq!(ecs.behavior::<Counter>(a).map(|c| c.count), Some(2));
    assert_eq!(ecs.behavior::<Counter>(b).map(|c| c.count), Some(2));
    assert_eq!(ecs.geometric_manager().tree().process_order().len(), 3);
}

#[test]
fn test_behavior_lookup_by_type() {
    let mut ecs = ecs();
    let entity = spawn(&mut ecs, "counted", None);
    let id = ecs.add_behavior(entity, Box::<Counter>::default()).unwrap();
    frame(&mut ecs);
    frame(&mut ecs);
    frame(&mut ecs);

    assert_eq!(ecs.behavior::<Counter>(entity).map(|c| c.count), Some(2));
    assert!(ecs.behavior::<Probe>(entity).is_none());
    assert_eq!(ecs.get_component(entity, Category::Behavior, ComponentType::User(42)), Some(id));
    assert_eq!(ecs.component_type(id), Some(ComponentType::User(42)));

    ecs.behavior_mut::<Counter>(entity).unwrap().count = 10;
    frame(&mut ecs);
    assert_eq!(ecs.behavior::<Counter>(entity).map(|c| c.count), Some(11));
}

#[test]
fn test_scene_elements_follow_geometric_anchor() {
    let mut ecs = ecs();
    let rig = spawn(&mut ecs, "rig", None);
    let camera = spawn(&mut ecs, "camera", Some(rig));
    let lamp = spawn(&mut ecs, "lamp", None);
    ecs.set_position(rig, Vec3::new(0.0, 2.0, 0.0));
    ecs.set_position(camera, Vec3::new(0.0, 0.0, 10.0));
    ecs.set_position(lamp, Vec3::new(4.0, 0.0, 0.0));
    ecs.set_rotation(lamp, Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2));

    let camera_id = ecs.add_camera(camera, Camera::default(), Box::new(PassiveBehavior)).unwrap();
    let light_id = ecs.add_light(lamp, Light::default(), Box::new(PassiveBehavior)).unwrap();
    frame(&mut ecs);

    assert_eq!(
        ecs.get_component(camera, Category::SceneElement, ComponentType::Camera),
        Some(camera_id)
    );
    let elements = ecs.scene_element_manager();
    let eye = *elements.camera(camera_id).unwrap().eye_position();
    assert_relative_eq!(eye, Vec3::new(0.0, 2.0, 10.0), epsilon = 1.0e-5);

    let light = elements.light(light_id).unwrap();
    assert_relative_eq!(*light.position(), Vec3::new(4.0, 0.0, 0.0), epsilon = 1.0e-5);
    // -Z turned a quarter around +Y points down -X
    assert_relative_eq!(*light.direction(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1.0e-5);

    ecs.request_destroy(rig);
    frame(&mut ecs);
    assert!(ecs.scene_element_manager().cameras().is_empty());
    assert_eq!(ecs.scene_element_manager().lights(), &[light_id]);
}

#[test]
fn test_active_geometric_filters_by_flag() {
    let mut ecs = ecs();
    let a = spawn(&mut ecs, "a", None);
    let b = spawn(&mut ecs, "b", Some(a));
    let c = spawn(&mut ecs, "c", None);
    ecs.reset_flag(a, EntityFlags::RENDER_SELF);
    frame(&mut ecs);

    let rendered: Vec<_> = ecs.active_geometric(EntityFlags::RENDER).map(|(e, _)| e).collect();
    assert_eq!(rendered, vec![c]);

    let updated: Vec<_> = ecs.active_geometric(EntityFlags::UPDATE).map(|(e, _)| e).collect();
    assert_eq!(updated, vec![a, c, b]);
}

#[test]
fn test_drop_terminates_behaviors() {
    let events = log();
    {
        let mut ecs = ecs();
        let entity = spawn(&mut ecs, "e", None);
        ecs.add_behavior(entity, Probe::boxed("last", &events)).unwrap();
        frame(&mut ecs);
    }
    assert_eq!(events.borrow().last().map(String::as_str), Some("destroy last"));
}
