//! Scene demo
//!
//! Builds a small solar-system hierarchy procedurally, steps the frame
//! cycle, and destroys one planet with its moons halfway through.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use rand::Rng;
use scene_engine::ecs::PassiveBehavior;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;

const FRAMES: usize = 120;
const PLANETS: usize = 6;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error("ECS error: {0}")]
    Ecs(#[from] EcsError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Rotates its entity around the local Y axis every frame
struct Spin {
    speed: f32,
}

impl Behavior for Spin {
    fn on_start(&mut self, ecs: &mut EcsManager, entity: Entity) {
        log::debug!("{} '{}' starts spinning at {:.3} rad/frame", entity, ecs.name(entity).unwrap_or(""), self.speed);
    }

    fn update(&mut self, ecs: &mut EcsManager, entity: Entity) {
        if let Some(rotation) = ecs.rotation(entity) {
            let step = Quat::from_axis_angle(&Vec3::y_axis(), self.speed);
            ecs.set_rotation(entity, rotation * step);
        }
    }
}

/// Keeps the camera aimed at the origin
struct Tracker;

impl Behavior for Tracker {
    fn update(&mut self, ecs: &mut EcsManager, entity: Entity) {
        ecs.look_at(entity, &Vec3::zeros(), &Vec3::y());
    }
}

/// Renderer stand-in that collects a draw list after every post-update
#[derive(Default)]
struct DrawList {
    components: Vec<(Id, Entity)>,
    next_index: u16,
    visible: Vec<Vec3>,
}

impl ComponentManager for DrawList {
    fn category(&self) -> Category {
        Category::Renderer
    }

    fn destroy(&mut self, id: Id) {
        self.components.retain(|(live, _)| *live != id);
    }

    fn len(&self) -> usize {
        self.components.len()
    }
}

impl ExternalManager for DrawList {
    fn create(&mut self, entity: Entity, _component_type: ComponentType) -> EcsResult<Id> {
        let id = Id::new(Category::Renderer, self.next_index);
        self.next_index = self.next_index.wrapping_add(1);
        self.components.push((id, entity));
        Ok(id)
    }

    fn component_type(&self, id: Id) -> Option<ComponentType> {
        self.components
            .iter()
            .any(|(live, _)| *live == id)
            .then_some(ComponentType::Renderer)
    }

    fn post_update_components(&mut self, scene: &SceneView<'_>) {
        // Parents before children, the order a renderer batches in
        self.visible.clear();
        for entity in scene.geometric_entities() {
            if !scene.check_flag(*entity, EntityFlags::RENDER)
                || !self.components.iter().any(|(_, owner)| owner == entity)
            {
                continue;
            }
            if let Some(world) = scene.world_matrix(*entity) {
                self.visible.push(Vec3::new(world.m14, world.m24, world.m34));
            }
        }
    }
}

fn load_config() -> Result<EcsConfig, DemoError> {
    let config = match std::env::args().nth(1) {
        Some(path) => EcsConfig::load_from_file(path)?,
        None => EcsConfig::default().with_entity_capacity(64).with_component_capacity(64),
    };
    config.validate()?;
    Ok(config)
}

fn build_scene(ecs: &mut EcsManager) -> Result<Vec<Entity>, DemoError> {
    let mut rng = rand::thread_rng();

    let sun = ecs.request_create_geometric("sun")?;
    ecs.add_behavior(sun, Box::new(Spin { speed: 0.01 }))?;
    ecs.add_component(sun, Category::Renderer, ComponentType::Renderer, None)?;

    let mut planets = Vec::with_capacity(PLANETS);
    for i in 0..PLANETS {
        let planet = ecs.request_create_geometric(&format!("planet{i}"))?;
        ecs.set_parent(planet, Some(sun));
        ecs.set_position(planet, Vec3::new(rng.gen_range(3.0..12.0), 0.0, 0.0));
        ecs.add_behavior(planet, Box::new(Spin { speed: rng.gen_range(0.02..0.08) }))?;
        ecs.add_component(planet, Category::Renderer, ComponentType::Renderer, None)?;

        for j in 0..rng.gen_range(0..3) {
            let moon = ecs.request_create_geometric(&format!("moon{j}"))?;
            ecs.set_parent(moon, Some(planet));
            ecs.set_position(moon, Vec3::new(0.0, 0.0, rng.gen_range(0.5..1.5)));
            ecs.set_scale(moon, Vec3::repeat(0.3));
            ecs.add_component(moon, Category::Renderer, ComponentType::Renderer, None)?;
        }
        planets.push(planet);
    }

    let camera = ecs.request_create_geometric("camera")?;
    ecs.set_position(camera, Vec3::new(0.0, 10.0, 25.0));
    ecs.add_camera(camera, Camera::default(), Box::new(Tracker))?;

    let sunlight = ecs.request_create_geometric("sunlight")?;
    ecs.look_at(sunlight, &Vec3::new(-1.0, -1.0, -0.5), &Vec3::y());
    ecs.add_light(sunlight, Light::directional(Vec3::new(1.0, 0.95, 0.9), 1.5), Box::new(PassiveBehavior))?;

    let hud = ecs.request_create_logical("hud")?;
    ecs.set_layer(hud, 1 << 4);

    Ok(planets)
}

fn run() -> Result<(), DemoError> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);

    let mut ecs = EcsManager::new(config)?;
    ecs.register_manager(Box::new(DrawList::default()))?;
    let planets = build_scene(&mut ecs)?;
    log::info!("Scene built with {} entities", ecs.num_entities());

    for frame in 0..FRAMES {
        if frame == FRAMES / 2 {
            let doomed = planets[0];
            log::info!("Destroying '{}' and its moons", ecs.name(doomed).unwrap_or(""));
            ecs.request_destroy(doomed);
        }
        if frame == FRAMES / 4 {
            // Hide the last planet; its moons follow
            ecs.reset_flag(planets[PLANETS - 1], EntityFlags::RENDER_SELF);
        }

        ecs.update();
        ecs.post_update();

        if frame % 30 == 0 || frame == FRAMES / 2 {
            let visible = ecs
                .external_manager::<DrawList>(Category::Renderer)
                .map_or(0, |draw_list| draw_list.visible.len());
            log::info!(
                "Frame {:3}: {} entities, {} visible, {} updating",
                frame,
                ecs.num_entities(),
                visible,
                ecs.active_geometric(EntityFlags::UPDATE).count()
            );
        }
    }

    let elements = ecs.scene_element_manager();
    if let Some(camera) = elements.cameras().first().and_then(|id| elements.camera(*id)) {
        log::info!("Camera eye at {:?}", camera.eye_position());
    }

    ecs.terminate();
    log::info!("Demo finished");
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        log::error!("{}", error);
        eprintln!("scene_demo: {error}");
        std::process::exit(1);
    }
}
