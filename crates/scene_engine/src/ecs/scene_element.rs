//! Cameras and lights
//!
//! Scene elements are placed by their entity's geometric anchor. After world
//! matrices are updated each frame, [`ComponentSceneElementManager::post_update_components`]
//! pulls the fresh transform into every camera and light.

use log::warn;

use crate::foundation::math::{perspective, view_from_world, Mat4, Vec3};

use super::behavior::{Behavior, BehaviorSlots};
use super::component::{ComponentManager, SceneView};
use super::entity::Entity;
use super::error::{EcsError, EcsResult};
use super::id::{Category, ComponentType, Id};

/// Perspective camera driven by a world transform
///
/// View space is right-handed with the camera looking down -Z.
#[derive(Debug, Clone)]
pub struct Camera {
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    sort_layer: i32,
    view: Mat4,
    inverse_view: Mat4,
    projection: Mat4,
    eye_position: Vec3,
}

impl Camera {
    /// Create a perspective camera; `fov_y` is in radians
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            aspect,
            near,
            far,
            sort_layer: 0,
            view: Mat4::identity(),
            inverse_view: Mat4::identity(),
            projection: perspective(fov_y, aspect, near, far),
            eye_position: Vec3::zeros(),
        }
    }

    /// Change the projection parameters
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.projection = perspective(fov_y, aspect, near, far);
    }

    /// Change only the aspect ratio, e.g. after a resize
    pub fn set_aspect(&mut self, aspect: f32) {
        self.set_perspective(self.fov_y, aspect, self.near, self.far);
    }

    /// Vertical field of view in radians
    pub const fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Width over height
    pub const fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Near clip distance
    pub const fn near(&self) -> f32 {
        self.near
    }

    /// Far clip distance
    pub const fn far(&self) -> f32 {
        self.far
    }

    /// Cameras render in ascending sort layer
    pub const fn sort_layer(&self) -> i32 {
        self.sort_layer
    }

    /// Set the sort layer
    pub fn set_sort_layer(&mut self, sort_layer: i32) {
        self.sort_layer = sort_layer;
    }

    /// World to view
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View to world
    pub const fn inverse_view(&self) -> &Mat4 {
        &self.inverse_view
    }

    /// View to clip
    pub const fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// World to clip
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Camera position in world space
    pub const fn eye_position(&self) -> &Vec3 {
        &self.eye_position
    }

    /// Refresh the view from the camera's world matrix
    pub fn update_from_world(&mut self, world: &Mat4) {
        let (view, inverse_view) = view_from_world(world);
        self.view = view;
        self.inverse_view = inverse_view;
        self.eye_position = Vec3::new(inverse_view.m14, inverse_view.m24, inverse_view.m34);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// Kind of light source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Parallel rays along the light's forward axis
    Directional,
    /// Radiates from the light's position
    Point,
}

/// Light source driven by a world transform
#[derive(Debug, Clone)]
pub struct Light {
    /// Directional or point
    pub light_type: LightType,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Falloff distance for point lights
    pub range: f32,
    /// Whether the light contributes at all
    pub enabled: bool,
    position: Vec3,
    direction: Vec3,
}

impl Light {
    /// Directional light
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            intensity,
            range: 0.0,
            enabled: true,
            position: Vec3::zeros(),
            direction: -Vec3::z(),
        }
    }

    /// Point light
    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            intensity,
            range,
            enabled: true,
            position: Vec3::zeros(),
            direction: -Vec3::z(),
        }
    }

    /// World position as of the last post-update
    pub const fn position(&self) -> &Vec3 {
        &self.position
    }

    /// World forward direction (local -Z) as of the last post-update
    pub const fn direction(&self) -> &Vec3 {
        &self.direction
    }

    /// Refresh position and direction from the light's world matrix
    pub fn update_from_world(&mut self, world: &Mat4) {
        self.position = Vec3::new(world.m14, world.m24, world.m34);
        let forward = world.fixed_view::<3, 3>(0, 0) * -Vec3::z();
        self.direction = forward.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z());
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::repeat(1.0), 1.0)
    }
}

/// Data carried by a scene-element component
#[derive(Debug, Clone)]
pub enum SceneElement {
    /// A camera
    Camera(Camera),
    /// A light
    Light(Light),
}

impl SceneElement {
    /// Component type of the element
    pub const fn component_type(&self) -> ComponentType {
        match self {
            Self::Camera(_) => ComponentType::Camera,
            Self::Light(_) => ComponentType::Light,
        }
    }

    fn update_from_world(&mut self, world: &Mat4) {
        match self {
            Self::Camera(camera) => camera.update_from_world(world),
            Self::Light(light) => light.update_from_world(world),
        }
    }
}

/// Manager of cameras and lights
#[derive(Debug)]
pub struct ComponentSceneElementManager {
    slots: BehaviorSlots,
    elements: Vec<Option<SceneElement>>,
    cameras: Vec<Id>,
    lights: Vec<Id>,
}

impl ComponentSceneElementManager {
    /// Create a manager with `capacity` slots
    pub fn new(capacity: usize, expand_size: usize) -> Self {
        let slots = BehaviorSlots::new(Category::SceneElement, capacity, expand_size);
        let capacity = slots.capacity();
        Self {
            slots,
            elements: std::iter::repeat_with(|| None).take(capacity).collect(),
            cameras: Vec::new(),
            lights: Vec::new(),
        }
    }

    /// Create a default camera or light
    pub fn create(
        &mut self,
        entity: Entity,
        component_type: ComponentType,
        behavior: Box<dyn Behavior>,
    ) -> EcsResult<Id> {
        let element = match component_type {
            ComponentType::Camera => SceneElement::Camera(Camera::default()),
            ComponentType::Light => SceneElement::Light(Light::default()),
            other => {
                warn!("Scene elements are cameras or lights, not {:?}", other);
                return Err(EcsError::InvalidComponentType {
                    category: Category::SceneElement,
                    component_type: other,
                });
            }
        };
        self.insert(entity, element, behavior)
    }

    /// Create a camera
    pub fn create_camera(&mut self, entity: Entity, camera: Camera, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.insert(entity, SceneElement::Camera(camera), behavior)
    }

    /// Create a light
    pub fn create_light(&mut self, entity: Entity, light: Light, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        self.insert(entity, SceneElement::Light(light), behavior)
    }

    fn insert(&mut self, entity: Entity, element: SceneElement, behavior: Box<dyn Behavior>) -> EcsResult<Id> {
        let id = self.slots.create(entity, behavior)?;
        if self.elements.len() < self.slots.capacity() {
            self.elements.resize_with(self.slots.capacity(), || None);
        }
        match element {
            SceneElement::Camera(_) => self.cameras.push(id),
            SceneElement::Light(_) => self.lights.push(id),
        }
        self.elements[id.slot()] = Some(element);
        Ok(id)
    }

    /// Destroy a camera or light
    pub fn destroy(&mut self, id: Id) -> bool {
        if !self.slots.destroy(id) {
            return false;
        }
        match self.elements[id.slot()].take() {
            Some(SceneElement::Camera(_)) => self.cameras.retain(|camera| *camera != id),
            Some(SceneElement::Light(_)) => self.lights.retain(|light| *light != id),
            None => {}
        }
        true
    }

    /// Behavior slots
    pub const fn slots(&self) -> &BehaviorSlots {
        &self.slots
    }

    /// Behavior slots, mutable
    pub fn slots_mut(&mut self) -> &mut BehaviorSlots {
        &mut self.slots
    }

    /// Element data
    pub fn element(&self, id: Id) -> Option<&SceneElement> {
        if !self.slots.contains(id) {
            return None;
        }
        self.elements[id.slot()].as_ref()
    }

    /// Camera or light type of a live element
    pub fn component_type(&self, id: Id) -> Option<ComponentType> {
        self.element(id).map(SceneElement::component_type)
    }

    /// Camera data
    pub fn camera(&self, id: Id) -> Option<&Camera> {
        match self.element(id)? {
            SceneElement::Camera(camera) => Some(camera),
            SceneElement::Light(_) => None,
        }
    }

    /// Camera data, mutable
    pub fn camera_mut(&mut self, id: Id) -> Option<&mut Camera> {
        if !self.slots.contains(id) {
            return None;
        }
        match self.elements[id.slot()].as_mut()? {
            SceneElement::Camera(camera) => Some(camera),
            SceneElement::Light(_) => None,
        }
    }

    /// Light data
    pub fn light(&self, id: Id) -> Option<&Light> {
        match self.element(id)? {
            SceneElement::Light(light) => Some(light),
            SceneElement::Camera(_) => None,
        }
    }

    /// Light data, mutable
    pub fn light_mut(&mut self, id: Id) -> Option<&mut Light> {
        if !self.slots.contains(id) {
            return None;
        }
        match self.elements[id.slot()].as_mut()? {
            SceneElement::Light(light) => Some(light),
            SceneElement::Camera(_) => None,
        }
    }

    /// Live cameras, in sort order after [`ComponentSceneElementManager::sort_cameras`]
    pub fn cameras(&self) -> &[Id] {
        &self.cameras
    }

    /// Live lights in creation order
    pub fn lights(&self) -> &[Id] {
        &self.lights
    }

    /// Stable sort of the camera list by sort layer
    pub fn sort_cameras(&mut self) {
        let Self { elements, cameras, .. } = self;
        cameras.sort_by_key(|id| match &elements[id.slot()] {
            Some(SceneElement::Camera(camera)) => camera.sort_layer(),
            _ => i32::MAX,
        });
    }

    /// Pull world transforms into every element with a geometric anchor
    pub fn post_update_components(&mut self, scene: &SceneView<'_>) {
        for id in self.slots.ids() {
            let Some(entity) = self.slots.entity(id) else {
                continue;
            };
            let Some(world) = scene.world_matrix(entity) else {
                continue;
            };
            if let Some(element) = self.elements[id.slot()].as_mut() {
                element.update_from_world(world);
            }
        }
    }
}

impl ComponentManager for ComponentSceneElementManager {
    fn category(&self) -> Category {
        Category::SceneElement
    }

    fn destroy(&mut self, id: Id) {
        Self::destroy(self, id);
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn terminate(&mut self) {
        let ids: Vec<_> = self.slots.ids().collect();
        for id in ids {
            Self::destroy(self, id);
        }
    }
}
