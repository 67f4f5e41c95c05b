//! Shared fixture for the end-to-end tests: a scene, headless device and
//! renderer with one quad mesh and one material already stored.

#![allow(dead_code)]

use scene_engine::config::EngineConfig;
use scene_engine::ecs::components::{Drawable, MeshInstance, MeshViewType, ShadingModel};
use scene_engine::ecs::{ComponentId, EntityId};
use scene_engine::foundation::math::Vec3;
use scene_engine::render::{
    Camera, CullView, HeadlessDevice, IndirectCommandBuilder, MaterialData, MaterialHandle, MeshHandle,
    MeshRenderer, Precondition, RenderResources, Vertex,
};
use scene_engine::scene::Scene;

pub struct Fixture {
    pub config: EngineConfig,
    pub device: HeadlessDevice,
    pub scene: Scene,
    pub resources: RenderResources,
    pub renderer: MeshRenderer,
    pub draw_list: IndirectCommandBuilder,
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
}

impl Fixture {
    pub fn new(multithreaded: bool) -> Self {
        let mut config = EngineConfig::default()
            .with_multithreaded_culling(multithreaded)
            .with_worker_threads(4);
        // generous bound so loaded test machines never hit the partial path
        config.culling.batch_timeout_ms = 2_000;
        Self::with_config(config)
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut device = HeadlessDevice::new();
        let mut resources = RenderResources::new(&config.storage);
        let quad = [
            Vertex::at([-1.0, 0.0, -1.0]),
            Vertex::at([1.0, 0.0, -1.0]),
            Vertex::at([1.0, 0.0, 1.0]),
            Vertex::at([-1.0, 0.0, 1.0]),
        ];
        let mesh = resources
            .meshes
            .upload(&mut device, &quad, &[0, 1, 2, 2, 3, 0])
            .unwrap();
        let material = resources
            .materials
            .allocate(&mut device, MaterialData::default())
            .unwrap();

        Self {
            scene: Scene::new(&config.scene),
            renderer: MeshRenderer::new(&config),
            draw_list: IndirectCommandBuilder::new(),
            config,
            device,
            resources,
            mesh,
            material,
        }
    }

    /// Entity with a transform and an activated static mesh instance
    pub fn add_drawable(&mut self, name: &str, position: Vec3, scale: Vec3) -> (EntityId, ComponentId) {
        self.add_drawable_of(name, position, scale, MeshViewType::Static)
    }

    pub fn add_drawable_of(
        &mut self,
        name: &str,
        position: Vec3,
        scale: Vec3,
        view_type: MeshViewType,
    ) -> (EntityId, ComponentId) {
        let entity = self.scene.create_entity(name);
        self.scene.set_position(entity, position);
        self.scene.set_scale(entity, scale);
        let instance = self
            .scene
            .add_mesh_instance(entity, MeshInstance::new(view_type));
        self.scene
            .set_mesh_drawable(instance, Drawable::new(self.mesh, self.material, ShadingModel::Lit))
            .unwrap();
        (entity, instance)
    }

    /// Camera at the origin looking down -Z
    pub fn main_view() -> CullView {
        let camera = Camera::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 100.0);
        CullView::new(camera.frustum(), camera.position)
    }

    /// Step the scene and prepare the renderer
    pub fn prepare(&mut self) {
        self.scene.step(1.0 / 60.0);
        self.renderer
            .prepare(&self.scene, &self.resources, &mut self.device)
            .unwrap();
    }

    pub fn cull(&mut self, precondition: &Precondition) -> u32 {
        self.renderer
            .perform_culling(
                &Self::main_view(),
                MeshViewType::Static,
                precondition,
                &mut self.draw_list,
                &mut self.device,
            )
            .unwrap()
    }
}
