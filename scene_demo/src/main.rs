//! Floor demo
//!
//! Runs a few frames of a small scene on the headless device: a floor, a
//! spinning pedestal carrying a child crate, and a row of pillars that drift
//! across the camera's view. Each frame culls a main pass and a shadow pass
//! and logs how many instances survived.
//!
//! Usage: `floor_demo [config.toml|config.ron]`

use nalgebra::Vector3;
use scene_engine::config::ConfigError;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::{DeviceError, MaterialHandle, MeshHandle, StorageError};
use thiserror::Error;

const FRAMES: usize = 8;
const DELTA_TIME: f32 = 1.0 / 60.0;

#[derive(Debug, Error)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("scene: {0}")]
    Scene(#[from] SceneError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("device: {0}")]
    Device(#[from] DeviceError),
}

/// Spins its entity around the world Y axis
struct Spinner {
    radians_per_second: f32,
}

impl Behaviour for Spinner {
    fn update(&mut self, scene: &mut Scene, entity: EntityId, delta_time: f32) {
        scene.rotate(entity, &Vector3::y(), self.radians_per_second * delta_time);
    }
}

/// Slides its entity along X and wraps back once it leaves the stage
struct Drifter {
    speed: f32,
    limit: f32,
}

impl Behaviour for Drifter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::LATE_UPDATE
    }

    fn late_update(&mut self, scene: &mut Scene, entity: EntityId, delta_time: f32) {
        let Some(position) = scene.transform_node(entity).map(|node| node.position()) else {
            return;
        };
        let mut x = position.x + self.speed * delta_time;
        if x > self.limit {
            x = -self.limit;
        }
        scene.set_position(entity, Vec3::new(x, position.y, position.z));
    }
}

fn load_config() -> Result<EngineConfig, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => Ok(EngineConfig::load_from_file(&path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn cube() -> ([Vertex; 8], [u32; 36]) {
    let vertices = [
        Vertex::at([-0.5, -0.5, -0.5]),
        Vertex::at([0.5, -0.5, -0.5]),
        Vertex::at([0.5, 0.5, -0.5]),
        Vertex::at([-0.5, 0.5, -0.5]),
        Vertex::at([-0.5, -0.5, 0.5]),
        Vertex::at([0.5, -0.5, 0.5]),
        Vertex::at([0.5, 0.5, 0.5]),
        Vertex::at([-0.5, 0.5, 0.5]),
    ];
    let indices = [
        0, 2, 1, 0, 3, 2, // back
        4, 5, 6, 4, 6, 7, // front
        0, 1, 5, 0, 5, 4, // bottom
        3, 6, 2, 3, 7, 6, // top
        0, 4, 7, 0, 7, 3, // left
        1, 2, 6, 1, 6, 5, // right
    ];
    (vertices, indices)
}

fn add_drawable(
    scene: &mut Scene,
    name: &str,
    position: Vec3,
    drawable: Drawable,
    cast_shadows: bool,
) -> Result<EntityId, DemoError> {
    let entity = scene.create_entity_with_tag(name, "props");
    scene.set_position(entity, position);
    let instance = scene.add_mesh_instance(
        entity,
        MeshInstance::new(MeshViewType::Static).with_cast_shadows(cast_shadows),
    );
    scene.set_mesh_drawable(instance, drawable)?;
    Ok(entity)
}

fn build_scene(
    scene: &mut Scene,
    mesh: MeshHandle,
    stone: MaterialHandle,
    wood: MaterialHandle,
) -> Result<(), DemoError> {
    let floor = add_drawable(
        scene,
        "floor",
        Vec3::new(0.0, -3.0, -12.0),
        Drawable::new(mesh, stone, ShadingModel::Lit),
        false,
    )?;
    scene.set_scale(floor, Vec3::new(20.0, 0.2, 20.0));

    let pedestal = add_drawable(
        scene,
        "pedestal",
        Vec3::new(0.0, -2.0, -8.0),
        Drawable::new(mesh, stone, ShadingModel::Lit),
        true,
    )?;
    scene.add_behaviour(pedestal, Box::new(Spinner { radians_per_second: 1.5 }));

    let crate_box = add_drawable(
        scene,
        "crate",
        Vec3::new(2.0, -1.0, -8.0),
        Drawable::new(mesh, wood, ShadingModel::Lit),
        true,
    )?;
    scene.set_parent(crate_box, Some(pedestal));

    for i in 0..6u8 {
        let pillar = add_drawable(
            scene,
            &format!("pillar{i}"),
            Vec3::new(-30.0 + f32::from(i) * 10.0, 0.0, -20.0),
            Drawable::new(mesh, stone, ShadingModel::Lit),
            i % 2 == 0,
        )?;
        scene.set_scale(pillar, Vec3::new(1.0, 6.0, 1.0));
        scene.add_behaviour(pillar, Box::new(Drifter { speed: 120.0, limit: 30.0 }));
    }
    Ok(())
}

fn run(config: &EngineConfig) -> Result<(), DemoError> {
    let mut device = HeadlessDevice::new();
    let mut scene = Scene::new(&config.scene);
    let mut resources = RenderResources::new(&config.storage);
    let mut renderer = MeshRenderer::new(config);

    let (vertices, indices) = cube();
    let mesh = resources.meshes.upload(&mut device, &vertices, &indices)?;
    let stone = resources
        .materials
        .allocate(&mut device, MaterialData::default().with_metallic_roughness(0.0, 0.9))?;
    let wood = resources.materials.allocate(
        &mut device,
        MaterialData::default()
            .with_base_color([0.6, 0.4, 0.2, 1.0])
            .with_metallic_roughness(0.0, 0.7),
    )?;
    build_scene(&mut scene, mesh, stone, wood)?;
    log::info!("Built scene with {} entities", scene.entity_count());

    let camera = Camera::perspective(Vec3::new(0.0, 1.0, 4.0), 60.0, 16.0 / 9.0, 0.1, 100.0);
    let main_view = CullView::new(camera.frustum(), camera.position);
    let mut sun = Camera::perspective(Vec3::new(0.0, 20.0, -8.0), 90.0, 1.0, 1.0, 60.0)
        .looking_at(Vec3::new(0.0, 0.0, -8.0));
    sun.up = Vec3::new(0.0, 0.0, -1.0);
    let shadow_view = CullView::new(sun.frustum(), sun.position);
    let shadow_casters = Precondition::shadow_casters();

    let mut main_list = IndirectCommandBuilder::new();
    let mut shadow_list = IndirectCommandBuilder::new();

    for frame in 0..FRAMES {
        let step = scene.step(DELTA_TIME);
        let prepared = renderer.prepare(&scene, &resources, &mut device)?;

        let visible = renderer.perform_culling(
            &main_view,
            MeshViewType::Static,
            &Precondition::None,
            &mut main_list,
            &mut device,
        )?;
        renderer.render(&mut device, &main_list, visible, PipelineId(0))?;

        let casters = renderer.perform_culling(
            &shadow_view,
            MeshViewType::Static,
            &shadow_casters,
            &mut shadow_list,
            &mut device,
        )?;
        renderer.render(&mut device, &shadow_list, casters, PipelineId(1))?;

        let stats = renderer.last_cull_stats();
        log::info!(
            "Frame {}: {} instances, {} recomputed, {} visible, {} shadow casters ({} batches, {:?})",
            frame,
            prepared.instances,
            step.recomputed,
            visible,
            casters,
            stats.batches,
            stats.elapsed
        );
    }

    log::info!(
        "Issued {} draw calls, {} bytes of device memory in use",
        device.draw_log().len(),
        device.allocated_bytes()
    );
    main_list.destroy(&mut device)?;
    shadow_list.destroy(&mut device)?;
    renderer.destroy(&mut device)?;
    resources.destroy(&mut device)?;
    Ok(())
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("floor_demo: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log_level);
    log::info!("Starting floor demo");

    if let Err(e) = run(&config) {
        log::error!("Floor demo failed: {}", e);
        std::process::exit(1);
    }
}
