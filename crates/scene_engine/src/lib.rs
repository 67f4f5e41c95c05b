//! # Scene Engine
//!
//! Scene graph and GPU-driven rendering core: entities with typed components,
//! world-space transform propagation, batched parallel frustum culling and an
//! indirect draw command stream backed by compacting material/mesh storage.
//!
//! ## Frame flow
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default().with_multithreaded_culling(false);
//! let mut device = HeadlessDevice::new();
//! let mut scene = Scene::new(&config.scene);
//! let mut resources = RenderResources::new(&config.storage);
//! let mut renderer = MeshRenderer::new(&config);
//!
//! let quad = [
//!     Vertex::at([-1.0, 0.0, -1.0]),
//!     Vertex::at([1.0, 0.0, -1.0]),
//!     Vertex::at([1.0, 0.0, 1.0]),
//!     Vertex::at([-1.0, 0.0, 1.0]),
//! ];
//! let mesh = resources.meshes.upload(&mut device, &quad, &[0, 1, 2, 2, 3, 0])?;
//! let material = resources.materials.allocate(&mut device, MaterialData::default())?;
//!
//! let floor = scene.create_entity("floor");
//! scene.set_position(floor, Vec3::new(0.0, -3.0, -10.0));
//! let instance = scene.add_mesh_instance(floor, MeshInstance::new(MeshViewType::Static));
//! scene.set_mesh_drawable(instance, Drawable::new(mesh, material, ShadingModel::Lit))?;
//! scene.step(1.0 / 60.0);
//!
//! let camera = Camera::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 100.0);
//! let view = CullView::new(camera.frustum(), camera.position);
//! let mut draw_list = IndirectCommandBuilder::new();
//!
//! renderer.prepare(&scene, &resources, &mut device)?;
//! let visible = renderer.perform_culling(
//!     &view,
//!     MeshViewType::Static,
//!     &Precondition::None,
//!     &mut draw_list,
//!     &mut device,
//! )?;
//! renderer.render(&mut device, &draw_list, visible, PipelineId(0))?;
//! assert_eq!(visible, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

pub mod config;
pub mod ecs;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::{ChildPolicy, Config, EngineConfig};
    pub use crate::ecs::components::{
        AudioPlayer, Behaviour, Capabilities, Drawable, MeshInstance, MeshViewType, ShadingModel, SpriteInstance,
    };
    pub use crate::ecs::{ComponentData, ComponentId, ComponentType, EntityId, EntityState};
    pub use crate::foundation::math::{Mat4, Quat, Vec3};
    pub use crate::render::{
        Camera, CullDecision, CullView, DrawCommand, GraphicsDevice, HeadlessDevice, IndirectCommandBuilder,
        MaterialData, MeshRenderer, PipelineId, Precondition, RenderError, RenderResources, Vertex,
    };
    pub use crate::scene::{Scene, SceneError};
}
