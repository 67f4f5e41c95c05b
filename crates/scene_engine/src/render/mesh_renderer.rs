//! # Mesh renderer
//!
//! Frame flow:
//!
//! 1. [`MeshRenderer::prepare`] snapshots every instance list, assigns each
//!    instance a stable transform index and uploads the transform buffer.
//! 2. [`MeshRenderer::perform_culling`] runs once per view/precondition pair
//!    (shadow pass, main pass, ...) against the same snapshot and uploads
//!    that draw list.
//! 3. [`MeshRenderer::render`] issues one multi-draw-indirect call from a
//!    previously computed count, so one cull can feed several passes.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::culling::{CullInstance, CullStats, CullView, FrustumCuller, Precondition};
use super::device::{BindingPoint, BufferId, BufferUsage, DeviceError, GraphicsDevice, PipelineId};
use super::gpu_data::TransformData;
use super::indirect::IndirectCommandBuilder;
use super::resources::RenderResources;
use super::storage::StorageError;
use crate::config::EngineConfig;
use crate::ecs::components::MeshViewType;
use crate::ecs::ComponentData;
use crate::foundation::contract;
use crate::foundation::math::{max_axis_scale, Mat4, Vec3};
use crate::scene::Scene;

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    /// Device rejected an operation
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Summary of one prepare pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareStats {
    /// Instances captured across all view types
    pub instances: usize,
    /// Listed instances skipped because their mesh or material is gone
    pub skipped: usize,
}

/// Prepares, culls and draws mesh instances
#[derive(Debug)]
pub struct MeshRenderer {
    culler: FrustumCuller,
    snapshots: BTreeMap<MeshViewType, Arc<[CullInstance]>>,
    transforms: Vec<TransformData>,
    transform_buffer: Option<BufferId>,
    transform_capacity: usize,
    frame: u64,
}

impl MeshRenderer {
    /// Renderer using the culling settings of `config`
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            culler: FrustumCuller::new(&config.culling),
            snapshots: BTreeMap::new(),
            transforms: Vec::new(),
            transform_buffer: None,
            transform_capacity: 0,
            frame: 0,
        }
    }

    /// Snapshot instance lists and upload transforms for this frame.
    ///
    /// Must run before any [`perform_culling`](Self::perform_culling) call of
    /// the frame.
    pub fn prepare(
        &mut self,
        scene: &Scene,
        resources: &RenderResources,
        device: &mut dyn GraphicsDevice,
    ) -> Result<PrepareStats, RenderError> {
        self.snapshots.clear();
        self.transforms.clear();
        let mut stats = PrepareStats::default();

        for list in scene.managers().instance_lists() {
            let mut snapshot = Vec::with_capacity(list.len());
            for component in list.iter() {
                let Some(record) = scene.component(component) else {
                    continue;
                };
                let ComponentData::MeshInstance(instance) = &record.data else {
                    continue;
                };
                let Some(drawable) = instance.drawable else {
                    continue;
                };
                let (Some(mesh), Some(material_index)) = (
                    resources.meshes.get(drawable.mesh),
                    resources.materials.index_of(drawable.material),
                ) else {
                    log::warn!(
                        "Skipping mesh instance of entity {}: mesh or material no longer stored",
                        record.entity
                    );
                    stats.skipped += 1;
                    continue;
                };

                let (model, normal, scale) = match scene.transform_node(record.entity) {
                    Some(node) => (*node.model_matrix(), *node.normal_matrix(), node.scale()),
                    None => (Mat4::identity(), Mat4::identity(), Vec3::new(1.0, 1.0, 1.0)),
                };
                let transform_index = self.transforms.len() as u32;
                self.transforms.push(TransformData::new(&model, &normal));

                snapshot.push(CullInstance {
                    component,
                    entity: record.entity,
                    transform_index,
                    model,
                    max_scale: max_axis_scale(&scale),
                    sphere_center: mesh.center(),
                    sphere_radius: mesh.sphere_radius,
                    index_count: mesh.index_count,
                    first_index: mesh.first_index,
                    base_vertex: mesh.base_vertex,
                    material_index,
                    shading_model: drawable.shading_model,
                    cast_shadows: instance.cast_shadows,
                });
            }
            stats.instances += snapshot.len();
            self.snapshots.insert(list.view_type(), snapshot.into());
        }

        self.upload_transforms(device)?;
        resources.bind(device)?;
        self.frame += 1;
        log::trace!(
            "Prepared frame {}: {} instances, {} skipped",
            self.frame,
            stats.instances,
            stats.skipped
        );
        Ok(stats)
    }

    /// Cull the prepared `view_type` snapshot into `draw_list` and upload it.
    pub fn perform_culling(
        &mut self,
        view: &CullView,
        view_type: MeshViewType,
        precondition: &Precondition,
        draw_list: &mut IndirectCommandBuilder,
        device: &mut dyn GraphicsDevice,
    ) -> Result<u32, RenderError> {
        contract::require(self.frame > 0, || {
            "perform_culling called before prepare".to_string()
        });
        let snapshot = self
            .snapshots
            .get(&view_type)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()));
        let count = self.culler.cull(&snapshot, view, precondition, draw_list);
        draw_list.upload(device, count)?;
        Ok(count)
    }

    /// Issue one indirect draw of `count` commands from `draw_list`
    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        draw_list: &IndirectCommandBuilder,
        count: u32,
        pipeline: PipelineId,
    ) -> Result<(), RenderError> {
        if count == 0 {
            log::trace!("Nothing visible for pipeline {:?}", pipeline);
            return Ok(());
        }
        let Some(commands) = draw_list.command_buffer() else {
            contract::violation("render called with a count but no uploaded draw list");
        };
        draw_list.bind(device)?;
        if let Some(transforms) = self.transform_buffer {
            device.bind_buffer(transforms, BindingPoint::Transforms)?;
        }
        device.multi_draw_indirect(pipeline, commands, count)?;
        Ok(())
    }

    /// Snapshot of one view type from the last prepare
    pub fn snapshot(&self, view_type: MeshViewType) -> &[CullInstance] {
        self.snapshots.get(&view_type).map_or(&[][..], |snapshot| &snapshot[..])
    }

    /// Transforms uploaded by the last prepare, by stable index
    pub fn transforms(&self) -> &[TransformData] {
        &self.transforms
    }

    /// Device buffer holding the transforms
    pub fn transform_buffer(&self) -> Option<BufferId> {
        self.transform_buffer
    }

    /// Statistics of the last culling run
    pub fn last_cull_stats(&self) -> CullStats {
        self.culler.last_stats()
    }

    /// Release the transform buffer
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), RenderError> {
        if let Some(buffer) = self.transform_buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        self.transform_capacity = 0;
        Ok(())
    }

    fn upload_transforms(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), RenderError> {
        let needed = self.transforms.len().max(1);
        if self.transform_buffer.is_none() || needed > self.transform_capacity {
            let mut capacity = self.transform_capacity.max(64);
            while capacity < needed {
                capacity *= 2;
            }
            let bytes = capacity * std::mem::size_of::<TransformData>();
            match self.transform_buffer {
                Some(buffer) => device.resize_buffer(buffer, bytes)?,
                None => self.transform_buffer = Some(device.create_buffer(BufferUsage::Storage, bytes)?),
            }
            self.transform_capacity = capacity;
        }
        if let Some(buffer) = self.transform_buffer {
            device.write_buffer(buffer, 0, bytemuck::cast_slice(&self.transforms))?;
            device.bind_buffer(buffer, BindingPoint::Transforms)?;
        }
        Ok(())
    }
}
