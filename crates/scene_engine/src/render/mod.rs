//! GPU-driven mesh rendering
//!
//! Storage for materials and meshes, per-view-type instance lists, frustum
//! culling into indirect command streams, and the device abstraction they
//! are written to.

pub mod camera;
pub mod culling;
pub mod device;
pub mod frustum;
pub mod gpu_data;
pub mod indirect;
pub mod instance_list;
pub mod mesh_renderer;
pub mod resources;
pub mod storage;
pub mod worker_pool;

pub use camera::Camera;
pub use culling::{CullDecision, CullInstance, CullStats, CullView, FrustumCuller, Precondition};
pub use device::{
    BindingPoint, BufferId, BufferUsage, DeviceError, DrawCall, GraphicsDevice, HeadlessDevice, PipelineId,
};
pub use frustum::{Frustum, Plane, PlaneSide};
pub use gpu_data::{DrawCommand, InstanceData, MaterialData, MeshData, TransformData, Vertex};
pub use indirect::IndirectCommandBuilder;
pub use instance_list::InstanceList;
pub use mesh_renderer::{MeshRenderer, PrepareStats, RenderError};
pub use resources::RenderResources;
pub use storage::{MaterialHandle, MaterialStorage, MeshHandle, MeshStorage, StorageError, StorageHandler, StorageSlot};
pub use worker_pool::{PoolShutDown, WorkerPool};
