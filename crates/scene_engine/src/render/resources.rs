//! Render resources shared by every renderer: material and mesh storage.

use super::device::GraphicsDevice;
use super::storage::{MaterialStorage, MeshStorage, StorageError};
use crate::config::StorageConfig;

/// Material and mesh storage
#[derive(Debug)]
pub struct RenderResources {
    /// Material records
    pub materials: MaterialStorage,
    /// Mesh records and packed geometry
    pub meshes: MeshStorage,
}

impl RenderResources {
    /// Empty storages
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            materials: MaterialStorage::materials(config),
            meshes: MeshStorage::new(config),
        }
    }

    /// Bind every storage buffer
    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        self.materials.bind(device)?;
        self.meshes.bind(device)
    }

    /// Release every device buffer
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        self.materials.destroy(device)?;
        self.meshes.destroy(device)
    }
}
