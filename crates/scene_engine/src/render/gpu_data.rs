//! GPU-layout records
//!
//! Plain `#[repr(C)]` structs shared with shaders. All are `Pod` so they can
//! be written into device buffers with `bytemuck::cast_slice`.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_cols_array, Mat4, Vec3};

/// One indirect draw, laid out as the driver expects
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    /// Index count of the mesh
    pub count: u32,
    /// Always 1 at build time
    pub instance_count: u32,
    /// Offset of the first index in the shared index buffer
    pub first_index: u32,
    /// Value added to each index
    pub base_vertex: i32,
    /// Slot in the instance buffer
    pub base_instance: u32,
}

/// Per-visible-instance lookup indices
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceData {
    /// Index into the material storage
    pub material_index: u32,
    /// Stable per-frame index into the transform buffer
    pub transform_index: u32,
}

/// Model and normal matrices of one node, column major
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformData {
    /// Model matrix
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model matrix
    pub normal: [[f32; 4]; 4],
}

impl TransformData {
    /// Pack a model/normal pair
    pub fn new(model: &Mat4, normal: &Mat4) -> Self {
        Self {
            model: to_cols_array(model),
            normal: to_cols_array(normal),
        }
    }
}

impl Default for TransformData {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity())
    }
}

/// Shading parameters of a material
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    /// Base color (RGBA)
    pub base_color: [f32; 4],
    /// Emissive color (RGB) and strength
    pub emission: [f32; 4],
    /// Metallic factor
    pub metallic: f32,
    /// Roughness factor
    pub roughness: f32,
    /// Index of the base color texture, `u32::MAX` for none
    pub texture_index: u32,
    /// Index this record occupies in material storage
    pub storage_index: u32,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            emission: [0.0; 4],
            metallic: 0.0,
            roughness: 0.5,
            texture_index: u32::MAX,
            storage_index: 0,
        }
    }
}

impl MaterialData {
    /// Material with the given base color
    pub fn with_base_color(mut self, color: [f32; 4]) -> Self {
        self.base_color = color;
        self
    }

    /// Material with the given metallic/roughness pair
    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic = metallic;
        self.roughness = roughness;
        self
    }
}

/// Object-space bounds and geometry offsets of a mesh
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MeshData {
    /// Bounding sphere center in object space
    pub sphere_center: [f32; 3],
    /// Bounding sphere radius
    pub sphere_radius: f32,
    /// Number of indices
    pub index_count: u32,
    /// Offset of the first index in the shared index buffer
    pub first_index: u32,
    /// Offset of the first vertex in the shared vertex buffer
    pub base_vertex: i32,
    /// Index this record occupies in mesh storage
    pub storage_index: u32,
}

impl MeshData {
    /// Bounding sphere center as a vector
    pub fn center(&self) -> Vec3 {
        Vec3::from(self.sphere_center)
    }
}

/// Interleaved vertex used by packed mesh geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex at `position` with an up-facing normal
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 0.0],
        }
    }
}

/// Storage records that remember their own compacted index
pub trait Indexed {
    /// Record the slot index this element now occupies
    fn set_storage_index(&mut self, index: u32);
}

impl Indexed for MaterialData {
    fn set_storage_index(&mut self, index: u32) {
        self.storage_index = index;
    }
}

impl Indexed for MeshData {
    fn set_storage_index(&mut self, index: u32) {
        self.storage_index = index;
    }
}
