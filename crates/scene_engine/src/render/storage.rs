//! # Compacting GPU storage
//!
//! Materials and meshes live in dense device buffers. Removing an element
//! shifts every later element down one slot and rewrites their bytes, so the
//! occupied indices are always exactly `0..len` and the indices written into
//! instance data stay small. Handles are generational keys and stay valid
//! across compaction; only the index behind them changes.
//!
//! Capacity grows by doubling the first time an `allocate` would overflow.
//!
//! Failed operations leave the host-side contents untouched. `free` checks
//! the device buffers before it rewrites anything; a device that accepts that
//! check and then fails a write inside its bounds is broken, and the error is
//! returned with host and device out of step.

use bytemuck::Pod;
use slotmap::{new_key_type, Key, SecondaryMap, SlotMap};
use thiserror::Error;

use super::device::{BindingPoint, BufferId, BufferUsage, DeviceError, GraphicsDevice};
use super::gpu_data::{Indexed, MaterialData, MeshData, Vertex};
use crate::config::StorageConfig;
use crate::foundation::contract;

new_key_type! {
    /// Handle to a material stored in [`MaterialStorage`]
    pub struct MaterialHandle;

    /// Handle to a mesh stored in [`MeshStorage`]
    pub struct MeshHandle;
}

/// Storage failures callers can recover from
#[derive(Debug, Error)]
pub enum StorageError {
    /// Handle was freed or never issued by this storage
    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    /// Mesh upload without vertices or indices
    #[error("mesh upload needs vertices and indices (got {vertices} vertices, {indices} indices)")]
    EmptyMesh {
        /// Vertices supplied
        vertices: usize,
        /// Indices supplied
        indices: usize,
    },

    /// Device rejected a buffer operation
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Where an element currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSlot {
    /// Dense element index
    pub index: u32,
    /// Byte offset in the device buffer
    pub offset: usize,
}

/// Dense, compacting array of `T` mirrored into a device buffer
#[derive(Debug)]
pub struct StorageHandler<K: Key, T: Pod + Indexed> {
    label: &'static str,
    binding: BindingPoint,
    buffer: Option<BufferId>,
    capacity: usize,
    initial_capacity: usize,
    alignment: usize,
    indices: SlotMap<K, u32>,
    owners: Vec<K>,
    elements: Vec<T>,
}

impl<K: Key, T: Pod + Indexed> StorageHandler<K, T> {
    /// Create an empty storage; the device buffer is created on first use
    pub fn new(label: &'static str, binding: BindingPoint, config: &StorageConfig) -> Self {
        Self {
            label,
            binding,
            buffer: None,
            capacity: 0,
            initial_capacity: config.initial_capacity.max(1),
            alignment: config.alignment.max(1),
            indices: SlotMap::with_key(),
            owners: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// Bytes per element
    pub fn stride(&self) -> usize {
        std::mem::size_of::<T>()
    }

    /// Append an element, growing the device buffer when full
    pub fn allocate(
        &mut self,
        device: &mut dyn GraphicsDevice,
        mut value: T,
    ) -> Result<K, StorageError> {
        let index = self.elements.len();
        let offset = index * self.stride();
        let next_offset = offset + self.stride();
        contract::require(next_offset % self.alignment == 0, || {
            format!(
                "{} storage stride {} breaks {}-byte alignment",
                self.label,
                self.stride(),
                self.alignment
            )
        });

        self.reserve(device, 1)?;
        let buffer = self.device_buffer()?;
        value.set_storage_index(index as u32);
        device.write_buffer(buffer, offset, bytemuck::bytes_of(&value))?;

        let handle = self.indices.insert(index as u32);
        self.owners.push(handle);
        self.elements.push(value);
        log::trace!("Allocated {} slot {} at offset {}", self.label, index, offset);
        Ok(handle)
    }

    /// Replace the element behind `handle`, keeping its index
    pub fn update(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: K,
        mut value: T,
    ) -> Result<(), StorageError> {
        let index = self.require_index(handle)?;
        value.set_storage_index(index as u32);
        let buffer = self.device_buffer()?;
        device.write_buffer(buffer, index * self.stride(), bytemuck::bytes_of(&value))?;
        self.elements[index] = value;
        Ok(())
    }

    /// Make room for `additional` more elements, doubling capacity as needed.
    /// Only the device buffer changes; stored elements are untouched.
    pub fn reserve(&mut self, device: &mut dyn GraphicsDevice, additional: usize) -> Result<(), StorageError> {
        let needed = self.elements.len() + additional;
        if needed <= self.capacity {
            return Ok(());
        }
        let mut capacity = if self.capacity == 0 {
            self.initial_capacity
        } else {
            self.capacity * 2
        };
        while capacity < needed {
            capacity *= 2;
        }
        self.grow(device, capacity)
    }

    /// Remove an element and compact everything after it
    pub fn free(&mut self, device: &mut dyn GraphicsDevice, handle: K) -> Result<T, StorageError> {
        let index = self.require_index(handle)?;
        let buffer = self.validate(device)?;
        let stride = self.stride();

        let shifted: Vec<T> = self.elements[index + 1..]
            .iter()
            .zip(index..)
            .map(|(element, slot)| {
                let mut element = *element;
                element.set_storage_index(slot as u32);
                element
            })
            .collect();
        let vacated = (self.elements.len() - 1) * stride;
        device.write_buffer(buffer, index * stride, bytemuck::cast_slice(&shifted))?;
        device.write_buffer(buffer, vacated, &vec![0u8; stride])?;

        self.indices.remove(handle);
        self.owners.remove(index);
        let removed = self.elements.remove(index);
        for (element, slot) in shifted.into_iter().zip(index..) {
            self.elements[slot] = element;
            if let Some(stored) = self.indices.get_mut(self.owners[slot]) {
                *stored = slot as u32;
            }
        }

        log::trace!(
            "Freed {} slot {}, compacted {} later slots",
            self.label,
            index,
            self.elements.len() - index
        );
        Ok(removed)
    }

    /// Dense index currently behind `handle`
    pub fn index_of(&self, handle: K) -> Option<u32> {
        self.indices.get(handle).copied()
    }

    /// Index and byte offset currently behind `handle`
    pub fn slot(&self, handle: K) -> Option<StorageSlot> {
        self.index_of(handle).map(|index| StorageSlot {
            index,
            offset: index as usize * self.stride(),
        })
    }

    /// Host copy of the element behind `handle`
    pub fn get(&self, handle: K) -> Option<&T> {
        self.index_of(handle).map(|index| &self.elements[index as usize])
    }

    /// Whether `handle` is live
    pub fn contains(&self, handle: K) -> bool {
        self.indices.contains_key(handle)
    }

    /// Handles in index order
    pub fn handles(&self) -> &[K] {
        &self.owners
    }

    /// Host copies in index order
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements the device buffer can hold before growing
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Device buffer, once created
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Bind the device buffer to this storage's binding point
    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        if let Some(buffer) = self.buffer {
            device.bind_buffer(buffer, self.binding)?;
        }
        Ok(())
    }

    /// Release the device buffer
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        self.capacity = 0;
        Ok(())
    }

    fn grow(&mut self, device: &mut dyn GraphicsDevice, capacity: usize) -> Result<(), StorageError> {
        let bytes = capacity * self.stride();
        match self.buffer {
            Some(buffer) => device.resize_buffer(buffer, bytes)?,
            None => self.buffer = Some(device.create_buffer(BufferUsage::Storage, bytes)?),
        }
        log::debug!("{} storage grew from {} to {} slots", self.label, self.capacity, capacity);
        self.capacity = capacity;
        Ok(())
    }

    fn require_index(&self, handle: K) -> Result<usize, StorageError> {
        self.index_of(handle)
            .map(|index| index as usize)
            .ok_or(StorageError::UnknownHandle(self.label))
    }

    fn device_buffer(&self) -> Result<BufferId, StorageError> {
        self.buffer.ok_or(StorageError::UnknownHandle(self.label))
    }

    /// Device buffer, checked to still hold every stored element
    fn validate(&self, device: &dyn GraphicsDevice) -> Result<BufferId, StorageError> {
        let buffer = self.device_buffer()?;
        check_size(device, buffer, self.elements.len() * self.stride())?;
        Ok(buffer)
    }
}

fn check_size(device: &dyn GraphicsDevice, buffer: BufferId, needed: usize) -> Result<(), StorageError> {
    let size = device.buffer_size(buffer)?;
    if size < needed {
        return Err(DeviceError::OutOfBounds {
            buffer,
            offset: 0,
            len: needed,
            size,
        }
        .into());
    }
    Ok(())
}

/// Material records
pub type MaterialStorage = StorageHandler<MaterialHandle, MaterialData>;

impl MaterialStorage {
    /// Empty material storage bound at [`BindingPoint::Materials`]
    pub fn materials(config: &StorageConfig) -> Self {
        Self::new("material", BindingPoint::Materials, config)
    }
}

/// Growable device array holding packed geometry
#[derive(Debug)]
struct GeometryBuffer<T: Pod> {
    usage: BufferUsage,
    binding: BindingPoint,
    buffer: Option<BufferId>,
    capacity: usize,
    initial_capacity: usize,
    data: Vec<T>,
}

impl<T: Pod> GeometryBuffer<T> {
    fn new(usage: BufferUsage, binding: BindingPoint, initial_capacity: usize) -> Self {
        Self {
            usage,
            binding,
            buffer: None,
            capacity: 0,
            initial_capacity: initial_capacity.max(1),
            data: Vec::new(),
        }
    }

    fn stride() -> usize {
        std::mem::size_of::<T>()
    }

    /// Grow the device buffer so `additional` more items fit
    fn reserve(&mut self, device: &mut dyn GraphicsDevice, additional: usize) -> Result<(), StorageError> {
        let needed = self.data.len() + additional;
        if needed > self.capacity {
            let mut capacity = self.capacity.max(self.initial_capacity);
            while capacity < needed {
                capacity *= 2;
            }
            let bytes = capacity * Self::stride();
            match self.buffer {
                Some(buffer) => device.resize_buffer(buffer, bytes)?,
                None => self.buffer = Some(device.create_buffer(self.usage, bytes)?),
            }
            self.capacity = capacity;
        }
        Ok(())
    }

    /// Append `items`, returning the element offset of the first one
    fn append(&mut self, device: &mut dyn GraphicsDevice, items: &[T]) -> Result<usize, StorageError> {
        self.reserve(device, items.len())?;
        let first = self.data.len();
        if let Some(buffer) = self.buffer {
            device.write_buffer(buffer, first * Self::stride(), bytemuck::cast_slice(items))?;
        }
        self.data.extend_from_slice(items);
        Ok(first)
    }

    /// Drop everything from `len` on; the device bytes become unreferenced
    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn validate(&self, device: &dyn GraphicsDevice) -> Result<(), StorageError> {
        match self.buffer {
            Some(buffer) => check_size(device, buffer, self.data.len() * Self::stride()),
            None => Ok(()),
        }
    }

    /// Remove `start..start + len` and rewrite everything after it
    fn remove_range(
        &mut self,
        device: &mut dyn GraphicsDevice,
        start: usize,
        len: usize,
    ) -> Result<(), StorageError> {
        self.data.drain(start..start + len);
        if let Some(buffer) = self.buffer {
            device.write_buffer(buffer, start * Self::stride(), bytemuck::cast_slice(&self.data[start..]))?;
            let tail = self.data.len() * Self::stride();
            device.write_buffer(buffer, tail, &vec![0u8; len * Self::stride()])?;
        }
        Ok(())
    }

    fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        if let Some(buffer) = self.buffer {
            device.bind_buffer(buffer, self.binding)?;
        }
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        self.capacity = 0;
        Ok(())
    }
}

/// Mesh records plus their packed vertex and index data
#[derive(Debug)]
pub struct MeshStorage {
    records: StorageHandler<MeshHandle, MeshData>,
    vertex_counts: SecondaryMap<MeshHandle, u32>,
    vertices: GeometryBuffer<Vertex>,
    indices: GeometryBuffer<u32>,
}

impl MeshStorage {
    /// Empty mesh storage
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            records: StorageHandler::new("mesh", BindingPoint::Meshes, config),
            vertex_counts: SecondaryMap::new(),
            vertices: GeometryBuffer::new(BufferUsage::Vertex, BindingPoint::Vertices, config.initial_capacity * 64),
            indices: GeometryBuffer::new(BufferUsage::Index, BindingPoint::Indices, config.initial_capacity * 192),
        }
    }

    /// Pack a mesh's geometry and record its bounds.
    ///
    /// Indices are relative to the mesh's first vertex. Empty input is
    /// rejected before anything is written, and all three buffers are grown
    /// up front so running out of device memory leaves no orphaned geometry.
    pub fn upload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshHandle, StorageError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(StorageError::EmptyMesh {
                vertices: vertices.len(),
                indices: indices.len(),
            });
        }

        self.vertices.reserve(device, vertices.len())?;
        self.indices.reserve(device, indices.len())?;
        self.records.reserve(device, 1)?;

        let (center, radius) = bounding_sphere(vertices);
        let base_vertex = self.vertices.append(device, vertices)?;
        let first_index = match self.indices.append(device, indices) {
            Ok(first_index) => first_index,
            Err(e) => {
                self.vertices.truncate(base_vertex);
                return Err(e);
            }
        };

        let record = MeshData {
            sphere_center: center,
            sphere_radius: radius,
            index_count: indices.len() as u32,
            first_index: first_index as u32,
            base_vertex: base_vertex as i32,
            storage_index: 0,
        };
        let handle = match self.records.allocate(device, record) {
            Ok(handle) => handle,
            Err(e) => {
                self.indices.truncate(first_index);
                self.vertices.truncate(base_vertex);
                return Err(e);
            }
        };
        self.vertex_counts.insert(handle, vertices.len() as u32);
        log::debug!(
            "Uploaded mesh with {} vertices, {} indices (radius {:.3})",
            vertices.len(),
            indices.len(),
            radius
        );
        Ok(handle)
    }

    /// Remove a mesh, compacting geometry and fixing later meshes' offsets
    pub fn free(&mut self, device: &mut dyn GraphicsDevice, handle: MeshHandle) -> Result<MeshData, StorageError> {
        let removed = *self
            .records
            .get(handle)
            .ok_or(StorageError::UnknownHandle("mesh"))?;
        self.records.validate(device)?;
        self.vertices.validate(device)?;
        self.indices.validate(device)?;
        let vertex_count = self.vertex_counts.remove(handle).unwrap_or(0);

        self.vertices
            .remove_range(device, removed.base_vertex as usize, vertex_count as usize)?;
        self.indices
            .remove_range(device, removed.first_index as usize, removed.index_count as usize)?;

        let later: Vec<(MeshHandle, MeshData)> = self
            .records
            .handles()
            .iter()
            .filter(|&&other| other != handle)
            .filter_map(|&other| self.records.get(other).map(|data| (other, *data)))
            .filter(|(_, data)| data.first_index > removed.first_index || data.base_vertex > removed.base_vertex)
            .collect();
        for (other, mut data) in later {
            if data.first_index > removed.first_index {
                data.first_index -= removed.index_count;
            }
            if data.base_vertex > removed.base_vertex {
                data.base_vertex -= vertex_count as i32;
            }
            self.records.update(device, other, data)?;
        }

        self.records.free(device, handle)
    }

    /// Record behind `handle`
    pub fn get(&self, handle: MeshHandle) -> Option<&MeshData> {
        self.records.get(handle)
    }

    /// Dense index of `handle`
    pub fn index_of(&self, handle: MeshHandle) -> Option<u32> {
        self.records.index_of(handle)
    }

    /// Underlying record storage
    pub fn records(&self) -> &StorageHandler<MeshHandle, MeshData> {
        &self.records
    }

    /// Packed vertices
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices.data
    }

    /// Packed indices
    pub fn indices(&self) -> &[u32] {
        &self.indices.data
    }

    /// Number of meshes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no meshes are stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bind records and geometry
    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        self.records.bind(device)?;
        self.vertices.bind(device)?;
        self.indices.bind(device)
    }

    /// Release every device buffer
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), StorageError> {
        self.records.destroy(device)?;
        self.vertices.destroy(device)?;
        self.indices.destroy(device)
    }
}

/// Center of the vertex bounding box and the farthest vertex distance from it
fn bounding_sphere(vertices: &[Vertex]) -> ([f32; 3], f32) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for vertex in vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex.position[axis]);
            max[axis] = max[axis].max(vertex.position[axis]);
        }
    }
    let center = [
        (min[0] + max[0]) * 0.5,
        (min[1] + max[1]) * 0.5,
        (min[2] + max[2]) * 0.5,
    ];
    let radius = vertices
        .iter()
        .map(|vertex| {
            let d = [
                vertex.position[0] - center[0],
                vertex.position[1] - center[1],
                vertex.position[2] - center[2],
            ];
            (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
        })
        .fold(0.0, f32::max);
    (center, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    fn small_config() -> StorageConfig {
        StorageConfig {
            initial_capacity: 2,
            alignment: 16,
        }
    }

    fn material(red: f32) -> MaterialData {
        MaterialData::default().with_base_color([red, 0.0, 0.0, 1.0])
    }

    fn quad(offset: f32) -> (Vec<Vertex>, Vec<u32>) {
        let vertices = vec![
            Vertex::at([offset - 1.0, 0.0, -1.0]),
            Vertex::at([offset + 1.0, 0.0, -1.0]),
            Vertex::at([offset + 1.0, 0.0, 1.0]),
            Vertex::at([offset - 1.0, 0.0, 1.0]),
        ];
        (vertices, vec![0, 1, 2, 2, 3, 0])
    }

    #[test]
    fn test_free_middle_compacts_last_slot() {
        let mut device = HeadlessDevice::new();
        let mut storage = MaterialStorage::materials(&StorageConfig::default());
        let stride = storage.stride();

        let a = storage.allocate(&mut device, material(0.1)).unwrap();
        let b = storage.allocate(&mut device, material(0.2)).unwrap();
        let c = storage.allocate(&mut device, material(0.3)).unwrap();
        assert_eq!(storage.slot(c).unwrap(), StorageSlot { index: 2, offset: 2 * stride });

        storage.free(&mut device, b).unwrap();

        assert_eq!(storage.slot(c).unwrap(), StorageSlot { index: 1, offset: stride });
        assert_eq!(storage.get(c).unwrap().storage_index, 1);
        assert_eq!(storage.index_of(a), Some(0));
        assert_eq!(storage.index_of(b), None);

        let on_device: Vec<MaterialData> = device.read_records(storage.buffer().unwrap(), 2).unwrap();
        assert_relative_eq!(on_device[1].base_color[0], 0.3);
        assert_eq!(on_device[1].storage_index, 1);
    }

    #[test]
    fn test_growth_doubles_and_keeps_contents() {
        let mut device = HeadlessDevice::new();
        let mut storage = MaterialStorage::materials(&small_config());

        let first = storage.allocate(&mut device, material(0.5)).unwrap();
        assert_eq!(storage.capacity(), 2);
        storage.allocate(&mut device, material(0.6)).unwrap();
        storage.allocate(&mut device, material(0.7)).unwrap();
        assert_eq!(storage.capacity(), 4);

        let buffer = storage.buffer().unwrap();
        assert_eq!(device.buffer_size(buffer).unwrap(), 4 * storage.stride());
        let on_device: Vec<MaterialData> = device.read_records(buffer, 3).unwrap();
        assert_relative_eq!(on_device[0].base_color[0], 0.5);
        assert_relative_eq!(on_device[2].base_color[0], 0.7);
        assert_eq!(storage.index_of(first), Some(0));
    }

    #[test]
    fn test_random_allocate_free_keeps_indices_dense() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut device = HeadlessDevice::new();
        let mut storage = MaterialStorage::materials(&small_config());
        let mut live = Vec::new();

        for _ in 0..400 {
            if live.is_empty() || rng.gen_bool(0.6) {
                live.push(storage.allocate(&mut device, material(rng.gen())).unwrap());
            } else {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                storage.free(&mut device, victim).unwrap();

                let mut indices: Vec<u32> = live.iter().map(|&h| storage.index_of(h).unwrap()).collect();
                indices.sort_unstable();
                assert_eq!(indices, (0..live.len() as u32).collect::<Vec<_>>());
                for (index, element) in storage.elements().iter().enumerate() {
                    assert_eq!(element.storage_index, index as u32);
                }
            }
        }
    }

    #[test]
    fn test_unknown_handle_is_an_error() {
        let mut device = HeadlessDevice::new();
        let mut storage = MaterialStorage::materials(&StorageConfig::default());
        let handle = storage.allocate(&mut device, material(1.0)).unwrap();
        storage.free(&mut device, handle).unwrap();
        assert!(matches!(
            storage.free(&mut device, handle),
            Err(StorageError::UnknownHandle("material"))
        ));
    }

    #[test]
    #[should_panic(expected = "alignment")]
    fn test_misaligned_stride_is_a_contract_violation() {
        let mut device = HeadlessDevice::new();
        let config = StorageConfig {
            initial_capacity: 4,
            alignment: 64,
        };
        let mut storage = MaterialStorage::materials(&config);
        let _ = storage.allocate(&mut device, material(1.0));
    }

    #[test]
    fn test_mesh_bounds_and_offsets() {
        let mut device = HeadlessDevice::new();
        let mut meshes = MeshStorage::new(&StorageConfig::default());
        let (vertices, indices) = quad(0.0);
        let handle = meshes.upload(&mut device, &vertices, &indices).unwrap();

        let data = meshes.get(handle).unwrap();
        assert_eq!(data.index_count, 6);
        assert_eq!(data.first_index, 0);
        assert_eq!(data.base_vertex, 0);
        assert_relative_eq!(data.sphere_radius, 2.0_f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_mesh_free_compacts_geometry() {
        let mut device = HeadlessDevice::new();
        let mut meshes = MeshStorage::new(&StorageConfig::default());
        let (v0, i0) = quad(0.0);
        let (v1, i1) = quad(10.0);
        let first = meshes.upload(&mut device, &v0, &i0).unwrap();
        let second = meshes.upload(&mut device, &v1, &i1).unwrap();
        assert_eq!(meshes.get(second).unwrap().first_index, 6);
        assert_eq!(meshes.get(second).unwrap().base_vertex, 4);

        meshes.free(&mut device, first).unwrap();

        let data = meshes.get(second).unwrap();
        assert_eq!(data.first_index, 0);
        assert_eq!(data.base_vertex, 0);
        assert_eq!(data.storage_index, 0);
        assert_eq!(meshes.vertices().len(), 4);
        assert_relative_eq!(meshes.vertices()[0].position[0], 9.0);
        assert_eq!(meshes.indices(), &[0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn test_empty_mesh_rejected_without_mutation() {
        let mut device = HeadlessDevice::new();
        let mut meshes = MeshStorage::new(&StorageConfig::default());
        let (vertices, _) = quad(0.0);
        assert!(matches!(
            meshes.upload(&mut device, &vertices, &[]),
            Err(StorageError::EmptyMesh { vertices: 4, indices: 0 })
        ));
        assert!(meshes.is_empty());
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_failed_mesh_upload_leaves_no_geometry() {
        // room for the vertex buffer but not the index buffer
        let mut device = HeadlessDevice::new().with_memory_budget(64 * 32 + 100);
        let config = StorageConfig {
            initial_capacity: 1,
            alignment: 16,
        };
        let mut meshes = MeshStorage::new(&config);
        let (vertices, indices) = quad(0.0);

        assert!(matches!(
            meshes.upload(&mut device, &vertices, &indices),
            Err(StorageError::Device(DeviceError::OutOfMemory { .. }))
        ));
        assert!(meshes.is_empty());
        assert!(meshes.vertices().is_empty());
        assert!(meshes.indices().is_empty());
    }

    #[test]
    fn test_failed_record_allocation_rolls_back_geometry() {
        let config = StorageConfig {
            initial_capacity: 1,
            alignment: 16,
        };
        // vertex and index buffers fit, the mesh record buffer does not
        let mut device = HeadlessDevice::new().with_memory_budget(64 * 32 + 192 * 4 + 16);
        let mut meshes = MeshStorage::new(&config);
        let (vertices, indices) = quad(0.0);

        assert!(meshes.upload(&mut device, &vertices, &indices).is_err());
        assert!(meshes.vertices().is_empty());
        assert!(meshes.indices().is_empty());
        assert_eq!(meshes.records().len(), 0);
    }

    #[test]
    fn test_free_on_lost_buffer_keeps_host_state() {
        let mut device = HeadlessDevice::new();
        let mut storage = MaterialStorage::materials(&StorageConfig::default());
        let a = storage.allocate(&mut device, material(0.1)).unwrap();
        let b = storage.allocate(&mut device, material(0.2)).unwrap();
        let c = storage.allocate(&mut device, material(0.3)).unwrap();
        device.destroy_buffer(storage.buffer().unwrap()).unwrap();

        assert!(matches!(
            storage.free(&mut device, b),
            Err(StorageError::Device(DeviceError::UnknownBuffer(_)))
        ));
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.index_of(a), Some(0));
        assert_eq!(storage.index_of(b), Some(1));
        assert_eq!(storage.index_of(c), Some(2));
        assert_eq!(storage.get(c).unwrap().storage_index, 2);
    }

    #[test]
    fn test_mesh_free_on_lost_buffer_keeps_geometry() {
        let mut device = HeadlessDevice::new();
        let mut meshes = MeshStorage::new(&StorageConfig::default());
        let (v0, i0) = quad(0.0);
        let (v1, i1) = quad(10.0);
        let first = meshes.upload(&mut device, &v0, &i0).unwrap();
        let second = meshes.upload(&mut device, &v1, &i1).unwrap();
        device.destroy_buffer(meshes.records().buffer().unwrap()).unwrap();

        assert!(meshes.free(&mut device, first).is_err());
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes.vertices().len(), 8);
        assert_eq!(meshes.indices().len(), 12);
        assert_eq!(meshes.get(second).unwrap().base_vertex, 4);
    }

    #[test]
    fn test_out_of_memory_propagates() {
        let mut device = HeadlessDevice::new().with_memory_budget(8);
        let mut storage = MaterialStorage::materials(&StorageConfig::default());
        assert!(matches!(
            storage.allocate(&mut device, material(1.0)),
            Err(StorageError::Device(DeviceError::OutOfMemory { .. }))
        ));
        assert!(storage.is_empty());
    }
}
