//! Graphics device abstraction
//!
//! The renderer only needs a handful of device operations: create and grow
//! buffers, write bytes into them, bind them, and issue one multi-draw
//! indirect call. [`HeadlessDevice`] keeps everything in host memory so the
//! pipeline can run (and be inspected) without a GPU.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Opaque buffer handle issued by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

impl BufferId {
    /// Raw handle value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Opaque pipeline handle; pipeline creation belongs to the shading layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u32);

/// How a buffer is consumed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Structured storage read by shaders
    Storage,
    /// Indirect draw command stream
    Indirect,
    /// Vertex data
    Vertex,
    /// Index data
    Index,
}

/// Shader-visible binding slots used by the mesh pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingPoint {
    /// Per-instance material/transform indices
    Instances,
    /// Model and normal matrices
    Transforms,
    /// Material records
    Materials,
    /// Mesh records
    Meshes,
    /// Packed vertices
    Vertices,
    /// Packed indices
    Indices,
}

/// Device-level failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// Allocation would exceed device memory
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// Bytes still available
        available: usize,
    },

    /// Handle does not name a live buffer
    #[error("unknown {0}")]
    UnknownBuffer(BufferId),

    /// Write or read past the end of a buffer
    #[error("access of {len} bytes at offset {offset} exceeds {buffer} of {size} bytes")]
    OutOfBounds {
        /// Target buffer
        buffer: BufferId,
        /// Start offset
        offset: usize,
        /// Access length
        len: usize,
        /// Buffer size
        size: usize,
    },

    /// Buffer bound or used with an incompatible usage
    #[error("{buffer} has usage {actual:?}, expected {expected:?}")]
    WrongUsage {
        /// Offending buffer
        buffer: BufferId,
        /// Usage it was created with
        actual: BufferUsage,
        /// Usage the operation needs
        expected: BufferUsage,
    },
}

/// Operations the rendering core needs from a graphics backend
pub trait GraphicsDevice {
    /// Allocate a zero-filled buffer
    fn create_buffer(&mut self, usage: BufferUsage, size: usize) -> Result<BufferId, DeviceError>;

    /// Grow or shrink a buffer, preserving the overlapping contents
    fn resize_buffer(&mut self, buffer: BufferId, size: usize) -> Result<(), DeviceError>;

    /// Current size of a buffer in bytes
    fn buffer_size(&self, buffer: BufferId) -> Result<usize, DeviceError>;

    /// Copy `bytes` into the buffer at `offset`
    fn write_buffer(&mut self, buffer: BufferId, offset: usize, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Release a buffer
    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError>;

    /// Bind a buffer to a shader binding point
    fn bind_buffer(&mut self, buffer: BufferId, binding: BindingPoint) -> Result<(), DeviceError>;

    /// Issue `count` indirect draws read from the start of `commands`
    fn multi_draw_indirect(
        &mut self,
        pipeline: PipelineId,
        commands: BufferId,
        count: u32,
    ) -> Result<(), DeviceError>;
}

/// A recorded multi-draw-indirect call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    /// Pipeline the draw used
    pub pipeline: PipelineId,
    /// Indirect command buffer
    pub commands: BufferId,
    /// Number of commands consumed
    pub count: u32,
    /// Bindings in effect when the call was issued
    pub bindings: Vec<(BindingPoint, BufferId)>,
}

#[derive(Debug)]
struct HostBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
}

/// In-memory device used by tests and the headless demo
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    buffers: HashMap<BufferId, HostBuffer>,
    next_id: u32,
    memory_budget: Option<usize>,
    allocated: usize,
    bindings: HashMap<BindingPoint, BufferId>,
    draw_log: Vec<DrawCall>,
}

impl HeadlessDevice {
    /// Device with unlimited memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes that may be allocated
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Bytes currently allocated across all buffers
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Raw contents of a buffer
    pub fn read_buffer(&self, buffer: BufferId) -> Result<&[u8], DeviceError> {
        Ok(&self.host(buffer)?.data)
    }

    /// Reinterpret the first `count` elements of a buffer as `T`
    pub fn read_records<T: bytemuck::Pod>(
        &self,
        buffer: BufferId,
        count: usize,
    ) -> Result<Vec<T>, DeviceError> {
        let stride = std::mem::size_of::<T>();
        let data = &self.host(buffer)?.data;
        let len = stride * count;
        if len > data.len() {
            return Err(DeviceError::OutOfBounds {
                buffer,
                offset: 0,
                len,
                size: data.len(),
            });
        }
        Ok(data[..len]
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Buffer currently bound at `binding`
    pub fn bound(&self, binding: BindingPoint) -> Option<BufferId> {
        self.bindings.get(&binding).copied()
    }

    /// Draw calls issued so far
    pub fn draw_log(&self) -> &[DrawCall] {
        &self.draw_log
    }

    /// Forget recorded draw calls
    pub fn clear_draw_log(&mut self) {
        self.draw_log.clear();
    }

    fn host(&self, buffer: BufferId) -> Result<&HostBuffer, DeviceError> {
        self.buffers.get(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))
    }

    fn reserve(&self, extra: usize) -> Result<(), DeviceError> {
        if let Some(budget) = self.memory_budget {
            let available = budget.saturating_sub(self.allocated);
            if extra > available {
                log::warn!("Headless device refused {} bytes ({} available)", extra, available);
                return Err(DeviceError::OutOfMemory {
                    requested: extra,
                    available,
                });
            }
        }
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&mut self, usage: BufferUsage, size: usize) -> Result<BufferId, DeviceError> {
        self.reserve(size)?;
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.insert(
            id,
            HostBuffer {
                usage,
                data: vec![0; size],
            },
        );
        self.allocated += size;
        log::trace!("Created {} ({:?}, {} bytes)", id, usage, size);
        Ok(id)
    }

    fn resize_buffer(&mut self, buffer: BufferId, size: usize) -> Result<(), DeviceError> {
        let current = self.host(buffer)?.data.len();
        if size > current {
            self.reserve(size - current)?;
        }
        let host = self
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        host.data.resize(size, 0);
        self.allocated = self.allocated - current + size;
        log::trace!("Resized {} from {} to {} bytes", buffer, current, size);
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferId) -> Result<usize, DeviceError> {
        Ok(self.host(buffer)?.data.len())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, bytes: &[u8]) -> Result<(), DeviceError> {
        let host = self
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        let size = host.data.len();
        let end = offset.checked_add(bytes.len()).filter(|&end| end <= size);
        match end {
            Some(end) => {
                host.data[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(DeviceError::OutOfBounds {
                buffer,
                offset,
                len: bytes.len(),
                size,
            }),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError> {
        let host = self
            .buffers
            .remove(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        self.allocated -= host.data.len();
        self.bindings.retain(|_, bound| *bound != buffer);
        Ok(())
    }

    fn bind_buffer(&mut self, buffer: BufferId, binding: BindingPoint) -> Result<(), DeviceError> {
        self.host(buffer)?;
        self.bindings.insert(binding, buffer);
        Ok(())
    }

    fn multi_draw_indirect(
        &mut self,
        pipeline: PipelineId,
        commands: BufferId,
        count: u32,
    ) -> Result<(), DeviceError> {
        let host = self.host(commands)?;
        if host.usage != BufferUsage::Indirect {
            return Err(DeviceError::WrongUsage {
                buffer: commands,
                actual: host.usage,
                expected: BufferUsage::Indirect,
            });
        }
        let mut bindings: Vec<_> = self.bindings.iter().map(|(&b, &id)| (b, id)).collect();
        bindings.sort();
        self.draw_log.push(DrawCall {
            pipeline,
            commands,
            count,
            bindings,
        });
        Ok(())
    }
}
