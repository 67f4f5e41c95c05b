//! # Indirect command builder
//!
//! CPU staging for one renderer's draw command stream and the parallel
//! instance buffer. Base instances are claimed from a shared atomic counter,
//! so the slots written during one culling run are exactly `0..count`.
//! [`IndirectCommandBuilder::count`] reads and resets the counter and must be
//! called once per run, after the run completes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::device::{BindingPoint, BufferId, BufferUsage, DeviceError, GraphicsDevice};
use super::gpu_data::{DrawCommand, InstanceData};

/// Minimum element capacity of a freshly created device buffer
const MIN_CAPACITY: usize = 64;

/// Staging and device buffers for one indirect draw stream
#[derive(Debug)]
pub struct IndirectCommandBuilder {
    counter: Arc<AtomicU32>,
    commands: Vec<DrawCommand>,
    instances: Vec<InstanceData>,
    command_buffer: Option<BufferId>,
    instance_buffer: Option<BufferId>,
    capacity: usize,
}

impl Default for IndirectCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndirectCommandBuilder {
    /// Empty builder; device buffers are created on first upload
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU32::new(0)),
            commands: Vec::new(),
            instances: Vec::new(),
            command_buffer: None,
            instance_buffer: None,
            capacity: 0,
        }
    }

    /// Prepare staging for a run over `instances` candidates
    pub fn begin(&mut self, instances: usize) {
        self.counter.store(0, Ordering::Release);
        self.commands.clear();
        self.commands.resize(instances, DrawCommand::default());
        self.instances.clear();
        self.instances.resize(instances, InstanceData::default());
    }

    /// Shared base-instance counter handed to culling batches
    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.counter)
    }

    /// Claim the next base instance
    pub fn claim(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Stage a command and its instance data at `slot`
    pub fn write(&mut self, slot: u32, command: DrawCommand, instance: InstanceData) {
        let slot = slot as usize;
        if slot >= self.commands.len() {
            log::warn!("Dropping draw command for slot {} beyond {} staged", slot, self.commands.len());
            return;
        }
        self.commands[slot] = command;
        self.instances[slot] = instance;
    }

    /// Number of base instances claimed this run; resets the counter
    pub fn count(&self) -> u32 {
        self.counter.swap(0, Ordering::AcqRel)
    }

    /// Detach from the current counter so late claims from an abandoned
    /// run cannot leak into the next one.
    pub fn abandon_counter(&mut self) {
        self.counter = Arc::new(AtomicU32::new(0));
    }

    /// Staged commands of the current run
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Staged instance data of the current run
    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    /// Device buffer holding the command stream
    pub fn command_buffer(&self) -> Option<BufferId> {
        self.command_buffer
    }

    /// Device buffer holding the instance data
    pub fn instance_buffer(&self) -> Option<BufferId> {
        self.instance_buffer
    }

    /// Copy the first `count` staged entries to the device, growing buffers
    /// geometrically when needed.
    pub fn upload(&mut self, device: &mut dyn GraphicsDevice, count: u32) -> Result<(), DeviceError> {
        let count = (count as usize).min(self.commands.len());
        self.reserve(device, count)?;
        if count == 0 {
            return Ok(());
        }
        if let (Some(commands), Some(instances)) = (self.command_buffer, self.instance_buffer) {
            device.write_buffer(commands, 0, bytemuck::cast_slice(&self.commands[..count]))?;
            device.write_buffer(instances, 0, bytemuck::cast_slice(&self.instances[..count]))?;
        }
        Ok(())
    }

    /// Bind the instance buffer for drawing
    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<(), DeviceError> {
        if let Some(instances) = self.instance_buffer {
            device.bind_buffer(instances, BindingPoint::Instances)?;
        }
        Ok(())
    }

    /// Release device buffers
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), DeviceError> {
        if let Some(buffer) = self.command_buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        if let Some(buffer) = self.instance_buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        self.capacity = 0;
        Ok(())
    }

    fn reserve(&mut self, device: &mut dyn GraphicsDevice, needed: usize) -> Result<(), DeviceError> {
        if self.command_buffer.is_some() && needed <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity.max(MIN_CAPACITY);
        while capacity < needed {
            capacity *= 2;
        }
        let command_bytes = capacity * std::mem::size_of::<DrawCommand>();
        let instance_bytes = capacity * std::mem::size_of::<InstanceData>();
        match (self.command_buffer, self.instance_buffer) {
            (Some(commands), Some(instances)) => {
                device.resize_buffer(commands, command_bytes)?;
                device.resize_buffer(instances, instance_bytes)?;
            }
            _ => {
                self.command_buffer = Some(device.create_buffer(BufferUsage::Indirect, command_bytes)?);
                self.instance_buffer = Some(device.create_buffer(BufferUsage::Storage, instance_bytes)?);
            }
        }
        log::debug!("Indirect buffers grew from {} to {} commands", self.capacity, capacity);
        self.capacity = capacity;
        Ok(())
    }
}
