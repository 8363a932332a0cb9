//! In-memory backend
//!
//! Keeps every recorded command, every uploaded byte and every descriptor
//! write so tests and tools can inspect exactly what a frame would hand the
//! GPU. Fences model submission: a submitted fence signals when it is waited
//! on, unless the backend is told the GPU is stalled.

use std::cell::Cell;
use std::rc::Rc;

use ash::vk;

use super::{
    BufferUsage, CommandSink, DescriptorWrite, FenceFactory, GpuFence, PipelineFactory,
    ResourceBinder, ResourceTypes, UploadTarget,
};
use crate::arena::Region;
use crate::error::{BindingError, BindingResult};
use crate::pipeline::{PipelineLayoutDesc, SetLayout};

/// Pipeline handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedPipeline(pub u32);

/// Descriptor set handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedSet(pub u32);

/// Buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedBuffer(pub u32);

/// One recorded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedCommand {
    /// `vkCmdBindPipeline`
    BindPipeline(RecordedPipeline),
    /// `vkCmdBindDescriptorSets` with a single set
    BindDescriptorSet {
        /// Pipeline whose layout the set is bound against
        pipeline: RecordedPipeline,
        /// Set index
        set: u32,
        /// Bound set
        descriptor_set: RecordedSet,
    },
    /// `vkCmdBindVertexBuffers` at binding 0
    BindVertexBuffer {
        /// Buffer
        buffer: RecordedBuffer,
        /// Byte offset
        offset: u64,
    },
    /// `vkCmdBindIndexBuffer` with `u16` indices
    BindIndexBuffer {
        /// Buffer
        buffer: RecordedBuffer,
        /// Byte offset
        offset: u64,
    },
    /// `vkCmdDraw`
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex
        first_vertex: u32,
        /// First instance
        first_instance: u32,
    },
    /// `vkCmdDrawIndexed`
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index
        first_index: u32,
        /// Vertex offset
        vertex_offset: i32,
        /// First instance
        first_instance: u32,
    },
}

impl RecordedCommand {
    /// Whether the command is a draw
    pub const fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }
}

/// A descriptor set as allocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDescriptorSet {
    /// Frame slot the set belongs to
    pub frame_slot: usize,
    /// Layout the set was allocated with
    pub layout: SetLayout,
    /// Buffer writes
    pub writes: Vec<DescriptorWrite<RecordedBuffer>>,
}

#[derive(Debug)]
struct RecordedBufferData {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: Cell<bool>,
    submitted: Cell<bool>,
}

/// Fence of the recording backend
#[derive(Debug, Clone)]
pub struct RecordedFence {
    state: Rc<FenceState>,
    gpu_stalled: Rc<Cell<bool>>,
    waits: Rc<Cell<usize>>,
}

impl RecordedFence {
    /// Whether work was submitted with this fence and has not completed
    pub fn is_pending(&self) -> bool {
        self.state.submitted.get() && !self.state.signaled.get()
    }
}

impl GpuFence for RecordedFence {
    fn is_signaled(&self) -> BindingResult<bool> {
        Ok(self.state.signaled.get())
    }

    fn wait(&self, _timeout_ns: u64) -> BindingResult<()> {
        if self.state.signaled.get() {
            return Ok(());
        }
        if !self.state.submitted.get() || self.gpu_stalled.get() {
            return Err(BindingError::Vulkan(vk::Result::TIMEOUT));
        }

        self.state.submitted.set(false);
        self.state.signaled.set(true);
        self.waits.set(self.waits.get() + 1);
        Ok(())
    }

    fn reset(&self) -> BindingResult<()> {
        self.state.signaled.set(false);
        Ok(())
    }
}

/// Backend that records instead of executing
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<RecordedCommand>,
    buffers: Vec<Option<RecordedBufferData>>,
    pipelines: Vec<PipelineLayoutDesc>,
    descriptor_sets: Vec<Option<RecordedDescriptorSet>>,
    submissions: usize,
    gpu_stalled: Rc<Cell<bool>>,
    fence_waits: Rc<Cell<usize>>,
}

impl RecordingBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands recorded since the last `take_commands`
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the stream empty
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of draws recorded since the last `take_commands`
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Contents of a buffer
    pub fn buffer_bytes(&self, buffer: RecordedBuffer) -> Option<&[u8]> {
        self.buffer(buffer).ok().map(|data| data.bytes.as_slice())
    }

    /// Bytes of a region of a buffer
    pub fn region_bytes(&self, buffer: RecordedBuffer, region: Region) -> Option<&[u8]> {
        self.buffer_bytes(buffer)?.get(region.offset as usize..region.end() as usize)
    }

    /// Layout a pipeline was created with
    pub fn pipeline_layout(&self, pipeline: RecordedPipeline) -> Option<&PipelineLayoutDesc> {
        self.pipelines.get(pipeline.0 as usize)
    }

    /// Number of pipelines created
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// A live descriptor set
    pub fn descriptor(&self, set: RecordedSet) -> Option<&RecordedDescriptorSet> {
        self.descriptor_sets.get(set.0 as usize)?.as_ref()
    }

    /// Mark work submitted with `fence`
    pub fn submit(&mut self, fence: &RecordedFence) {
        fence.state.signaled.set(false);
        fence.state.submitted.set(true);
        self.submissions += 1;
    }

    /// Number of submissions
    pub const fn submissions(&self) -> usize {
        self.submissions
    }

    /// Fence waits that had to block on submitted work
    pub fn fence_waits(&self) -> usize {
        self.fence_waits.get()
    }

    /// While stalled, waiting on a submitted fence times out
    pub fn set_gpu_stalled(&mut self, stalled: bool) {
        self.gpu_stalled.set(stalled);
    }

    fn buffer(&self, buffer: RecordedBuffer) -> BindingResult<&RecordedBufferData> {
        self.buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BindingError::UnknownBuffer)
    }

    fn buffer_mut(&mut self, buffer: RecordedBuffer) -> BindingResult<&mut RecordedBufferData> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BindingError::UnknownBuffer)
    }
}

impl ResourceTypes for RecordingBackend {
    type Pipeline = RecordedPipeline;
    type DescriptorSet = RecordedSet;
    type Buffer = RecordedBuffer;
}

impl CommandSink for RecordingBackend {
    fn bind_pipeline(&mut self, pipeline: RecordedPipeline) {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_set(&mut self, pipeline: RecordedPipeline, set: u32, descriptor_set: RecordedSet) {
        self.commands.push(RecordedCommand::BindDescriptorSet { pipeline, set, descriptor_set });
    }

    fn bind_vertex_buffer(&mut self, buffer: RecordedBuffer, offset: u64) {
        self.commands.push(RecordedCommand::BindVertexBuffer { buffer, offset });
    }

    fn bind_index_buffer(&mut self, buffer: RecordedBuffer, offset: u64) {
        self.commands.push(RecordedCommand::BindIndexBuffer { buffer, offset });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }
}

impl UploadTarget for RecordingBackend {
    fn create_host_buffer(&mut self, usage: BufferUsage, size: u64) -> BindingResult<RecordedBuffer> {
        let handle = RecordedBuffer(self.buffers.len() as u32);
        self.buffers.push(Some(RecordedBufferData {
            usage,
            bytes: vec![0; size as usize],
        }));
        Ok(handle)
    }

    fn buffer_capacity(&self, buffer: RecordedBuffer) -> BindingResult<u64> {
        Ok(self.buffer(buffer)?.bytes.len() as u64)
    }

    fn ensure_capacity(&mut self, buffer: RecordedBuffer, usage: BufferUsage, size: u64) -> BindingResult<RecordedBuffer> {
        let data = self.buffer_mut(buffer)?;
        if data.usage != usage {
            return Err(BindingError::Backend(format!(
                "buffer {:?} is a {:?} buffer, not {:?}",
                buffer, data.usage, usage
            )));
        }
        if (data.bytes.len() as u64) < size {
            data.bytes.resize(size as usize, 0);
        }
        Ok(buffer)
    }

    fn upload(&mut self, buffer: RecordedBuffer, offset: u64, bytes: &[u8]) -> BindingResult<()> {
        let data = self.buffer_mut(buffer)?;
        let capacity = data.bytes.len() as u64;
        let end = offset + bytes.len() as u64;
        if end > capacity {
            return Err(BindingError::UploadOutOfBounds {
                offset,
                len: bytes.len() as u64,
                capacity,
            });
        }
        data.bytes[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }
}

impl ResourceBinder for RecordingBackend {
    fn descriptor_set(
        &mut self,
        frame_slot: usize,
        layout: &SetLayout,
        writes: &[DescriptorWrite<RecordedBuffer>],
    ) -> BindingResult<RecordedSet> {
        layout.check_writes(writes)?;
        for write in writes {
            let capacity = self.buffer_capacity(write.buffer)?;
            if write.region.end() > capacity {
                return Err(BindingError::UploadOutOfBounds {
                    offset: write.region.offset,
                    len: write.region.range,
                    capacity,
                });
            }
        }

        let handle = RecordedSet(self.descriptor_sets.len() as u32);
        self.descriptor_sets.push(Some(RecordedDescriptorSet {
            frame_slot,
            layout: layout.clone(),
            writes: writes.to_vec(),
        }));
        Ok(handle)
    }

    fn reset_descriptor_sets(&mut self, frame_slot: usize) -> BindingResult<()> {
        for entry in &mut self.descriptor_sets {
            if entry.as_ref().map_or(false, |set| set.frame_slot == frame_slot) {
                *entry = None;
            }
        }
        Ok(())
    }
}

impl PipelineFactory for RecordingBackend {
    fn create_pipeline(&mut self, layout: &PipelineLayoutDesc) -> BindingResult<RecordedPipeline> {
        let handle = RecordedPipeline(self.pipelines.len() as u32);
        self.pipelines.push(layout.clone());
        Ok(handle)
    }
}

impl FenceFactory for RecordingBackend {
    type Fence = RecordedFence;

    fn create_fence(&mut self, signaled: bool) -> BindingResult<RecordedFence> {
        let state = FenceState::default();
        state.signaled.set(signaled);
        Ok(RecordedFence {
            state: Rc::new(state),
            gpu_stalled: Rc::clone(&self.gpu_stalled),
            waits: Rc::clone(&self.fence_waits),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_bounds() {
        let mut backend = RecordingBackend::new();
        let buffer = backend.create_host_buffer(BufferUsage::Uniform, 8).unwrap();

        backend.upload(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer_bytes(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
        assert!(matches!(
            backend.upload(buffer, 6, &[0; 4]),
            Err(BindingError::UploadOutOfBounds { offset: 6, len: 4, capacity: 8 })
        ));
    }

    #[test]
    fn test_ensure_capacity_grows_in_place() {
        let mut backend = RecordingBackend::new();
        let buffer = backend.create_host_buffer(BufferUsage::Storage, 16).unwrap();
        let grown = backend.ensure_capacity(buffer, BufferUsage::Storage, 1024).unwrap();

        assert_eq!(grown, buffer);
        assert_eq!(backend.buffer_capacity(buffer).unwrap(), 1024);
        assert!(backend.ensure_capacity(buffer, BufferUsage::Uniform, 8).is_err());
    }

    #[test]
    fn test_fence_signals_when_waited() {
        let mut backend = RecordingBackend::new();
        let fence = backend.create_fence(true).unwrap();

        fence.reset().unwrap();
        backend.submit(&fence);
        assert!(fence.is_pending());

        fence.wait(u64::MAX).unwrap();
        assert!(fence.is_signaled().unwrap());
        assert_eq!(backend.fence_waits(), 1);
    }

    #[test]
    fn test_stalled_fence_times_out() {
        let mut backend = RecordingBackend::new();
        let fence = backend.create_fence(false).unwrap();
        backend.submit(&fence);
        backend.set_gpu_stalled(true);

        assert!(matches!(fence.wait(1_000), Err(BindingError::Vulkan(vk::Result::TIMEOUT))));
        assert!(fence.is_pending());
    }

    #[test]
    fn test_reset_releases_slot_sets() {
        let mut backend = RecordingBackend::new();
        let layout = SetLayout { set: 1, bindings: Vec::new() };
        let first = backend.descriptor_set(0, &layout, &[]).unwrap();
        let second = backend.descriptor_set(1, &layout, &[]).unwrap();

        backend.reset_descriptor_sets(0).unwrap();
        assert!(backend.descriptor(first).is_none());
        assert!(backend.descriptor(second).is_some());
    }
}
