//! # Backend Module
//!
//! The binding layer talks to the GPU only through the traits in this module.
//! Each trait covers one collaborator:
//!
//! - **UploadTarget**: host-visible buffers that packed bytes are copied into
//! - **ResourceBinder**: descriptor sets pointing at uploaded regions
//! - **PipelineFactory**: backend pipeline objects for validated layouts
//! - **CommandSink**: the command stream draws are recorded into
//! - **FenceFactory** / **GpuFence**: CPU-GPU synchronization per frame slot
//!
//! Two implementations are provided: `vulkan` (ash) and `recording`, an
//! in-memory backend that keeps every command and byte for inspection.

pub mod recording;
pub mod vulkan;

use std::fmt::Debug;

use crate::arena::Region;
use crate::error::BindingResult;
use crate::pipeline::{PipelineLayoutDesc, SetLayout};

/// Handle types of a backend
pub trait ResourceTypes {
    /// Pipeline object, bound by handle
    type Pipeline: Copy + Debug;
    /// Descriptor set handle
    type DescriptorSet: Copy + Debug;
    /// Buffer handle
    type Buffer: Copy + Debug + PartialEq;
}

/// Usage of a host-visible upload buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Uniform blocks
    Uniform,
    /// Storage arrays
    Storage,
}

/// Command stream a frame is recorded into
pub trait CommandSink: ResourceTypes {
    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: Self::Pipeline);

    /// Bind one descriptor set at `set` of the pipeline layout
    fn bind_descriptor_set(&mut self, pipeline: Self::Pipeline, set: u32, descriptor_set: Self::DescriptorSet);

    /// Bind a vertex buffer at binding 0
    fn bind_vertex_buffer(&mut self, buffer: Self::Buffer, offset: u64);

    /// Bind a `u16` index buffer
    fn bind_index_buffer(&mut self, buffer: Self::Buffer, offset: u64);

    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Indexed draw
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}

/// Host-visible buffers receiving packed bytes
pub trait UploadTarget: ResourceTypes {
    /// Create a buffer of `size` bytes
    fn create_host_buffer(&mut self, usage: BufferUsage, size: u64) -> BindingResult<Self::Buffer>;

    /// Capacity of a buffer in bytes
    fn buffer_capacity(&self, buffer: Self::Buffer) -> BindingResult<u64>;

    /// Make sure `buffer` holds at least `size` bytes
    ///
    /// May replace the buffer; the returned handle is the one to use. Only
    /// called for buffers whose frame slot has retired.
    fn ensure_capacity(&mut self, buffer: Self::Buffer, usage: BufferUsage, size: u64) -> BindingResult<Self::Buffer>;

    /// Copy `bytes` into `buffer` at `offset`
    fn upload(&mut self, buffer: Self::Buffer, offset: u64, bytes: &[u8]) -> BindingResult<()>;
}

/// A buffer region written into one binding of a descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite<B> {
    /// Binding index
    pub binding: u32,
    /// Buffer holding the region
    pub buffer: B,
    /// Bound range
    pub region: Region,
}

/// Descriptor sets for uploaded regions
///
/// Sampler and atlas bindings are owned by the backend and filled in when a
/// set declaring them is allocated.
pub trait ResourceBinder: ResourceTypes {
    /// Allocate a set for `frame_slot` and write its buffer bindings
    fn descriptor_set(
        &mut self,
        frame_slot: usize,
        layout: &SetLayout,
        writes: &[DescriptorWrite<Self::Buffer>],
    ) -> BindingResult<Self::DescriptorSet>;

    /// Release every set allocated for `frame_slot`
    fn reset_descriptor_sets(&mut self, frame_slot: usize) -> BindingResult<()>;
}

/// Backend pipeline construction
pub trait PipelineFactory: ResourceTypes {
    /// Build a pipeline for a validated layout
    fn create_pipeline(&mut self, layout: &PipelineLayoutDesc) -> BindingResult<Self::Pipeline>;
}

/// CPU-visible completion signal of submitted GPU work
pub trait GpuFence {
    /// Whether the fence is signaled
    fn is_signaled(&self) -> BindingResult<bool>;

    /// Block until signaled or `timeout_ns` elapses
    fn wait(&self, timeout_ns: u64) -> BindingResult<()>;

    /// Return the fence to the unsignaled state
    fn reset(&self) -> BindingResult<()>;
}

/// Fence construction
pub trait FenceFactory {
    /// Fence type
    type Fence: GpuFence;

    /// Create a fence, optionally already signaled
    fn create_fence(&mut self, signaled: bool) -> BindingResult<Self::Fence>;
}

/// Everything the frame binder needs from a backend
pub trait RenderBackend: CommandSink + UploadTarget + ResourceBinder + PipelineFactory + FenceFactory {}

impl<T> RenderBackend for T where T: CommandSink + UploadTarget + ResourceBinder + PipelineFactory + FenceFactory {}
