//! Vulkan backend built on ash
//!
//! Owns the upload buffers, descriptor pools and pipeline layouts created
//! for the binder. The device, render pass and command buffers belong to the
//! application; draws are recorded into whichever command buffer was set last
//! with [`VulkanBackend::set_command_buffer`].

pub mod buffer;
pub mod commands;
pub mod descriptors;
pub mod pipeline;
pub mod sync;

use std::collections::HashMap;

use ash::{vk, Device, Instance};

pub use buffer::HostBuffer;
pub use descriptors::{DescriptorAllocator, TextureBindings};
pub use pipeline::{AshPipeline, PipelineBuilder, SpirvPipelineBuilder, VertexInput};
pub use sync::AshFence;

use crate::backend::{
    BufferUsage, DescriptorWrite, FenceFactory, PipelineFactory, ResourceBinder, ResourceTypes, UploadTarget,
};
use crate::error::{BindingError, BindingResult};
use crate::pipeline::{PipelineLayoutDesc, SetLayout};

/// Descriptor sets a frame slot may allocate before its pool runs dry
pub const DEFAULT_SETS_PER_SLOT: u32 = 1024;

/// ash implementation of every backend trait
pub struct VulkanBackend<P: PipelineBuilder> {
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    command_buffer: vk::CommandBuffer,
    buffers: HashMap<vk::Buffer, HostBuffer>,
    descriptors: DescriptorAllocator,
    pipelines: Vec<AshPipeline>,
    builder: P,
}

impl<P: PipelineBuilder> VulkanBackend<P> {
    /// Create a backend with one descriptor pool per frame slot
    pub fn new(
        device: Device,
        instance: Instance,
        physical_device: vk::PhysicalDevice,
        frame_slots: usize,
        builder: P,
    ) -> BindingResult<Self> {
        let descriptors = DescriptorAllocator::new(device.clone(), frame_slots, DEFAULT_SETS_PER_SLOT)?;
        log::info!("Vulkan binding backend ready with {} frame slots", frame_slots);

        Ok(Self {
            device,
            instance,
            physical_device,
            command_buffer: vk::CommandBuffer::null(),
            buffers: HashMap::new(),
            descriptors,
            pipelines: Vec::new(),
            builder,
        })
    }

    /// Command buffer subsequent draws are recorded into
    pub fn set_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffer = command_buffer;
    }

    /// Sampler and atlas views bound by sprite and text sets
    pub fn set_textures(&mut self, textures: TextureBindings) {
        self.descriptors.set_textures(textures);
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn host_buffer(&self, buffer: vk::Buffer) -> BindingResult<&HostBuffer> {
        self.buffers.get(&buffer).ok_or(BindingError::UnknownBuffer)
    }
}

impl<P: PipelineBuilder> Drop for VulkanBackend<P> {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            for pipeline in self.pipelines.drain(..) {
                self.device.destroy_pipeline(pipeline.pipeline, None);
                self.device.destroy_pipeline_layout(pipeline.layout, None);
            }
        }
    }
}

impl<P: PipelineBuilder> ResourceTypes for VulkanBackend<P> {
    type Pipeline = AshPipeline;
    type DescriptorSet = vk::DescriptorSet;
    type Buffer = vk::Buffer;
}

impl<P: PipelineBuilder> UploadTarget for VulkanBackend<P> {
    fn create_host_buffer(&mut self, usage: BufferUsage, size: u64) -> BindingResult<vk::Buffer> {
        let buffer = HostBuffer::new(self.device.clone(), &self.instance, self.physical_device, usage, size)?;
        let handle = buffer.handle();
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn buffer_capacity(&self, buffer: vk::Buffer) -> BindingResult<u64> {
        Ok(self.host_buffer(buffer)?.size())
    }

    fn ensure_capacity(&mut self, buffer: vk::Buffer, usage: BufferUsage, size: u64) -> BindingResult<vk::Buffer> {
        let current = self.host_buffer(buffer)?;
        if current.usage() != usage {
            return Err(BindingError::Backend(format!(
                "buffer {:?} is a {:?} buffer, not {:?}",
                buffer,
                current.usage(),
                usage
            )));
        }
        if current.size() >= size {
            return Ok(buffer);
        }

        log::debug!("Growing {:?} buffer from {} to {} bytes", usage, current.size(), size);
        let replacement = self.create_host_buffer(usage, size)?;
        self.buffers.remove(&buffer);
        Ok(replacement)
    }

    fn upload(&mut self, buffer: vk::Buffer, offset: u64, bytes: &[u8]) -> BindingResult<()> {
        self.host_buffer(buffer)?.write_at(offset, bytes)
    }
}

impl<P: PipelineBuilder> ResourceBinder for VulkanBackend<P> {
    fn descriptor_set(
        &mut self,
        frame_slot: usize,
        layout: &SetLayout,
        writes: &[DescriptorWrite<vk::Buffer>],
    ) -> BindingResult<vk::DescriptorSet> {
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
        self.descriptors.allocate(frame_slot, layout, writes)
    }

    fn reset_descriptor_sets(&mut self, frame_slot: usize) -> BindingResult<()> {
        self.descriptors.reset(frame_slot)
    }
}

impl<P: PipelineBuilder> PipelineFactory for VulkanBackend<P> {
    fn create_pipeline(&mut self, layout: &PipelineLayoutDesc) -> BindingResult<AshPipeline> {
        // Gaps in the set indices get empty layouts
        let set_count = layout.set_indices().max().map_or(0, |last| last + 1);
        let mut set_layouts = Vec::with_capacity(set_count as usize);
        for set in 0..set_count {
            let handle = match layout.set(set) {
                Some(set_layout) => self.descriptors.set_layout(set_layout)?,
                None => self.descriptors.set_layout(&SetLayout { set, bindings: Vec::new() })?,
            };
            set_layouts.push(handle);
        }

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let pipeline_layout = unsafe { self.device.create_pipeline_layout(&layout_info, None)? };

        let pipeline = match self.builder.build(&self.device, pipeline_layout, layout.shaders) {
            Ok(pipeline) => pipeline,
            Err(error) => {
                unsafe { self.device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(error);
            }
        };

        let handle = AshPipeline {
            pipeline,
            layout: pipeline_layout,
        };
        self.pipelines.push(handle);
        log::debug!("Created Vulkan pipeline for {} with {} sets", layout.shaders, set_count);
        Ok(handle)
    }
}

impl<P: PipelineBuilder> FenceFactory for VulkanBackend<P> {
    type Fence = AshFence;

    fn create_fence(&mut self, signaled: bool) -> BindingResult<AshFence> {
        AshFence::new(self.device.clone(), signaled)
    }
}
