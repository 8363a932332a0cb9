//! Descriptor set layouts and per-slot descriptor pools

use std::collections::HashMap;

use ash::{vk, Device};

use crate::backend::DescriptorWrite;
use crate::error::{BindingError, BindingResult};
use crate::layout::{DescriptorKind, ShaderStages};
use crate::pipeline::SetLayout;

/// Sampler and atlas views written into sampler / image array bindings
#[derive(Debug, Clone, Default)]
pub struct TextureBindings {
    /// Sampler shared by every atlas
    pub sampler: vk::Sampler,
    /// Atlas image views in atlas index order
    pub atlas_views: Vec<vk::ImageView>,
}

/// Owns set layouts and one descriptor pool per frame slot
pub struct DescriptorAllocator {
    device: Device,
    pools: Vec<vk::DescriptorPool>,
    set_layouts: HashMap<SetLayout, vk::DescriptorSetLayout>,
    textures: TextureBindings,
}

impl DescriptorAllocator {
    /// Create one pool per frame slot, each holding `sets_per_slot` sets
    pub fn new(device: Device, frame_slots: usize, sets_per_slot: u32) -> BindingResult<Self> {
        let mut allocator = Self {
            device,
            pools: Vec::with_capacity(frame_slots),
            set_layouts: HashMap::new(),
            textures: TextureBindings::default(),
        };

        let pool_sizes = [
            pool_size(vk::DescriptorType::UNIFORM_BUFFER, sets_per_slot * 2),
            pool_size(vk::DescriptorType::STORAGE_BUFFER, sets_per_slot),
            pool_size(vk::DescriptorType::SAMPLER, sets_per_slot),
            pool_size(vk::DescriptorType::SAMPLED_IMAGE, sets_per_slot * crate::blocks::MAX_ATLASES as u32),
        ];

        for _ in 0..frame_slots {
            let pool_info = vk::DescriptorPoolCreateInfo::builder()
                .max_sets(sets_per_slot)
                .pool_sizes(&pool_sizes);
            // Pools created so far are released by Drop on failure
            let pool = unsafe { allocator.device.create_descriptor_pool(&pool_info, None)? };
            allocator.pools.push(pool);
        }

        Ok(allocator)
    }

    /// Replace the sampler and atlas views used for new sets
    pub fn set_textures(&mut self, textures: TextureBindings) {
        self.textures = textures;
    }

    /// Vulkan layout for a merged set layout, created on first use
    pub fn set_layout(&mut self, layout: &SetLayout) -> BindingResult<vk::DescriptorSetLayout> {
        if let Some(&handle) = self.set_layouts.get(layout) {
            return Ok(handle);
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type(binding.kind))
                    .descriptor_count(binding.kind.descriptor_count())
                    .stage_flags(stage_flags(binding.stages))
                    .build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let handle = unsafe { self.device.create_descriptor_set_layout(&create_info, None)? };

        log::debug!("Created descriptor set layout for set {} ({} bindings)", layout.set, bindings.len());
        self.set_layouts.insert(layout.clone(), handle);
        Ok(handle)
    }

    /// Allocate a set from the slot's pool and write it
    pub fn allocate(
        &mut self,
        frame_slot: usize,
        layout: &SetLayout,
        writes: &[DescriptorWrite<vk::Buffer>],
    ) -> BindingResult<vk::DescriptorSet> {
        layout.check_writes(writes)?;

        let pool = *self
            .pools
            .get(frame_slot)
            .ok_or_else(|| BindingError::Backend(format!("no descriptor pool for frame slot {}", frame_slot)))?;
        let set_layouts = [self.set_layout(layout)?];

        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? }[0];

        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
            .iter()
            .map(|write| {
                [vk::DescriptorBufferInfo {
                    buffer: write.buffer,
                    offset: write.region.offset,
                    range: write.region.range,
                }]
            })
            .collect();

        let sampler_info = [vk::DescriptorImageInfo {
            sampler: self.textures.sampler,
            ..Default::default()
        }];
        let atlas_infos: Vec<vk::DescriptorImageInfo> = self
            .textures
            .atlas_views
            .iter()
            .map(|&image_view| vk::DescriptorImageInfo {
                image_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ..Default::default()
            })
            .collect();

        let mut descriptor_writes = Vec::with_capacity(layout.bindings.len());
        for (write, info) in writes.iter().zip(&buffer_infos) {
            let kind = layout.binding(write.binding).map(|b| b.kind);
            let Some(kind) = kind else { continue };
            descriptor_writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(descriptor_type(kind))
                    .buffer_info(info)
                    .build(),
            );
        }

        for binding in &layout.bindings {
            match binding.kind {
                DescriptorKind::Sampler if self.textures.sampler != vk::Sampler::null() => {
                    descriptor_writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(set)
                            .dst_binding(binding.binding)
                            .descriptor_type(vk::DescriptorType::SAMPLER)
                            .image_info(&sampler_info)
                            .build(),
                    );
                }
                DescriptorKind::SampledImageArray { count } if !atlas_infos.is_empty() => {
                    let len = atlas_infos.len().min(count as usize);
                    descriptor_writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(set)
                            .dst_binding(binding.binding)
                            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                            .image_info(&atlas_infos[..len])
                            .build(),
                    );
                }
                _ => {}
            }
        }

        unsafe { self.device.update_descriptor_sets(&descriptor_writes, &[]) };
        Ok(set)
    }

    /// Return every set of a slot to its pool
    pub fn reset(&mut self, frame_slot: usize) -> BindingResult<()> {
        if let Some(&pool) = self.pools.get(frame_slot) {
            unsafe {
                self.device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
        }
        Ok(())
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            for &pool in &self.pools {
                self.device.destroy_descriptor_pool(pool, None);
            }
            for (_, layout) in self.set_layouts.drain() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

fn pool_size(ty: vk::DescriptorType, descriptor_count: u32) -> vk::DescriptorPoolSize {
    vk::DescriptorPoolSize { ty, descriptor_count }
}

/// Vulkan descriptor type of a binding kind
pub fn descriptor_type(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorKind::SampledImageArray { .. } => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

/// Vulkan stage mask of a binding
pub fn stage_flags(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}
