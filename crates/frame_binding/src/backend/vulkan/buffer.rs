//! Host-visible upload buffers
//!
//! RAII wrapper over a `vk::Buffer` and its dedicated allocation. Memory is
//! `HOST_VISIBLE | HOST_COHERENT`, so writes need no explicit flush.

use ash::{vk, Device, Instance};

use crate::backend::BufferUsage;
use crate::error::{BindingError, BindingResult};

/// Buffer with its own memory allocation
pub struct HostBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl HostBuffer {
    /// Create a buffer of `size` bytes for uniform or storage use
    pub fn new(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> BindingResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(1))
            .usage(usage_flags(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match find_memory_type(
            instance,
            physical_device,
            mem_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(index) => index,
            Err(error) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(error);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(error.into());
            }
        };

        if let Err(error) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(error.into());
        }

        log::debug!("Created {:?} upload buffer of {} bytes", usage, size);

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
        })
    }

    /// Copy `data` to `offset`
    pub fn write_at(&self, offset: vk::DeviceSize, data: &[u8]) -> BindingResult<()> {
        let len = data.len() as vk::DeviceSize;
        if offset + len > self.size {
            return Err(BindingError::UploadOutOfBounds {
                offset,
                len,
                capacity: self.size,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let dst = self
                .device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage the buffer was created for
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
    }
}

/// Find memory type with required properties
fn find_memory_type(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> BindingResult<u32> {
    let mem_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && mem_properties.memory_types[i as usize].property_flags.contains(properties)
        {
            return Ok(i);
        }
    }

    Err(BindingError::Backend("no host-visible coherent memory type".to_string()))
}
