//! Aligned byte arena for per-frame upload buffers
//!
//! Uniform blocks and storage streams of one frame are laid out back to back
//! in a single host buffer. Every region starts at a multiple of the device's
//! minimum offset alignment so it can be bound directly as a descriptor range.
//! The backing `Vec` is cleared, not freed, between frames.

use crate::blocks::GpuBlock;

/// A bound range inside an upload buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// Byte offset from the start of the buffer
    pub offset: u64,
    /// Byte length of the range, never zero
    pub range: u64,
}

impl Region {
    /// One past the last byte of the region
    pub const fn end(&self) -> u64 {
        self.offset + self.range
    }
}

/// Host-side staging arena with aligned region starts
#[derive(Debug, Clone)]
pub struct BlockArena {
    bytes: Vec<u8>,
    alignment: u64,
}

impl BlockArena {
    /// Create an arena with the given region alignment and initial capacity
    ///
    /// `alignment` must be a power of two; `BindingConfig::validate` checks the
    /// configured values. Zero is treated as one.
    pub fn new(alignment: u64, capacity: usize) -> Self {
        debug_assert!(
            alignment == 0 || alignment.is_power_of_two(),
            "region alignment {} is not a power of two",
            alignment
        );
        Self {
            bytes: Vec::with_capacity(capacity),
            alignment: alignment.max(1),
        }
    }

    /// Region start alignment
    pub const fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Drop all regions, keeping the allocation
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Bytes written so far, including alignment padding
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been written since the last clear
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Allocated capacity in bytes
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Contents to upload
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append one host block
    pub fn push_block<T: GpuBlock>(&mut self, block: &T) -> Region {
        self.push_bytes(bytemuck::bytes_of(block))
    }

    /// Append raw bytes at the next aligned offset
    ///
    /// An empty slice still reserves one zeroed byte so the returned range is
    /// valid for a descriptor.
    pub fn push_bytes(&mut self, data: &[u8]) -> Region {
        let offset = align_up(self.bytes.len() as u64, self.alignment);
        self.bytes.resize(offset as usize, 0);

        if data.is_empty() {
            self.bytes.push(0);
            return Region { offset, range: 1 };
        }

        self.bytes.extend_from_slice(data);
        Region {
            offset,
            range: data.len() as u64,
        }
    }

    /// Bytes of a previously returned region
    pub fn region_bytes(&self, region: Region) -> Option<&[u8]> {
        self.bytes.get(region.offset as usize..region.end() as usize)
    }
}

/// Round `value` up to a multiple of the power-of-two `alignment`
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
