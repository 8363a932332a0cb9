//! Instance data streams
//!
//! A stream is the host copy of a storage buffer array read through
//! `gl_InstanceIndex`: element `i` is what instance `i` sees. Elements are
//! kept in push order and packed at the block stride.

use crate::arena::{BlockArena, Region};
use crate::blocks::{check_atlas_index, GpuBlock, MeshInstanceBlock, SpriteInstanceBlock};
use crate::error::FrameWarning;
use crate::foundation::math::{Mat3, Mat4};
use crate::scene::SpriteInstance;

/// Ordered storage array of one block type
#[derive(Debug, Clone)]
pub struct InstanceStream<T: GpuBlock> {
    elements: Vec<T>,
    pushed: usize,
    dropped: usize,
}

impl<T: GpuBlock> Default for InstanceStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: GpuBlock> InstanceStream<T> {
    /// Empty stream
    pub const fn new() -> Self {
        Self {
            elements: Vec::new(),
            pushed: 0,
            dropped: 0,
        }
    }

    /// Empty stream with room for `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            pushed: 0,
            dropped: 0,
        }
    }

    /// Drop all elements, keeping the allocation
    pub fn clear(&mut self) {
        self.elements.clear();
        self.pushed = 0;
        self.dropped = 0;
    }

    /// Append a packed element, returning its instance index
    pub fn push_block(&mut self, block: T) -> u32 {
        let index = self.elements.len() as u32;
        self.elements.push(block);
        self.pushed += 1;
        index
    }

    /// Number of packed elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the stream holds no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Inputs rejected since the last clear
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// Element read by `gl_InstanceIndex == index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.elements.get(index)
    }

    /// Element stride in bytes
    pub const fn stride(&self) -> usize {
        T::SIZE
    }

    /// Packed array, `len() * stride()` bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.elements.as_slice())
    }

    /// Copy the packed array into a storage arena
    pub fn write_to(&self, arena: &mut BlockArena) -> Region {
        arena.push_bytes(self.as_bytes())
    }
}

impl InstanceStream<SpriteInstanceBlock> {
    /// Append a sprite or text instance
    ///
    /// An atlas index past the atlas array drops the instance; the warning
    /// carries its position among the inputs pushed since the last clear.
    pub fn push(&mut self, transform: &Mat3, atlas_index: u32) -> Result<u32, FrameWarning> {
        let position = self.pushed;
        match check_atlas_index(atlas_index, position) {
            Ok(atlas_index) => Ok(self.push_block(SpriteInstanceBlock::new(transform, atlas_index))),
            Err(warning) => {
                self.pushed += 1;
                self.dropped += 1;
                Err(warning)
            }
        }
    }

    /// Append a batch, forwarding every rejected instance to `on_warning`
    ///
    /// Returns the number of instances packed.
    pub fn extend_sprites(
        &mut self,
        instances: &[SpriteInstance],
        mut on_warning: impl FnMut(FrameWarning),
    ) -> u32 {
        let before = self.len();
        for instance in instances {
            if let Err(warning) = self.push(&instance.transform, instance.atlas_index) {
                on_warning(warning);
            }
        }
        (self.len() - before) as u32
    }
}

impl InstanceStream<MeshInstanceBlock> {
    /// Append a mesh instance
    pub fn push(&mut self, model: &Mat4) -> u32 {
        self.push_block(MeshInstanceBlock::from_matrix(model))
    }
}
