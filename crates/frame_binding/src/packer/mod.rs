//! Per-frame uniform packing
//!
//! Serializes the frame block and every per-draw uniform block of a frame
//! into one std140 row-major upload buffer. The packer owns the buffer and
//! reuses its allocation across frames.

mod frame;

pub use frame::build_frame_block;

use crate::arena::{BlockArena, Region};
use crate::blocks::{check_atlas_index, MeshDataBlock, TextDataBlock, UiElementBlock};
use crate::error::FrameWarning;
use crate::foundation::math::{Mat3, Mat4};
use crate::scene::{AmbientLight, Camera, PointLight};

/// Writes uniform blocks into an aligned upload buffer
#[derive(Debug, Clone)]
pub struct UniformPacker {
    arena: BlockArena,
}

impl UniformPacker {
    /// Create a packer whose regions honour `alignment`
    pub fn new(alignment: u64, capacity: usize) -> Self {
        Self {
            arena: BlockArena::new(alignment, capacity),
        }
    }

    /// Start a new frame, discarding the previous contents
    pub fn begin(&mut self) {
        self.arena.clear();
    }

    /// Pack camera and lights
    ///
    /// Returns the frame block region and a `LightOverflow` when more lights
    /// were supplied than the block holds.
    pub fn pack_frame(
        &mut self,
        camera: &Camera,
        ambient: &AmbientLight,
        lights: &[PointLight],
    ) -> (Region, Option<FrameWarning>) {
        let (block, overflow) = build_frame_block(camera, ambient, lights);
        (self.arena.push_block(&block), overflow)
    }

    /// Pack the model matrix of one mesh
    pub fn pack_mesh(&mut self, model: &Mat4) -> Region {
        self.arena.push_block(&MeshDataBlock::from_matrix(model))
    }

    /// Pack a UI element transform
    pub fn pack_ui_element(&mut self, transform: &Mat3) -> Region {
        self.arena.push_block(&UiElementBlock::from_matrix(transform))
    }

    /// Pack the atlas index of a text batch
    ///
    /// Out-of-range indices pack nothing and return the warning; `position`
    /// identifies the batch in the caller's input.
    pub fn pack_text(&mut self, atlas_index: u32, position: usize) -> Result<Region, FrameWarning> {
        let atlas_index = check_atlas_index(atlas_index, position)?;
        Ok(self.arena.push_block(&TextDataBlock { atlas_index, _pad: [0; 3] }))
    }

    /// Packed bytes of the current frame
    pub fn bytes(&self) -> &[u8] {
        self.arena.as_bytes()
    }

    /// Bytes of one packed region
    pub fn region_bytes(&self, region: Region) -> Option<&[u8]> {
        self.arena.region_bytes(region)
    }

    /// Bytes packed so far
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether nothing was packed this frame
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Allocated capacity of the upload buffer
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::FrameDataBlock;
    use crate::foundation::math::gpu;

    #[test]
    fn test_frame_region_matches_block_size() {
        let mut packer = UniformPacker::new(256, 4096);
        packer.begin();
        let (region, warning) = packer.pack_frame(&Camera::default(), &AmbientLight::default(), &[]);

        assert_eq!(region, Region { offset: 0, range: 304 });
        assert!(warning.is_none());

        let bytes = packer.region_bytes(region).unwrap();
        let block: FrameDataBlock = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(block.projection, gpu::mat4_rows(&Mat4::identity()));
    }

    #[test]
    fn test_mesh_blocks_follow_frame_block() {
        let mut packer = UniformPacker::new(256, 4096);
        packer.begin();
        packer.pack_frame(&Camera::default(), &AmbientLight::default(), &[]);
        let first = packer.pack_mesh(&Mat4::identity());
        let second = packer.pack_mesh(&Mat4::new_scaling(2.0));

        assert_eq!(first.offset, 512);
        assert_eq!(second.offset, 768);
        assert_eq!(second.range, 64);
    }

    #[test]
    fn test_text_rejects_atlas_ten() {
        let mut packer = UniformPacker::new(16, 256);
        packer.begin();

        assert!(packer.pack_text(9, 0).is_ok());
        assert_eq!(
            packer.pack_text(10, 1),
            Err(FrameWarning::AtlasIndexOutOfRange { atlas_index: 10, position: 1 })
        );
        assert_eq!(packer.len(), 16);
    }

    #[test]
    fn test_no_growth_after_first_frame() {
        let mut packer = UniformPacker::new(256, 0);
        for _ in 0..3 {
            packer.begin();
            packer.pack_frame(&Camera::default(), &AmbientLight::default(), &[]);
            for _ in 0..16 {
                packer.pack_mesh(&Mat4::identity());
            }
        }
        let capacity = packer.capacity();

        packer.begin();
        packer.pack_frame(&Camera::default(), &AmbientLight::default(), &[]);
        for _ in 0..16 {
            packer.pack_mesh(&Mat4::identity());
        }
        assert_eq!(packer.capacity(), capacity);
    }
}
