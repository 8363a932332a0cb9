//! Host mirrors of the shader uniform and storage blocks
//!
//! Each struct here is byte-for-byte what the matching GLSL block reads.
//! Offsets are noted per member; the size assertions at the bottom keep the
//! host side honest when a member is added.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::FrameWarning;
use crate::foundation::math::{gpu, Mat3, Mat4};
use crate::layout::MemoryLayout;

/// Capacity of the `pointLights` array in the frame block
pub const MAX_POINT_LIGHTS: usize = 5;

/// Length of the atlas texture array sampled by sprites and text
pub const MAX_ATLASES: usize = 10;

/// Check an atlas index against the atlas array length
///
/// `position` is reported back in the warning so the caller can find the
/// offending input.
pub fn check_atlas_index(atlas_index: u32, position: usize) -> Result<u32, FrameWarning> {
    if (atlas_index as usize) < MAX_ATLASES {
        Ok(atlas_index)
    } else {
        Err(FrameWarning::AtlasIndexOutOfRange { atlas_index, position })
    }
}

/// Identifies a host block type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockKind {
    /// Camera matrices and lights, once per frame
    FrameData,
    /// Model matrix of one non-instanced mesh
    MeshData,
    /// Model matrix of one mesh instance (storage array element)
    MeshInstance,
    /// Transform and atlas index of one sprite/text instance (storage array element)
    SpriteInstance,
    /// Transform of one UI element
    UiElementData,
    /// Atlas index of one UI text batch
    TextData,
}

impl BlockKind {
    /// Size in bytes of the host mirror
    pub const fn host_size(self) -> usize {
        match self {
            Self::FrameData => FrameDataBlock::SIZE,
            Self::MeshData => MeshDataBlock::SIZE,
            Self::MeshInstance => MeshInstanceBlock::SIZE,
            Self::SpriteInstance => SpriteInstanceBlock::SIZE,
            Self::UiElementData => UiElementBlock::SIZE,
            Self::TextData => TextDataBlock::SIZE,
        }
    }

    /// Packing the host mirror is written with
    pub const fn host_layout(self) -> MemoryLayout {
        match self {
            Self::FrameData => FrameDataBlock::LAYOUT,
            Self::MeshData => MeshDataBlock::LAYOUT,
            Self::MeshInstance => MeshInstanceBlock::LAYOUT,
            Self::SpriteInstance => SpriteInstanceBlock::LAYOUT,
            Self::UiElementData => UiElementBlock::LAYOUT,
            Self::TextData => TextDataBlock::LAYOUT,
        }
    }
}

/// A host struct that mirrors a GPU block
pub trait GpuBlock: Pod {
    /// Which block this mirrors
    const KIND: BlockKind;
    /// Packing the struct is written with
    const LAYOUT: MemoryLayout;
    /// Size in bytes; the block stride for storage arrays
    const SIZE: usize = std::mem::size_of::<Self>();
}

/// One entry of the `pointLights` array
///
/// `vec3` members are 16-byte aligned in std140, so each is followed by a pad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PointLightBlock {
    /// World position, offset 0
    pub position: [f32; 3],
    /// Padding
    pub _pad0: f32,
    /// Color premultiplied by intensity, offset 16
    pub color: [f32; 3],
    /// Padding
    pub _pad1: f32,
}

/// `layout(set = 0, binding = 0, std140, row_major) uniform FrameData`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameDataBlock {
    /// Projection matrix rows, offset 0
    pub projection: [[f32; 4]; 4],
    /// View matrix rows, offset 64
    pub view: [[f32; 4]; 4],
    /// Ambient color premultiplied by intensity, offset 128
    pub ambient: [f32; 3],
    /// Active entries of `point_lights`, offset 140
    pub point_light_count: u32,
    /// Fixed-capacity light array, offset 144, 32 bytes per entry
    pub point_lights: [PointLightBlock; MAX_POINT_LIGHTS],
}

impl Default for FrameDataBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl GpuBlock for FrameDataBlock {
    const KIND: BlockKind = BlockKind::FrameData;
    const LAYOUT: MemoryLayout = MemoryLayout::STD140_ROW_MAJOR;
}

/// `layout(set = 1, binding = 0, std140, row_major) uniform MeshData`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshDataBlock {
    /// Model matrix rows
    pub model: [[f32; 4]; 4],
}

impl MeshDataBlock {
    /// Pack a model matrix
    pub fn from_matrix(model: &Mat4) -> Self {
        Self { model: gpu::mat4_rows(model) }
    }
}

impl GpuBlock for MeshDataBlock {
    const KIND: BlockKind = BlockKind::MeshData;
    const LAYOUT: MemoryLayout = MemoryLayout::STD140_ROW_MAJOR;
}

/// Element of `layout(set = 1, binding = 0, std430, row_major) buffer MeshInstances`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshInstanceBlock {
    /// Model matrix rows
    pub model: [[f32; 4]; 4],
}

impl MeshInstanceBlock {
    /// Pack a model matrix
    pub fn from_matrix(model: &Mat4) -> Self {
        Self { model: gpu::mat4_rows(model) }
    }
}

impl GpuBlock for MeshInstanceBlock {
    const KIND: BlockKind = BlockKind::MeshInstance;
    const LAYOUT: MemoryLayout = MemoryLayout::STD430_ROW_MAJOR;
}

/// Element of `layout(set = 0, binding = 0, std430, row_major) buffer InstanceData`
///
/// A `mat3` takes three 16-byte rows; the struct rounds up to 16-byte alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteInstanceBlock {
    /// Transform rows, offset 0
    pub transform: [[f32; 4]; 3],
    /// Atlas array index, offset 48
    pub atlas_index: u32,
    /// Padding
    pub _pad: [u32; 3],
}

impl SpriteInstanceBlock {
    /// Pack a transform and atlas index
    ///
    /// The index is not range-checked here; streams do that before packing.
    pub fn new(transform: &Mat3, atlas_index: u32) -> Self {
        Self {
            transform: gpu::mat3_padded_rows(transform),
            atlas_index,
            _pad: [0; 3],
        }
    }
}

impl GpuBlock for SpriteInstanceBlock {
    const KIND: BlockKind = BlockKind::SpriteInstance;
    const LAYOUT: MemoryLayout = MemoryLayout::STD430_ROW_MAJOR;
}

/// `layout(set = 0, binding = 2, std140, row_major) uniform UIElementData`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UiElementBlock {
    /// Transform rows
    pub transform: [[f32; 4]; 3],
}

impl UiElementBlock {
    /// Pack a 2D transform
    pub fn from_matrix(transform: &Mat3) -> Self {
        Self { transform: gpu::mat3_padded_rows(transform) }
    }
}

impl GpuBlock for UiElementBlock {
    const KIND: BlockKind = BlockKind::UiElementData;
    const LAYOUT: MemoryLayout = MemoryLayout::STD140_ROW_MAJOR;
}

/// `layout(set = 0, binding = 3, std140) uniform TextData`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TextDataBlock {
    /// Atlas array index
    pub atlas_index: u32,
    /// Padding to the 16-byte block size
    pub _pad: [u32; 3],
}

impl GpuBlock for TextDataBlock {
    const KIND: BlockKind = BlockKind::TextData;
    const LAYOUT: MemoryLayout = MemoryLayout::STD140_ROW_MAJOR;
}

const _: () = assert!(std::mem::size_of::<PointLightBlock>() == 32);
const _: () = assert!(std::mem::size_of::<FrameDataBlock>() == 304);
const _: () = assert!(std::mem::size_of::<MeshDataBlock>() == 64);
const _: () = assert!(std::mem::size_of::<MeshInstanceBlock>() == 64);
const _: () = assert!(std::mem::size_of::<SpriteInstanceBlock>() == 64);
const _: () = assert!(std::mem::size_of::<UiElementBlock>() == 48);
const _: () = assert!(std::mem::size_of::<TextDataBlock>() == 16);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform2D, Vec2};

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_frame_block_offsets() {
        let mut block = FrameDataBlock::default();
        block.ambient = [0.1, 0.2, 0.3];
        block.point_light_count = 2;
        block.point_lights[1].position = [4.0, 5.0, 6.0];
        block.point_lights[1].color = [0.7, 0.8, 0.9];

        let bytes = bytemuck::bytes_of(&block);
        assert_eq!(read_f32(bytes, 128), 0.1);
        assert_eq!(read_f32(bytes, 136), 0.3);
        assert_eq!(read_u32(bytes, 140), 2);
        assert_eq!(read_f32(bytes, 144 + 32), 4.0);
        assert_eq!(read_f32(bytes, 160 + 32), 0.7);
    }

    #[test]
    fn test_sprite_instance_atlas_offset() {
        let transform = Transform2D::from_position(Vec2::new(3.0, 7.0)).to_matrix();
        let block = SpriteInstanceBlock::new(&transform, 9);
        let bytes = bytemuck::bytes_of(&block);

        // Row 0 ends with the x translation, row 1 with the y translation
        assert_eq!(read_f32(bytes, 8), 3.0);
        assert_eq!(read_f32(bytes, 16 + 8), 7.0);
        assert_eq!(read_u32(bytes, 48), 9);
    }

    #[test]
    fn test_atlas_index_bounds() {
        assert_eq!(check_atlas_index(9, 0), Ok(9));
        assert_eq!(
            check_atlas_index(10, 4),
            Err(FrameWarning::AtlasIndexOutOfRange { atlas_index: 10, position: 4 })
        );
    }

    #[test]
    fn test_host_sizes_match_kinds() {
        assert_eq!(BlockKind::FrameData.host_size(), 304);
        assert_eq!(BlockKind::SpriteInstance.host_size(), 64);
        assert_eq!(BlockKind::UiElementData.host_size(), 48);
        assert_eq!(BlockKind::TextData.host_layout(), MemoryLayout::STD140_ROW_MAJOR);
        assert_eq!(BlockKind::MeshInstance.host_layout(), MemoryLayout::STD430_ROW_MAJOR);
    }
}
