//! Shader resource layout descriptions
//!
//! Every shader stage declares its resources as `(set, binding)` slots. Buffer
//! slots also declare the block that lives there: which host block mirrors it,
//! the packing rule (`std140` / `std430`), the matrix order (`row_major` or
//! column-major) and the element stride in bytes.
//!
//! A host block whose packing differs from the declaration does not fail on
//! the GPU; it reads garbage. The table is therefore checked against the host
//! mirrors before any pipeline is created.

mod table;

pub use table::LayoutTable;
pub(crate) use table::validate_stage;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blocks::BlockKind;

/// Block packing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutRule {
    /// Uniform block rules: arrays and structs rounded to 16 bytes
    Std140,
    /// Storage block rules: tighter array packing
    Std430,
}

/// Storage order of matrix members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixOrder {
    /// `layout(row_major)`: rows are contiguous
    RowMajor,
    /// GLSL default: columns are contiguous
    ColumnMajor,
}

/// Complete memory layout of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryLayout {
    /// Packing rule
    pub rule: LayoutRule,
    /// Matrix storage order
    pub matrix_order: MatrixOrder,
}

impl MemoryLayout {
    /// `layout(std140, row_major)`
    pub const STD140_ROW_MAJOR: Self = Self {
        rule: LayoutRule::Std140,
        matrix_order: MatrixOrder::RowMajor,
    };

    /// `layout(std430, row_major)`
    pub const STD430_ROW_MAJOR: Self = Self {
        rule: LayoutRule::Std430,
        matrix_order: MatrixOrder::RowMajor,
    };

    /// `layout(std140)` with column-major matrices
    pub const STD140_COLUMN_MAJOR: Self = Self {
        rule: LayoutRule::Std140,
        matrix_order: MatrixOrder::ColumnMajor,
    };
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = match self.rule {
            LayoutRule::Std140 => "std140",
            LayoutRule::Std430 => "std430",
        };
        match self.matrix_order {
            MatrixOrder::RowMajor => write!(f, "{}, row_major", rule),
            MatrixOrder::ColumnMajor => write!(f, "{}, column_major", rule),
        }
    }
}

/// Descriptor type of a binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Read-only uniform block
    UniformBuffer,
    /// Variable-length storage block
    StorageBuffer,
    /// Standalone sampler
    Sampler,
    /// Array of sampled images (atlases)
    SampledImageArray {
        /// Array length
        count: u32,
    },
}

impl DescriptorKind {
    /// Whether the slot is backed by a host-written buffer region
    pub const fn is_buffer(self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer)
    }

    /// Number of descriptors in the slot
    pub const fn descriptor_count(self) -> u32 {
        match self {
            Self::SampledImageArray { count } => count,
            _ => 1,
        }
    }
}

/// Block declared at a buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDecl {
    /// Host mirror of the block
    pub kind: BlockKind,
    /// Declared packing
    pub layout: MemoryLayout,
    /// Declared size of the block, or of one array element for storage arrays
    pub stride: usize,
}

/// One `(set, binding)` slot declared by a shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingSlot {
    /// Descriptor set index
    pub set: u32,
    /// Binding index within the set
    pub binding: u32,
    /// Descriptor type
    pub kind: DescriptorKind,
    /// Declared block for buffer slots
    #[serde(default)]
    pub block: Option<BlockDecl>,
}

impl BindingSlot {
    /// Uniform block slot
    pub const fn uniform(set: u32, binding: u32, block: BlockDecl) -> Self {
        Self { set, binding, kind: DescriptorKind::UniformBuffer, block: Some(block) }
    }

    /// Storage block slot
    pub const fn storage(set: u32, binding: u32, block: BlockDecl) -> Self {
        Self { set, binding, kind: DescriptorKind::StorageBuffer, block: Some(block) }
    }

    /// Sampler slot
    pub const fn sampler(set: u32, binding: u32) -> Self {
        Self { set, binding, kind: DescriptorKind::Sampler, block: None }
    }

    /// Sampled image array slot
    pub const fn images(set: u32, binding: u32, count: u32) -> Self {
        Self { set, binding, kind: DescriptorKind::SampledImageArray { count }, block: None }
    }

    /// Whether two stages declare this slot identically
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.set == other.set
            && self.binding == other.binding
            && self.kind == other.kind
            && self.block == other.block
    }
}

bitflags! {
    /// Shader stages that access a binding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 0b01;
        /// Fragment stage
        const FRAGMENT = 0b10;
    }
}

/// Vertex shader variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexStage {
    /// Flat colored mesh
    Basic,
    /// Mesh with normals forwarded as color
    Normal,
    /// Mesh lit per vertex by ambient and point lights
    Lambert,
    /// Mesh instanced through a storage array of model matrices
    InstancedMesh,
    /// Atlas quads instanced through a storage array
    Sprite,
    /// Glyph quads from the vertex buffer, placed by one storage instance per text
    Text,
    /// Screen-space UI element
    UiElement,
}

impl VertexStage {
    /// All vertex variants
    pub const ALL: [Self; 7] = [
        Self::Basic,
        Self::Normal,
        Self::Lambert,
        Self::InstancedMesh,
        Self::Sprite,
        Self::Text,
        Self::UiElement,
    ];

    /// Whether positions come from `gl_VertexIndex` instead of a vertex buffer
    pub const fn generates_vertices(self) -> bool {
        matches!(self, Self::Sprite)
    }
}

/// Fragment shader variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FragmentStage {
    /// Interpolated vertex color
    Color,
    /// Interpolated normal mapped to color
    NormalColor,
    /// Interpolated lit color
    LambertColor,
    /// Atlas sampling with sampler at set 1 and atlases at set 2
    AtlasSplit,
    /// Atlas sampling with sampler, atlases and text data all in set 0
    AtlasCombined,
}

impl FragmentStage {
    /// All fragment variants
    pub const ALL: [Self; 5] = [
        Self::Color,
        Self::NormalColor,
        Self::LambertColor,
        Self::AtlasSplit,
        Self::AtlasCombined,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sprites_generate_vertices() {
        let generated: Vec<VertexStage> = VertexStage::ALL
            .into_iter()
            .filter(|stage| stage.generates_vertices())
            .collect();
        assert_eq!(generated, vec![VertexStage::Sprite]);
    }

    #[test]
    fn test_layout_display() {
        assert_eq!(MemoryLayout::STD140_ROW_MAJOR.to_string(), "std140, row_major");
        assert_eq!(MemoryLayout::STD140_COLUMN_MAJOR.to_string(), "std140, column_major");
    }

    #[test]
    fn test_row_and_column_major_are_distinct() {
        assert_ne!(MemoryLayout::STD140_ROW_MAJOR, MemoryLayout::STD140_COLUMN_MAJOR);
    }

    #[test]
    fn test_descriptor_counts() {
        assert_eq!(DescriptorKind::UniformBuffer.descriptor_count(), 1);
        assert_eq!(DescriptorKind::SampledImageArray { count: 10 }.descriptor_count(), 10);
        assert!(DescriptorKind::StorageBuffer.is_buffer());
        assert!(!DescriptorKind::Sampler.is_buffer());
    }

    #[test]
    fn test_slot_compatibility_checks_kind() {
        let sampler = BindingSlot::sampler(0, 0);
        let images = BindingSlot::images(0, 0, 10);
        assert!(sampler.is_compatible_with(&sampler));
        assert!(!sampler.is_compatible_with(&images));
    }
}
