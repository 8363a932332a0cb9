//! Stage → binding table and host block validation

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{BindingSlot, BlockDecl, FragmentStage, MemoryLayout, VertexStage};
use crate::blocks::BlockKind;
use crate::config::{Config, ConfigError};
use crate::error::{BindingError, BindingResult};

/// Resource slots declared by every shader stage
///
/// The built-in table describes the shipped shaders. A table can also be
/// loaded from RON so a shader revision can be described without a rebuild:
///
/// ```ron
/// (
///     vertex: {
///         Sprite: [
///             (set: 0, binding: 0, kind: StorageBuffer,
///              block: Some((kind: SpriteInstance,
///                           layout: (rule: Std430, matrix_order: RowMajor),
///                           stride: 64))),
///         ],
///     },
///     fragment: {},
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTable {
    /// Vertex stage declarations
    #[serde(default)]
    pub vertex: BTreeMap<VertexStage, Vec<BindingSlot>>,
    /// Fragment stage declarations
    #[serde(default)]
    pub fragment: BTreeMap<FragmentStage, Vec<BindingSlot>>,
}

const fn decl(kind: BlockKind, layout: MemoryLayout, stride: usize) -> BlockDecl {
    BlockDecl { kind, layout, stride }
}

const FRAME_DATA: BlockDecl = decl(BlockKind::FrameData, MemoryLayout::STD140_ROW_MAJOR, 304);
const MESH_DATA: BlockDecl = decl(BlockKind::MeshData, MemoryLayout::STD140_ROW_MAJOR, 64);
const MESH_INSTANCES: BlockDecl = decl(BlockKind::MeshInstance, MemoryLayout::STD430_ROW_MAJOR, 64);
const SPRITE_INSTANCES: BlockDecl = decl(BlockKind::SpriteInstance, MemoryLayout::STD430_ROW_MAJOR, 64);
const UI_ELEMENT_DATA: BlockDecl = decl(BlockKind::UiElementData, MemoryLayout::STD140_ROW_MAJOR, 48);
const TEXT_DATA: BlockDecl = decl(BlockKind::TextData, MemoryLayout::STD140_ROW_MAJOR, 16);

impl LayoutTable {
    /// Declarations of the shipped shader set
    pub fn builtin() -> Self {
        let mesh = vec![
            BindingSlot::uniform(0, 0, FRAME_DATA),
            BindingSlot::uniform(1, 0, MESH_DATA),
        ];

        let mut vertex = BTreeMap::new();
        vertex.insert(VertexStage::Basic, mesh.clone());
        vertex.insert(VertexStage::Normal, mesh.clone());
        vertex.insert(VertexStage::Lambert, mesh);
        vertex.insert(VertexStage::InstancedMesh, vec![
            BindingSlot::uniform(0, 0, FRAME_DATA),
            BindingSlot::storage(1, 0, MESH_INSTANCES),
        ]);
        vertex.insert(VertexStage::Sprite, vec![
            BindingSlot::storage(0, 0, SPRITE_INSTANCES),
        ]);
        vertex.insert(VertexStage::Text, vec![
            BindingSlot::storage(0, 0, SPRITE_INSTANCES),
        ]);
        vertex.insert(VertexStage::UiElement, vec![
            BindingSlot::uniform(0, 2, UI_ELEMENT_DATA),
        ]);

        let mut fragment = BTreeMap::new();
        fragment.insert(FragmentStage::Color, Vec::new());
        fragment.insert(FragmentStage::NormalColor, Vec::new());
        fragment.insert(FragmentStage::LambertColor, Vec::new());
        fragment.insert(FragmentStage::AtlasSplit, vec![
            BindingSlot::sampler(1, 0),
            BindingSlot::images(2, 0, crate::blocks::MAX_ATLASES as u32),
        ]);
        fragment.insert(FragmentStage::AtlasCombined, vec![
            BindingSlot::sampler(0, 0),
            BindingSlot::images(0, 1, crate::blocks::MAX_ATLASES as u32),
            BindingSlot::uniform(0, 3, TEXT_DATA),
        ]);

        Self { vertex, fragment }
    }

    /// Parse a table from RON text
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Slots declared by a vertex stage
    pub fn vertex_slots(&self, stage: VertexStage) -> &[BindingSlot] {
        self.vertex.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Slots declared by a fragment stage
    pub fn fragment_slots(&self, stage: FragmentStage) -> &[BindingSlot] {
        self.fragment.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check every declared block of every stage against its host mirror
    pub fn validate_host_blocks(&self) -> BindingResult<()> {
        for (stage, slots) in &self.vertex {
            validate_stage(&format!("vertex stage {:?}", stage), slots)?;
        }
        for (stage, slots) in &self.fragment {
            validate_stage(&format!("fragment stage {:?}", stage), slots)?;
        }
        Ok(())
    }
}

impl Default for LayoutTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Config for LayoutTable {}

/// Check one stage's slots: no duplicates, and every block matches its host mirror
pub(crate) fn validate_stage(stage: &str, slots: &[BindingSlot]) -> BindingResult<()> {
    let mut seen = BTreeSet::new();

    for slot in slots {
        if !seen.insert((slot.set, slot.binding)) {
            log::error!("{} declares set {} binding {} twice", stage, slot.set, slot.binding);
            return Err(BindingError::DuplicateBinding {
                stage: stage.to_string(),
                set: slot.set,
                binding: slot.binding,
            });
        }

        match slot.block {
            Some(block) => check_block(slot, &block)?,
            None if slot.kind.is_buffer() => {
                return Err(BindingError::MissingBlockDeclaration {
                    stage: stage.to_string(),
                    set: slot.set,
                    binding: slot.binding,
                });
            }
            None => {}
        }
    }

    Ok(())
}

fn check_block(slot: &BindingSlot, block: &BlockDecl) -> BindingResult<()> {
    let host_size = block.kind.host_size();
    let host_layout = block.kind.host_layout();

    if block.stride == host_size && block.layout == host_layout {
        return Ok(());
    }

    let error = BindingError::LayoutMismatch {
        block: block.kind,
        set: slot.set,
        binding: slot.binding,
        declared_stride: block.stride,
        host_size,
        declared_layout: block.layout,
        host_layout,
    };
    log::error!("{}", error);
    Err(error)
}
