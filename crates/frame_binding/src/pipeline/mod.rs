//! Pipeline layouts and the pipeline registry
//!
//! A pipeline layout is the union of its vertex and fragment stage
//! declarations. Both stages are checked against the host blocks and against
//! each other before the backend is asked to build anything, so a mismatch
//! surfaces at creation instead of as corrupted draws.

mod pipeline_config;
mod pipeline_manager;

pub use pipeline_config::{PipelineVariant, ShaderPair};
pub use pipeline_manager::{PipelineEntry, PipelineKey, PipelineManager};

use std::collections::BTreeMap;

use crate::backend::DescriptorWrite;
use crate::error::{BindingError, BindingResult};
use crate::layout::{validate_stage, BindingSlot, BlockDecl, DescriptorKind, LayoutTable, ShaderStages};

/// One binding of a merged set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    /// Binding index
    pub binding: u32,
    /// Descriptor type
    pub kind: DescriptorKind,
    /// Stages reading the binding
    pub stages: ShaderStages,
    /// Declared block for buffer bindings
    pub block: Option<BlockDecl>,
}

/// Merged layout of one descriptor set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetLayout {
    /// Set index
    pub set: u32,
    /// Bindings sorted by index
    pub bindings: Vec<LayoutBinding>,
}

impl SetLayout {
    /// Binding by index
    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    /// Bindings backed by host buffers
    pub fn buffer_bindings(&self) -> impl Iterator<Item = &LayoutBinding> {
        self.bindings.iter().filter(|b| b.kind.is_buffer())
    }

    /// Check that `writes` cover exactly the buffer bindings of this set
    pub fn check_writes<B>(&self, writes: &[DescriptorWrite<B>]) -> BindingResult<()> {
        for binding in self.buffer_bindings() {
            if !writes.iter().any(|w| w.binding == binding.binding) {
                return Err(BindingError::MissingBufferWrite {
                    set: self.set,
                    binding: binding.binding,
                });
            }
        }
        for write in writes {
            match self.binding(write.binding) {
                Some(binding) if binding.kind.is_buffer() => {}
                _ => {
                    return Err(BindingError::UnexpectedBufferWrite {
                        set: self.set,
                        binding: write.binding,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Validated layout of a vertex/fragment pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    /// Linked stages
    pub shaders: ShaderPair,
    /// Set layouts sorted by set index
    pub sets: Vec<SetLayout>,
}

impl PipelineLayoutDesc {
    /// Merge and validate the declarations of both stages
    ///
    /// Fails with `LayoutMismatch` when a stage block differs from its host
    /// mirror and with `PipelineLayoutMismatch` when both stages declare the
    /// same slot differently.
    pub fn build(table: &LayoutTable, shaders: ShaderPair) -> BindingResult<Self> {
        let vertex_slots = table.vertex_slots(shaders.vertex);
        let fragment_slots = table.fragment_slots(shaders.fragment);

        validate_stage(&format!("vertex stage {:?}", shaders.vertex), vertex_slots)?;
        validate_stage(&format!("fragment stage {:?}", shaders.fragment), fragment_slots)?;

        let mut merged: BTreeMap<(u32, u32), (BindingSlot, ShaderStages)> = BTreeMap::new();
        for slot in vertex_slots {
            merged.insert((slot.set, slot.binding), (*slot, ShaderStages::VERTEX));
        }

        for slot in fragment_slots {
            match merged.get_mut(&(slot.set, slot.binding)) {
                Some((existing, stages)) => {
                    if !existing.is_compatible_with(slot) {
                        let error = BindingError::PipelineLayoutMismatch {
                            vertex: shaders.vertex,
                            fragment: shaders.fragment,
                            vertex_slot: *existing,
                            fragment_slot: *slot,
                        };
                        log::error!("{}", error);
                        return Err(error);
                    }
                    *stages |= ShaderStages::FRAGMENT;
                }
                None => {
                    merged.insert((slot.set, slot.binding), (*slot, ShaderStages::FRAGMENT));
                }
            }
        }

        let mut sets: Vec<SetLayout> = Vec::new();
        for ((set, binding), (slot, stages)) in merged {
            let layout_binding = LayoutBinding {
                binding,
                kind: slot.kind,
                stages,
                block: slot.block,
            };
            match sets.last_mut() {
                Some(last) if last.set == set => last.bindings.push(layout_binding),
                _ => sets.push(SetLayout { set, bindings: vec![layout_binding] }),
            }
        }

        log::debug!("Built layout for {} with {} descriptor sets", shaders, sets.len());
        Ok(Self { shaders, sets })
    }

    /// Layout of one set
    pub fn set(&self, set: u32) -> Option<&SetLayout> {
        self.sets.iter().find(|s| s.set == set)
    }

    /// Set indices the pipeline expects bound
    pub fn set_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.sets.iter().map(|s| s.set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FragmentStage, VertexStage};

    #[test]
    fn test_mesh_layout_has_frame_and_mesh_sets() {
        let table = LayoutTable::builtin();
        let desc = PipelineLayoutDesc::build(&table, PipelineVariant::LambertMesh.shaders()).unwrap();

        assert_eq!(desc.set_indices().collect::<Vec<_>>(), vec![0, 1]);
        let frame = desc.set(0).unwrap().binding(0).unwrap();
        assert_eq!(frame.kind, DescriptorKind::UniformBuffer);
        assert_eq!(frame.stages, ShaderStages::VERTEX);
    }

    #[test]
    fn test_sprite_layout_spans_three_sets() {
        let table = LayoutTable::builtin();
        let desc = PipelineLayoutDesc::build(&table, PipelineVariant::Sprite.shaders()).unwrap();

        assert_eq!(desc.set_indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(desc.set(1).unwrap().bindings[0].stages, ShaderStages::FRAGMENT);
        assert_eq!(desc.set(2).unwrap().bindings[0].kind.descriptor_count(), 10);
    }

    #[test]
    fn test_ui_text_merges_into_set_zero() {
        let table = LayoutTable::builtin();
        let desc = PipelineLayoutDesc::build(&table, PipelineVariant::UiText.shaders()).unwrap();

        assert_eq!(desc.sets.len(), 1);
        let bindings: Vec<u32> = desc.sets[0].bindings.iter().map(|b| b.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert_eq!(desc.sets[0].buffer_bindings().count(), 2);
    }

    #[test]
    fn test_mixed_atlas_layouts_are_rejected() {
        let table = LayoutTable::builtin();
        let pair = ShaderPair::new(VertexStage::Sprite, FragmentStage::AtlasCombined);

        match PipelineLayoutDesc::build(&table, pair) {
            Err(BindingError::PipelineLayoutMismatch { vertex_slot, fragment_slot, .. }) => {
                assert_eq!((vertex_slot.set, vertex_slot.binding), (0, 0));
                assert_eq!(vertex_slot.kind, DescriptorKind::StorageBuffer);
                assert_eq!(fragment_slot.kind, DescriptorKind::Sampler);
            }
            other => panic!("expected pipeline layout mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_slot_gets_both_stages() {
        let mut table = LayoutTable::builtin();
        let frame = table.vertex_slots(VertexStage::Lambert)[0];
        table.fragment.insert(FragmentStage::LambertColor, vec![frame]);

        let desc = PipelineLayoutDesc::build(&table, PipelineVariant::LambertMesh.shaders()).unwrap();
        assert_eq!(desc.set(0).unwrap().bindings[0].stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
    }

    #[test]
    fn test_check_writes_requires_every_buffer() {
        let table = LayoutTable::builtin();
        let desc = PipelineLayoutDesc::build(&table, PipelineVariant::UiText.shaders()).unwrap();
        let set = desc.set(0).unwrap();
        let region = crate::arena::Region { offset: 0, range: 48 };

        let partial = [DescriptorWrite { binding: 2, buffer: 7_u32, region }];
        assert!(matches!(
            set.check_writes(&partial),
            Err(BindingError::MissingBufferWrite { set: 0, binding: 3 })
        ));

        let full = [
            DescriptorWrite { binding: 2, buffer: 7_u32, region },
            DescriptorWrite { binding: 3, buffer: 7_u32, region },
        ];
        assert!(set.check_writes(&full).is_ok());
    }
}
