//! Pipeline variants and their shader pairs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::layout::{FragmentStage, VertexStage};

/// A vertex stage linked with a fragment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShaderPair {
    /// Vertex stage
    pub vertex: VertexStage,
    /// Fragment stage
    pub fragment: FragmentStage,
}

impl ShaderPair {
    /// Pair two stages
    pub const fn new(vertex: VertexStage, fragment: FragmentStage) -> Self {
        Self { vertex, fragment }
    }
}

impl fmt::Display for ShaderPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}+{:?}", self.vertex, self.fragment)
    }
}

/// Pipelines the binder draws with
///
/// The two atlas layouts stay separate variants: sprites and world text read
/// the sampler from set 1 and the atlases from set 2, UI text reads both from
/// set 0 next to its text data. Sprites and world text share the fragment
/// stage but not the vertex input, so each gets its own pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineVariant {
    /// Flat colored mesh
    BasicMesh,
    /// Normal visualization
    NormalMesh,
    /// Per-vertex Lambert lighting
    LambertMesh,
    /// Mesh instanced from a storage array
    InstancedMesh,
    /// Instanced atlas sprites
    Sprite,
    /// World-space text: glyph quads in a vertex buffer, one instance per text
    Text,
    /// Untextured UI quad
    UiQuad,
    /// UI text sampled from a glyph atlas
    UiText,
}

impl PipelineVariant {
    /// Every variant, in creation order
    pub const ALL: [Self; 8] = [
        Self::BasicMesh,
        Self::NormalMesh,
        Self::LambertMesh,
        Self::InstancedMesh,
        Self::Sprite,
        Self::Text,
        Self::UiQuad,
        Self::UiText,
    ];

    /// Shader stages linked by this variant
    pub const fn shaders(self) -> ShaderPair {
        match self {
            Self::BasicMesh => ShaderPair::new(VertexStage::Basic, FragmentStage::Color),
            Self::NormalMesh => ShaderPair::new(VertexStage::Normal, FragmentStage::NormalColor),
            Self::LambertMesh => ShaderPair::new(VertexStage::Lambert, FragmentStage::LambertColor),
            Self::InstancedMesh => ShaderPair::new(VertexStage::InstancedMesh, FragmentStage::Color),
            Self::Sprite => ShaderPair::new(VertexStage::Sprite, FragmentStage::AtlasSplit),
            Self::Text => ShaderPair::new(VertexStage::Text, FragmentStage::AtlasSplit),
            Self::UiQuad => ShaderPair::new(VertexStage::UiElement, FragmentStage::Color),
            Self::UiText => ShaderPair::new(VertexStage::UiElement, FragmentStage::AtlasCombined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_its_own_pair() {
        let mut pairs: Vec<ShaderPair> = PipelineVariant::ALL.iter().map(|v| v.shaders()).collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), PipelineVariant::ALL.len());

        let sprite = PipelineVariant::Sprite.shaders();
        let text = PipelineVariant::Text.shaders();
        assert_eq!(sprite.fragment, text.fragment);
        assert!(sprite.vertex.generates_vertices());
        assert!(!text.vertex.generates_vertices());
    }

    #[test]
    fn test_pair_display() {
        let pair = PipelineVariant::UiText.shaders();
        assert_eq!(pair.to_string(), "UiElement+AtlasCombined");
    }
}
