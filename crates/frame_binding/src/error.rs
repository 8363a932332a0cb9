//! Error types for the binding layer
//!
//! Creation-time failures are `BindingError`s and abort pipeline setup.
//! Per-frame problems that can be recovered locally are `FrameWarning`s:
//! the offending data is truncated or dropped and the warning is counted.

use ash::vk;

use crate::blocks::BlockKind;
use crate::config::ConfigError;
use crate::dispatch::DispatchState;
use crate::layout::{BindingSlot, FragmentStage, MemoryLayout, VertexStage};
use crate::pipeline::{PipelineKey, PipelineVariant};

/// Result type for binding layer operations
pub type BindingResult<T> = Result<T, BindingError>;

/// Binding layer errors
#[derive(thiserror::Error, Debug)]
pub enum BindingError {
    /// A declared block does not match the host struct that fills it
    #[error(
        "Layout mismatch for {block:?} at set {set} binding {binding}: shader declares \
         {declared_stride} bytes ({declared_layout}), host packs {host_size} bytes ({host_layout})"
    )]
    LayoutMismatch {
        /// Block kind
        block: BlockKind,
        /// Set index of the slot
        set: u32,
        /// Binding index of the slot
        binding: u32,
        /// Stride declared by the shader
        declared_stride: usize,
        /// Size of the host struct
        host_size: usize,
        /// Layout declared by the shader
        declared_layout: MemoryLayout,
        /// Layout of the host struct
        host_layout: MemoryLayout,
    },

    /// Vertex and fragment stages declare the same slot differently
    #[error(
        "Pipeline layout mismatch between {vertex:?} and {fragment:?} at set {} binding {}: \
         vertex declares {:?}, fragment declares {:?}",
        .vertex_slot.set, .vertex_slot.binding, .vertex_slot.kind, .fragment_slot.kind
    )]
    PipelineLayoutMismatch {
        /// Vertex stage
        vertex: VertexStage,
        /// Fragment stage
        fragment: FragmentStage,
        /// Slot as declared by the vertex stage
        vertex_slot: BindingSlot,
        /// Slot as declared by the fragment stage
        fragment_slot: BindingSlot,
    },

    /// A stage declares the same slot twice
    #[error("{stage} declares set {set} binding {binding} more than once")]
    DuplicateBinding {
        /// Stage name
        stage: String,
        /// Set index
        set: u32,
        /// Binding index
        binding: u32,
    },

    /// Buffer slot without a block declaration
    #[error("{stage} declares a buffer at set {set} binding {binding} without a block")]
    MissingBlockDeclaration {
        /// Stage name
        stage: String,
        /// Set index
        set: u32,
        /// Binding index
        binding: u32,
    },

    /// Pipeline handle is not registered
    #[error("Unknown pipeline {0:?}")]
    UnknownPipeline(PipelineKey),

    /// Variant was never created
    #[error("Pipeline variant {0:?} has not been created")]
    UnknownVariant(PipelineVariant),

    /// Dispatcher step called out of order
    #[error("Invalid dispatch transition: cannot {action} while {from:?}")]
    InvalidTransition {
        /// State the dispatcher was in
        from: DispatchState,
        /// Step that was attempted
        action: &'static str,
    },

    /// Draw does not bind a set the pipeline layout requires
    #[error("Draw is missing descriptor set {set}")]
    MissingDescriptorSet {
        /// Set index
        set: u32,
    },

    /// Draw binds a set the pipeline layout does not declare
    #[error("Draw binds descriptor set {set} which the pipeline layout does not declare")]
    UnexpectedDescriptorSet {
        /// Set index
        set: u32,
    },

    /// Buffer binding of a set was not written
    #[error("Set {set} binding {binding} has no buffer region")]
    MissingBufferWrite {
        /// Set index
        set: u32,
        /// Binding index
        binding: u32,
    },

    /// Buffer region written to a binding that takes no buffer
    #[error("Set {set} binding {binding} does not take a buffer region")]
    UnexpectedBufferWrite {
        /// Set index
        set: u32,
        /// Binding index
        binding: u32,
    },

    /// Indexed draw without an index buffer
    #[error("Indexed draw issued without an index buffer")]
    MissingIndexBuffer,

    /// Draw without geometry on a stage that reads a vertex buffer
    #[error("Vertex stage {stage:?} reads a vertex buffer but none is bound")]
    MissingVertexBuffer {
        /// Vertex stage of the pipeline
        stage: VertexStage,
    },

    /// Geometry bound for a stage that generates its vertices
    #[error("Vertex stage {stage:?} generates its vertices; no geometry may be bound")]
    UnexpectedGeometry {
        /// Vertex stage of the pipeline
        stage: VertexStage,
    },

    /// Upload falls outside the destination buffer
    #[error("Upload of {len} bytes at offset {offset} exceeds buffer capacity {capacity}")]
    UploadOutOfBounds {
        /// Byte offset
        offset: u64,
        /// Byte count
        len: u64,
        /// Buffer capacity
        capacity: u64,
    },

    /// Buffer handle is not known to the backend
    #[error("Unknown buffer handle")]
    UnknownBuffer,

    /// Backend rejected an operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Frame operation outside `begin_frame` / `end_frame`
    #[error("No frame is being recorded")]
    FrameNotStarted,

    /// `begin_frame` called while a frame is still being recorded
    #[error("Frame {0} is still being recorded")]
    FrameInProgress(u64),

    /// Vulkan API failure
    #[error("Vulkan API error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Configuration failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Recoverable per-frame conditions
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameWarning {
    /// More point lights than the frame block holds; the excess was ignored
    #[error("{supplied} point lights supplied, only {capacity} packed")]
    LightOverflow {
        /// Lights supplied by the caller
        supplied: usize,
        /// Capacity of the frame block
        capacity: usize,
    },

    /// Atlas index past the atlas array; the instance was dropped
    #[error("atlas index {atlas_index} out of range at input position {position}")]
    AtlasIndexOutOfRange {
        /// Offending index
        atlas_index: u32,
        /// Position of the instance in the caller's input
        position: usize,
    },
}
