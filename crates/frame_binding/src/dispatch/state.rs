//! Per-draw dispatch state machine

use crate::error::{BindingError, BindingResult};

/// Where the dispatcher is within one draw
///
/// `Idle → PipelineBound → SetsBound → (BuffersBound) → Issued → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchState {
    /// No draw in progress
    #[default]
    Idle,
    /// Pipeline selected
    PipelineBound,
    /// Descriptor sets bound
    SetsBound,
    /// Vertex and index buffers bound
    BuffersBound,
    /// Draw recorded
    Issued,
}

/// Dispatcher steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Bind a pipeline
    BindPipeline,
    /// Bind the descriptor sets of the draw
    BindSets,
    /// Bind vertex and index buffers
    BindBuffers,
    /// Record the draw
    Issue,
    /// Close the draw
    Finish,
}

impl DispatchAction {
    /// Name used in transition errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::BindPipeline => "bind pipeline",
            Self::BindSets => "bind descriptor sets",
            Self::BindBuffers => "bind buffers",
            Self::Issue => "issue draw",
            Self::Finish => "finish draw",
        }
    }
}

impl DispatchState {
    /// State after `action`, or `InvalidTransition`
    pub fn advance(self, action: DispatchAction) -> BindingResult<Self> {
        use DispatchAction as A;
        use DispatchState as S;

        let next = match (self, action) {
            (S::Idle, A::BindPipeline) => S::PipelineBound,
            (S::PipelineBound, A::BindSets) => S::SetsBound,
            (S::SetsBound, A::BindBuffers) => S::BuffersBound,
            (S::SetsBound | S::BuffersBound, A::Issue) => S::Issued,
            (S::Issued, A::Finish) => S::Idle,
            (from, action) => {
                return Err(BindingError::InvalidTransition {
                    from,
                    action: action.name(),
                })
            }
        };
        Ok(next)
    }
}
