//! Draw dispatch
//!
//! A draw is an explicit, immutable `DrawCall`: pipeline, descriptor sets,
//! geometry and draw shape. The dispatcher checks it against the pipeline's
//! merged layout and then walks the bind/issue state machine, recording each
//! step into a `CommandSink`. Nothing is recorded for a draw that fails the
//! check.

mod state;

pub use state::{DispatchAction, DispatchState};

use crate::backend::CommandSink;
use crate::error::{BindingError, BindingResult};
use crate::pipeline::{PipelineKey, PipelineLayoutDesc, PipelineManager};
use crate::scene::GeometryRef;

/// Vertices generated per sprite instance from `gl_VertexIndex`
pub const QUAD_VERTICES: u32 = 6;

/// Shape of the recorded draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawShape {
    /// Non-indexed draw
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex
        first_vertex: u32,
        /// First `gl_InstanceIndex`
        first_instance: u32,
    },
    /// Draw with a `u16` index buffer
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index
        first_index: u32,
        /// Added to every index
        vertex_offset: i32,
        /// First `gl_InstanceIndex`
        first_instance: u32,
    },
}

impl DrawShape {
    /// Instanced quads with vertices generated in the shader
    pub const fn quads(instance_count: u32) -> Self {
        Self::Draw {
            vertex_count: QUAD_VERTICES,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    /// Indexed draw of `index_count` indices
    pub const fn indexed(index_count: u32, instance_count: u32, first_instance: u32) -> Self {
        Self::DrawIndexed {
            index_count,
            instance_count,
            first_index: 0,
            vertex_offset: 0,
            first_instance,
        }
    }

    /// Number of instances drawn
    pub const fn instance_count(&self) -> u32 {
        match *self {
            Self::Draw { instance_count, .. } | Self::DrawIndexed { instance_count, .. } => instance_count,
        }
    }
}

/// Vertex and index buffers of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBinding<B> {
    /// Vertex buffer, bound at binding 0
    pub vertex_buffer: Option<B>,
    /// `u16` index buffer
    pub index_buffer: Option<B>,
}

impl<B> GeometryBinding<B> {
    /// No buffers; vertices come from `gl_VertexIndex`
    pub const fn none() -> Self {
        Self {
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    /// Whether any buffer is bound
    pub const fn is_some(&self) -> bool {
        self.vertex_buffer.is_some() || self.index_buffer.is_some()
    }
}

impl<B: Copy> From<&GeometryRef<B>> for GeometryBinding<B> {
    fn from(geometry: &GeometryRef<B>) -> Self {
        Self {
            vertex_buffer: Some(geometry.vertex_buffer),
            index_buffer: geometry.index_buffer,
        }
    }
}

/// Everything one draw binds
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall<DS, B> {
    /// Pipeline to draw with
    pub pipeline: PipelineKey,
    /// `(set index, descriptor set)` pairs
    pub descriptor_sets: Vec<(u32, DS)>,
    /// Geometry buffers
    pub geometry: GeometryBinding<B>,
    /// Draw shape
    pub shape: DrawShape,
}

impl<DS, B> DrawCall<DS, B> {
    /// Check the draw against its pipeline layout
    ///
    /// The bound set indices must equal the layout's set indices, the
    /// geometry must match where the vertex stage takes its vertices from,
    /// and an indexed draw needs an index buffer.
    pub fn validate(&self, layout: &PipelineLayoutDesc) -> BindingResult<()> {
        for set in layout.set_indices() {
            if !self.descriptor_sets.iter().any(|(index, _)| *index == set) {
                return Err(BindingError::MissingDescriptorSet { set });
            }
        }

        for (position, (set, _)) in self.descriptor_sets.iter().enumerate() {
            let duplicate = self.descriptor_sets[..position].iter().any(|(s, _)| s == set);
            if duplicate || layout.set(*set).is_none() {
                return Err(BindingError::UnexpectedDescriptorSet { set: *set });
            }
        }

        let stage = layout.shaders.vertex;
        if stage.generates_vertices() {
            if self.geometry.is_some() {
                return Err(BindingError::UnexpectedGeometry { stage });
            }
        } else if self.geometry.vertex_buffer.is_none() {
            return Err(BindingError::MissingVertexBuffer { stage });
        }

        if matches!(self.shape, DrawShape::DrawIndexed { .. }) && self.geometry.index_buffer.is_none() {
            return Err(BindingError::MissingIndexBuffer);
        }

        Ok(())
    }
}

/// Counters for one recording pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Draws recorded
    pub draws: usize,
    /// Pipeline binds recorded
    pub pipeline_binds: usize,
    /// Descriptor set binds recorded
    pub set_binds: usize,
}

/// Records draws through the bind/issue state machine
#[derive(Debug, Default)]
pub struct DrawDispatcher {
    state: DispatchState,
    bound_pipeline: Option<PipelineKey>,
    stats: DispatchStats,
}

impl DrawDispatcher {
    /// Idle dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// Counters since the last `begin_pass`
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Start recording into a fresh command stream
    ///
    /// Forgets the bound pipeline, since a new stream starts with no state.
    pub fn begin_pass(&mut self) {
        self.state = DispatchState::Idle;
        self.bound_pipeline = None;
        self.stats = DispatchStats::default();
    }

    /// Bind a pipeline; a rebind of the bound pipeline records nothing
    pub fn bind_pipeline<S: CommandSink>(
        &mut self,
        sink: &mut S,
        key: PipelineKey,
        pipeline: S::Pipeline,
    ) -> BindingResult<()> {
        self.state = self.state.advance(DispatchAction::BindPipeline)?;
        if self.bound_pipeline != Some(key) {
            sink.bind_pipeline(pipeline);
            self.bound_pipeline = Some(key);
            self.stats.pipeline_binds += 1;
        }
        Ok(())
    }

    /// Bind the descriptor sets of a draw
    pub fn bind_descriptor_sets<S: CommandSink>(
        &mut self,
        sink: &mut S,
        pipeline: S::Pipeline,
        sets: &[(u32, S::DescriptorSet)],
    ) -> BindingResult<()> {
        self.state = self.state.advance(DispatchAction::BindSets)?;
        for &(set, descriptor_set) in sets {
            sink.bind_descriptor_set(pipeline, set, descriptor_set);
            self.stats.set_binds += 1;
        }
        Ok(())
    }

    /// Bind vertex and index buffers
    pub fn bind_geometry<S: CommandSink>(
        &mut self,
        sink: &mut S,
        geometry: &GeometryBinding<S::Buffer>,
    ) -> BindingResult<()> {
        self.state = self.state.advance(DispatchAction::BindBuffers)?;
        if let Some(buffer) = geometry.vertex_buffer {
            sink.bind_vertex_buffer(buffer, 0);
        }
        if let Some(buffer) = geometry.index_buffer {
            sink.bind_index_buffer(buffer, 0);
        }
        Ok(())
    }

    /// Record the draw
    pub fn issue<S: CommandSink>(&mut self, sink: &mut S, shape: DrawShape) -> BindingResult<()> {
        self.state = self.state.advance(DispatchAction::Issue)?;
        match shape {
            DrawShape::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
                sink.draw(vertex_count, instance_count, first_vertex, first_instance);
            }
            DrawShape::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance } => {
                sink.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
            }
        }
        self.stats.draws += 1;
        Ok(())
    }

    /// Return to `Idle` after an issued draw
    pub fn finish(&mut self) -> BindingResult<()> {
        self.state = self.state.advance(DispatchAction::Finish)?;
        Ok(())
    }

    /// Validate and record one draw
    pub fn dispatch<S: CommandSink>(
        &mut self,
        sink: &mut S,
        pipelines: &PipelineManager<S::Pipeline>,
        call: &DrawCall<S::DescriptorSet, S::Buffer>,
    ) -> BindingResult<()> {
        let entry = pipelines.get(call.pipeline)?;
        call.validate(&entry.layout)?;

        log::trace!("Dispatching {:?} with {:?}", call.shape, entry.layout.shaders);

        let result = self.record(sink, call.pipeline, entry.handle, call);
        if result.is_err() {
            self.state = DispatchState::Idle;
        }
        result
    }

    fn record<S: CommandSink>(
        &mut self,
        sink: &mut S,
        key: PipelineKey,
        pipeline: S::Pipeline,
        call: &DrawCall<S::DescriptorSet, S::Buffer>,
    ) -> BindingResult<()> {
        self.bind_pipeline(sink, key, pipeline)?;
        self.bind_descriptor_sets(sink, pipeline, &call.descriptor_sets)?;
        if call.geometry.is_some() {
            self.bind_geometry(sink, &call.geometry)?;
        }
        self.issue(sink, call.shape)?;
        self.finish()
    }
}

/// Draws of one pipeline, recorded back to back
#[derive(Debug, Clone, PartialEq)]
pub struct DrawPass<DS, B> {
    /// Pipeline shared by every draw
    pub pipeline: PipelineKey,
    /// Draws in submission order
    pub draws: Vec<DrawCall<DS, B>>,
}

/// Frame draws grouped into one pass per pipeline
///
/// Passes keep the order in which their pipeline first appeared; draws keep
/// submission order within a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawList<DS, B> {
    passes: Vec<DrawPass<DS, B>>,
}

impl<DS, B> Default for DrawList<DS, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<DS, B> DrawList<DS, B> {
    /// Empty list
    pub const fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Queue a draw
    pub fn push(&mut self, call: DrawCall<DS, B>) {
        match self.passes.iter_mut().find(|pass| pass.pipeline == call.pipeline) {
            Some(pass) => pass.draws.push(call),
            None => self.passes.push(DrawPass {
                pipeline: call.pipeline,
                draws: vec![call],
            }),
        }
    }

    /// Queued passes
    pub fn passes(&self) -> &[DrawPass<DS, B>] {
        &self.passes
    }

    /// Number of queued draws
    pub fn len(&self) -> usize {
        self.passes.iter().map(|pass| pass.draws.len()).sum()
    }

    /// Whether no draw is queued
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Drop every queued draw
    pub fn clear(&mut self) {
        self.passes.clear();
    }

    /// Record every pass
    ///
    /// All draws are validated before the first command is recorded.
    pub fn record<S>(
        &self,
        dispatcher: &mut DrawDispatcher,
        sink: &mut S,
        pipelines: &PipelineManager<S::Pipeline>,
    ) -> BindingResult<DispatchStats>
    where
        S: CommandSink<DescriptorSet = DS, Buffer = B>,
    {
        for pass in &self.passes {
            let layout = &pipelines.get(pass.pipeline)?.layout;
            for call in &pass.draws {
                call.validate(layout)?;
            }
        }

        dispatcher.begin_pass();
        for pass in &self.passes {
            for call in &pass.draws {
                dispatcher.dispatch(sink, pipelines, call)?;
            }
        }
        Ok(dispatcher.stats())
    }
}
