//! # Frame Binding
//!
//! Host-side resource binding for a small Vulkan shader set: colored meshes,
//! normal visualization, per-vertex Lambert lighting, instanced atlas sprites
//! and text, and UI quads/text.
//!
//! ## Features
//!
//! - **Layout Table**: every shader stage's sets, bindings and block layouts
//! - **Uniform Packing**: std140 row-major frame, mesh, UI and text blocks
//! - **Instance Streams**: storage buffer arrays indexed by `gl_InstanceIndex`
//! - **Pipeline Validation**: vertex/fragment set layouts checked at creation
//! - **Draw Dispatch**: explicit bind/issue state machine per draw
//! - **Frames in Flight**: fenced slot reuse for upload buffers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_binding::prelude::*;
//! use frame_binding::backend::recording::RecordingBackend;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BindingConfig::default();
//!     let mut backend = RecordingBackend::new();
//!     let mut binder = FrameBinder::new(&mut backend, LayoutTable::builtin(), config)?;
//!
//!     let camera = Camera::default();
//!     let scene = SceneFrame::new(&camera);
//!     let report = binder.render_frame(&mut backend, &scene, |backend, fence| {
//!         backend.submit(fence);
//!         Ok(())
//!     })?;
//!     println!("{} draws", report.draws_issued);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod error;

pub mod layout;
pub mod blocks;
pub mod arena;
pub mod packer;
pub mod instance;
pub mod pipeline;
pub mod dispatch;
pub mod frame;
pub mod backend;
pub mod scene;
pub mod shading;

mod binder;

#[cfg(test)]
mod tests;

pub use binder::{FrameBinder, FrameReport};
pub use error::{BindingError, BindingResult, FrameWarning};

/// Common imports for binding layer users
pub mod prelude {
    pub use crate::{
        FrameBinder, FrameReport,
        BindingError, BindingResult, FrameWarning,
        config::{BindingConfig, Config},
        foundation::math::{Vec2, Vec3, Vec4, Mat3, Mat4, Transform, Transform2D},
        layout::{LayoutTable, VertexStage, FragmentStage, MemoryLayout},
        blocks::{MAX_POINT_LIGHTS, MAX_ATLASES},
        pipeline::{PipelineVariant, PipelineKey},
        scene::{
            Camera, AmbientLight, PointLight, Mesh, MeshDraw, MeshShading, InstancedMeshBatch,
            SpriteInstance, SpriteBatch, TextDraw, UiQuadDraw, UiTextDraw, SceneFrame,
            GeometryRef,
        },
        backend::{
            CommandSink, UploadTarget, ResourceBinder, PipelineFactory, GpuFence, FenceFactory,
            RenderBackend,
        },
    };
}
