//! Binding layer demo
//!
//! Drives three frames of a small scene (flat and lit meshes, an instanced
//! asteroid field, sprites, world text and UI text) through the recording
//! backend and logs what each frame would hand the GPU.
//!
//! Reads `binding.toml` from the working directory when present.

use frame_binding::backend::recording::{RecordedBuffer, RecordedCommand, RecordingBackend};
use frame_binding::foundation::logging;
use frame_binding::foundation::math::screen_projection;
use frame_binding::prelude::*;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] frame_binding::config::ConfigError),

    #[error("binding: {0}")]
    Binding(#[from] BindingError),
}

const FRAMES: usize = 3;

struct Geometry {
    cube: GeometryRef<RecordedBuffer>,
    quad: GeometryRef<RecordedBuffer>,
    text: GeometryRef<RecordedBuffer>,
}

impl Geometry {
    fn new(backend: &mut RecordingBackend) -> Result<Self, DemoError> {
        // Contents are irrelevant to the binding layer; only handles are recorded
        let mut buffer = |size| backend.create_host_buffer(frame_binding::backend::BufferUsage::Storage, size);
        Ok(Self {
            cube: GeometryRef::indexed(buffer(24 * 32)?, buffer(36 * 2)?, 24, 36),
            quad: GeometryRef::indexed(buffer(4 * 16)?, buffer(6 * 2)?, 4, 6),
            text: GeometryRef::indexed(buffer(5 * 4 * 16)?, buffer(5 * 6 * 2)?, 5 * 4, 5 * 6),
        })
    }
}

fn main() -> Result<(), DemoError> {
    logging::init();

    let config = BindingConfig::load_or_default("binding.toml")?;
    log::info!("Binding config: {:?}", config);

    let mut backend = RecordingBackend::new();
    let mut binder = FrameBinder::new(&mut backend, LayoutTable::builtin(), config)?;
    let geometry = Geometry::new(&mut backend)?;

    let mut ship = Mesh::new(Transform::from_position(Vec3::new(-1.5, 0.0, 0.0)));
    let station = Mesh::new(Transform::from_position(Vec3::new(1.5, 0.0, -2.0)));

    let asteroids: Vec<Mat4> = (0..16)
        .map(|i| {
            let angle = i as f32 / 16.0 * std::f32::consts::TAU;
            Transform::from_position(Vec3::new(angle.cos() * 6.0, 0.0, angle.sin() * 6.0)).to_matrix()
        })
        .collect();

    // Atlas 11 does not exist; the binder drops that sprite and reports it
    let sprites: Vec<SpriteInstance> = [0, 1, 2, 11, 3]
        .iter()
        .enumerate()
        .map(|(i, &atlas)| SpriteInstance::new(&Transform2D::from_position(Vec2::new(i as f32, 2.0)), atlas))
        .collect();

    let ui_transform = screen_projection(800.0, 600.0) * Transform2D::from_position(Vec2::new(16.0, 16.0)).to_matrix();

    for frame in 0..FRAMES {
        let eye = Vec3::new(0.0, 3.0, 10.0 - frame as f32);
        let camera = Camera::perspective(eye, Vec3::zeros(), 45.0, 800.0 / 600.0, 0.1, 100.0);
        ship.set_position(Vec3::new(-1.5, frame as f32 * 0.25, 0.0));

        let mut scene = SceneFrame::new(&camera)
            .with_ambient(AmbientLight { color: Vec3::new(0.6, 0.7, 1.0), intensity: 0.15 })
            .add_light(PointLight {
                position: Vec3::new(0.0, 5.0, 5.0),
                color: Vec3::new(1.0, 0.9, 0.8),
                intensity: 1.2,
            });
        scene.meshes.push(MeshDraw { mesh: &ship, geometry: geometry.cube, shading: MeshShading::Lambert });
        scene.meshes.push(MeshDraw { mesh: &station, geometry: geometry.cube, shading: MeshShading::Normal });
        scene.instanced_meshes.push(InstancedMeshBatch { models: &asteroids, geometry: geometry.cube });
        scene.sprites.push(SpriteBatch { instances: &sprites });
        // Glyph quads of each string live in the text geometry
        scene.text.push(TextDraw::new(&Transform2D::from_position(Vec2::new(0.0, -2.0)), 4, geometry.text));
        scene.text.push(TextDraw::new(&Transform2D::from_position(Vec2::new(0.0, -3.0)), 4, geometry.text));
        scene.ui_quads.push(UiQuadDraw { transform: ui_transform, geometry: geometry.quad });
        scene.ui_text.push(UiTextDraw { transform: ui_transform, atlas_index: 5, geometry: geometry.quad });

        let report = binder.render_frame(&mut backend, &scene, |backend, fence| {
            backend.submit(fence);
            Ok(())
        })?;

        let commands = backend.take_commands();
        log_summary(&report, &commands);
    }

    log::info!(
        "{} frames submitted, {} fence waits",
        backend.submissions(),
        backend.fence_waits()
    );
    Ok(())
}

fn log_summary(report: &FrameReport, commands: &[RecordedCommand]) {
    let mut pipelines = 0;
    let mut sets = 0;
    let mut buffers = 0;
    let mut draws = 0;
    for command in commands {
        match command {
            RecordedCommand::BindPipeline(_) => pipelines += 1,
            RecordedCommand::BindDescriptorSet { .. } => sets += 1,
            RecordedCommand::BindVertexBuffer { .. } | RecordedCommand::BindIndexBuffer { .. } => buffers += 1,
            RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => draws += 1,
        }
    }

    log::info!(
        "Frame {} (slot {}): {} commands, {} pipeline binds, {} set binds, {} buffer binds, {} draws, {} descriptor sets",
        report.frame_number,
        report.slot,
        commands.len(),
        pipelines,
        sets,
        buffers,
        draws,
        report.descriptor_sets
    );
    for warning in report.diagnostics.first_of_each() {
        log::debug!("  first: {}", warning);
    }
}
