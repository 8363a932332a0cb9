//! Whole-frame tests: scene in, recorded commands and uploaded bytes out

use std::collections::HashMap;

use approx::assert_relative_eq;

use crate::backend::recording::{
    RecordedBuffer, RecordedCommand, RecordedFence, RecordedPipeline, RecordedSet, RecordingBackend,
};
use crate::blocks::{FrameDataBlock, SpriteInstanceBlock, MAX_POINT_LIGHTS};
use crate::config::BindingConfig;
use crate::error::{BindingError, BindingResult, FrameWarning};
use crate::foundation::math::{Transform2D, Vec2, Vec3, Vec4};
use crate::layout::{LayoutTable, MemoryLayout, VertexStage};
use crate::scene::{
    Camera, GeometryRef, Mesh, MeshDraw, MeshShading, PointLight, SceneFrame, SpriteBatch, SpriteInstance,
    TextDraw, UiTextDraw,
};
use crate::shading;
use crate::{FrameBinder, FrameReport};

fn binder(backend: &mut RecordingBackend) -> FrameBinder<RecordingBackend> {
    FrameBinder::new(backend, LayoutTable::builtin(), BindingConfig::default()).unwrap()
}

fn submit(backend: &mut RecordingBackend, fence: &RecordedFence) -> BindingResult<()> {
    backend.submit(fence);
    Ok(())
}

fn quad_geometry() -> GeometryRef<RecordedBuffer> {
    GeometryRef::indexed(RecordedBuffer(900), RecordedBuffer(901), 4, 6)
}

fn light(x: f32) -> PointLight {
    PointLight {
        position: Vec3::new(x, 1.0, 0.0),
        color: Vec3::new(1.0, 1.0, 1.0),
        intensity: 1.0,
    }
}

fn sprites(atlas_indices: &[u32]) -> Vec<SpriteInstance> {
    atlas_indices
        .iter()
        .enumerate()
        .map(|(i, &atlas)| SpriteInstance::new(&Transform2D::from_position(Vec2::new(i as f32, 0.0)), atlas))
        .collect()
}

/// Bytes bound at `binding` of a recorded descriptor set
fn bound_bytes(backend: &RecordingBackend, set: RecordedSet, binding: u32) -> Vec<u8> {
    let descriptor = backend.descriptor(set).unwrap();
    let write = descriptor.writes.iter().find(|w| w.binding == binding).unwrap();
    backend.region_bytes(write.buffer, write.region).unwrap().to_vec()
}

/// Descriptor sets bound at `set` index, in recording order
fn sets_bound_at(commands: &[RecordedCommand], set_index: u32) -> Vec<RecordedSet> {
    commands
        .iter()
        .filter_map(|command| match *command {
            RecordedCommand::BindDescriptorSet { set, descriptor_set, .. } if set == set_index => Some(descriptor_set),
            _ => None,
        })
        .collect()
}

fn draws(commands: &[RecordedCommand]) -> Vec<RecordedCommand> {
    commands.iter().copied().filter(RecordedCommand::is_draw).collect()
}

#[test]
fn test_empty_frame_submits_without_draws() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();

    let report = binder
        .render_frame(&mut backend, &SceneFrame::new(&camera), submit)
        .unwrap();

    assert_eq!(report.draws_issued, 0);
    assert_eq!(report.frame_number, 0);
    assert!(report.diagnostics.is_empty());
    assert_eq!(backend.submissions(), 1);
    assert!(backend.commands().is_empty());
}

#[test]
fn test_mesh_frame_block_projects_origin() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let mesh = Mesh::default();

    let mut scene = SceneFrame::new(&camera).add_light(light(0.0)).add_light(light(2.0));
    scene.meshes.push(MeshDraw {
        mesh: &mesh,
        geometry: quad_geometry(),
        shading: MeshShading::Lambert,
    });

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.draws_issued, 1);

    let commands = backend.commands();
    assert!(matches!(commands[0], RecordedCommand::BindPipeline(_)));
    assert_eq!(
        draws(commands),
        vec![RecordedCommand::DrawIndexed {
            index_count: 6,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        }]
    );

    let frame_set = sets_bound_at(commands, 0)[0];
    let frame: FrameDataBlock = shading::read_block(&bound_bytes(&backend, frame_set, 0)).unwrap();
    assert_eq!(frame.point_light_count, 2);

    let mesh_set = sets_bound_at(commands, 1)[0];
    let mesh_block = shading::read_block(&bound_bytes(&backend, mesh_set, 0)).unwrap();
    let clip = shading::basic_vertex(&frame, &mesh_block, Vec3::zeros());
    assert_relative_eq!(clip, Vec4::new(0.0, 0.0, 0.0, 1.0));
}

#[test]
fn test_meshes_share_the_frame_set() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let meshes = [Mesh::default(), Mesh::default(), Mesh::default()];

    let mut scene = SceneFrame::new(&camera);
    for mesh in &meshes {
        scene.meshes.push(MeshDraw {
            mesh,
            geometry: quad_geometry(),
            shading: MeshShading::Basic,
        });
    }

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.draws_issued, 3);
    assert_eq!(report.pipeline_binds, 1);
    // One frame set plus one mesh set per draw
    assert_eq!(report.descriptor_sets, 4);

    let frame_sets = sets_bound_at(backend.commands(), 0);
    assert_eq!(frame_sets.len(), 3);
    assert!(frame_sets.iter().all(|&set| set == frame_sets[0]));
}

#[test]
fn test_light_overflow_warns_once() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let mesh = Mesh::default();

    let mut scene = SceneFrame::new(&camera);
    for i in 0..7 {
        scene = scene.add_light(light(i as f32));
    }
    scene.meshes.push(MeshDraw {
        mesh: &mesh,
        geometry: quad_geometry(),
        shading: MeshShading::Lambert,
    });

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert!(report.light_overflow());
    assert_eq!(
        report.diagnostics.first_of_each().collect::<Vec<_>>(),
        vec![FrameWarning::LightOverflow { supplied: 7, capacity: MAX_POINT_LIGHTS }]
    );

    let frame_set = sets_bound_at(backend.commands(), 0)[0];
    let frame: FrameDataBlock = shading::read_block(&bound_bytes(&backend, frame_set, 0)).unwrap();
    assert_eq!(frame.point_light_count as usize, MAX_POINT_LIGHTS);
    assert_relative_eq!(frame.point_lights[4].position[0], 4.0);
}

#[test]
fn test_sprite_stream_follows_instance_index() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let instances = sprites(&[0, 10, 9, 3]);

    let mut scene = SceneFrame::new(&camera);
    scene.sprites.push(SpriteBatch { instances: &instances });

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.dropped_instances(), 1);
    assert_eq!(
        report.diagnostics.first_of_each().collect::<Vec<_>>(),
        vec![FrameWarning::AtlasIndexOutOfRange { atlas_index: 10, position: 1 }]
    );

    let commands = backend.commands();
    assert_eq!(
        draws(commands),
        vec![RecordedCommand::Draw {
            vertex_count: 6,
            instance_count: 3,
            first_vertex: 0,
            first_instance: 0,
        }]
    );
    // Sprites read their quad from gl_VertexIndex
    assert!(!commands
        .iter()
        .any(|c| matches!(c, RecordedCommand::BindVertexBuffer { .. })));

    let storage = bound_bytes(&backend, sets_bound_at(commands, 0)[0], 0);
    assert_eq!(storage.len(), 3 * 64);
    let expected = [(0.0, 0), (2.0, 9), (3.0, 3)];
    for (index, &(x, atlas)) in expected.iter().enumerate() {
        let instance: SpriteInstanceBlock = shading::read_element(&storage, index).unwrap();
        let (corner, _, atlas_index) = shading::sprite_vertex(&instance, 2);
        assert_eq!(atlas_index, atlas);
        assert_relative_eq!(corner, Vec2::new(x + 0.5, 0.5));
    }

    assert_eq!(sets_bound_at(commands, 1).len(), 1);
    assert_eq!(sets_bound_at(commands, 2).len(), 1);
}

fn text(x: f32, atlas_index: u32) -> TextDraw<RecordedBuffer> {
    TextDraw::new(&Transform2D::from_position(Vec2::new(x, 0.0)), atlas_index, quad_geometry())
}

#[test]
fn test_text_draws_one_instance_per_text() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();

    let mut scene = SceneFrame::new(&camera);
    scene.text.push(text(0.0, 1));
    scene.text.push(text(4.0, 2));

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.draws_issued, 2);

    let commands = backend.commands();
    assert_eq!(
        draws(commands),
        vec![
            RecordedCommand::DrawIndexed { index_count: 6, instance_count: 1, first_index: 0, vertex_offset: 0, first_instance: 0 },
            RecordedCommand::DrawIndexed { index_count: 6, instance_count: 1, first_index: 0, vertex_offset: 0, first_instance: 1 },
        ]
    );

    let storage_sets = sets_bound_at(commands, 0);
    assert_eq!(storage_sets[0], storage_sets[1]);
    let storage = bound_bytes(&backend, storage_sets[0], 0);
    assert_eq!(storage.len(), 2 * 64);

    let (position, _, atlas) = shading::text_vertex(&storage, 1, Vec2::new(0.5, 0.5), Vec2::zeros()).unwrap();
    assert_relative_eq!(position, Vec2::new(4.5, 0.5));
    assert_eq!(atlas, 2);
}

#[test]
fn test_text_with_bad_atlas_reports_its_draw() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();

    let mut scene = SceneFrame::new(&camera);
    scene.text.push(text(0.0, 1));
    scene.text.push(text(1.0, 10));
    scene.text.push(text(2.0, 2));

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.draws_issued, 2);
    assert_eq!(
        report.diagnostics.first_of_each().collect::<Vec<_>>(),
        vec![FrameWarning::AtlasIndexOutOfRange { atlas_index: 10, position: 1 }]
    );

    let first_instances: Vec<u32> = draws(backend.commands())
        .into_iter()
        .filter_map(|draw| match draw {
            RecordedCommand::DrawIndexed { first_instance, .. } => Some(first_instance),
            _ => None,
        })
        .collect();
    assert_eq!(first_instances, vec![0, 1]);
}

/// How a draw gets its vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexSource {
    Generated,
    IndexedBuffers,
}

#[test]
fn test_each_pipeline_sees_one_vertex_source() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let instances = sprites(&[0, 1]);
    let transform = Transform2D::from_position(Vec2::new(8.0, 8.0)).to_matrix();

    let mut scene = SceneFrame::new(&camera);
    scene.sprites.push(SpriteBatch { instances: &instances });
    scene.text.push(text(0.0, 3));
    scene.sprites.push(SpriteBatch { instances: &instances });
    scene.text.push(text(1.0, 4));
    scene.ui_text.push(UiTextDraw { transform, atlas_index: 5, geometry: quad_geometry() });

    binder.render_frame(&mut backend, &scene, submit).unwrap();

    let mut sources: HashMap<RecordedPipeline, Vec<VertexSource>> = HashMap::new();
    let mut pipeline = None;
    let mut buffers_bound = false;
    for command in backend.commands() {
        match *command {
            RecordedCommand::BindPipeline(bound) => {
                pipeline = Some(bound);
                buffers_bound = false;
            }
            RecordedCommand::BindVertexBuffer { .. } | RecordedCommand::BindIndexBuffer { .. } => buffers_bound = true,
            RecordedCommand::Draw { vertex_count, .. } => {
                assert!(!buffers_bound, "plain draw after a buffer bind");
                assert_eq!(vertex_count, 6);
                sources.entry(pipeline.unwrap()).or_default().push(VertexSource::Generated);
            }
            RecordedCommand::DrawIndexed { .. } => {
                assert!(buffers_bound, "indexed draw without buffers");
                sources.entry(pipeline.unwrap()).or_default().push(VertexSource::IndexedBuffers);
                buffers_bound = false;
            }
            RecordedCommand::BindDescriptorSet { .. } => {}
        }
    }

    // Sprites, world text and UI text each got their own pipeline
    assert_eq!(sources.len(), 3);
    for (pipeline, kinds) in &sources {
        assert!(kinds.windows(2).all(|pair| pair[0] == pair[1]), "{:?} mixes {:?}", pipeline, kinds);
    }
    let generated = sources.values().filter(|kinds| kinds[0] == VertexSource::Generated).count();
    assert_eq!(generated, 1);
}

#[test]
fn test_ui_text_with_bad_atlas_is_skipped() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let transform = Transform2D::from_position(Vec2::new(20.0, 10.0)).to_matrix();

    let mut scene = SceneFrame::new(&camera);
    scene.ui_text.push(UiTextDraw { transform, atlas_index: 12, geometry: quad_geometry() });
    scene.ui_text.push(UiTextDraw { transform, atlas_index: 9, geometry: quad_geometry() });

    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.draws_issued, 1);
    assert_eq!(
        report.diagnostics.first_of_each().collect::<Vec<_>>(),
        vec![FrameWarning::AtlasIndexOutOfRange { atlas_index: 12, position: 0 }]
    );

    let set = sets_bound_at(backend.commands(), 0)[0];
    let text = bound_bytes(&backend, set, 3);
    assert_eq!(text.len(), 16);
    assert_eq!(u32::from_ne_bytes([text[0], text[1], text[2], text[3]]), 9);

    let element = shading::read_block(&bound_bytes(&backend, set, 2)).unwrap();
    assert_relative_eq!(shading::ui_vertex(&element, Vec2::zeros()), Vec2::new(20.0, 10.0));
}

#[test]
fn test_pending_slot_blocks_the_frame() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let scene = SceneFrame::new(&camera);

    let slots: Vec<usize> = (0..2)
        .map(|_| binder.render_frame(&mut backend, &scene, submit).map(|r: FrameReport| r.slot))
        .collect::<BindingResult<_>>()
        .unwrap();
    assert_eq!(slots, vec![0, 1]);

    backend.set_gpu_stalled(true);
    assert!(binder.render_frame(&mut backend, &scene, submit).is_err());
    assert_eq!(backend.submissions(), 2);
    assert!(!binder.ring().is_recording());

    backend.set_gpu_stalled(false);
    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(backend.fence_waits(), 1);
}

#[test]
fn test_failed_frame_is_abandoned() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let scene = SceneFrame::new(&camera);

    let result = binder.render_frame(&mut backend, &scene, |_, _| {
        Err(BindingError::Backend("device lost".to_string()))
    });
    assert!(matches!(result, Err(BindingError::Backend(_))));
    assert!(binder.render_frame(&mut backend, &scene, submit).is_ok());
}

#[test]
fn test_column_major_declaration_is_rejected() {
    let mut backend = RecordingBackend::new();
    let mut table = LayoutTable::builtin();
    if let Some(slots) = table.vertex.get_mut(&VertexStage::Basic) {
        if let Some(block) = slots[0].block.as_mut() {
            block.layout = MemoryLayout::STD140_COLUMN_MAJOR;
        }
    }

    let result = FrameBinder::new(&mut backend, table, BindingConfig::default());
    assert!(matches!(
        result,
        Err(BindingError::LayoutMismatch { declared_layout, .. }) if declared_layout == MemoryLayout::STD140_COLUMN_MAJOR
    ));
    assert_eq!(backend.pipeline_count(), 0);
}

#[test]
fn test_upload_buffers_do_not_grow_after_first_frame() {
    let mut backend = RecordingBackend::new();
    let mut binder = binder(&mut backend);
    let camera = Camera::default();
    let instances = sprites(&[1; 32]);

    let mut scene = SceneFrame::new(&camera);
    scene.sprites.push(SpriteBatch { instances: &instances });

    let first = binder.render_frame(&mut backend, &scene, submit).unwrap();
    let storage = sets_bound_at(backend.commands(), 0)[0];
    let buffer = backend.descriptor(storage).unwrap().writes[0].buffer;
    let capacity = backend.buffer_bytes(buffer).unwrap().len();
    backend.take_commands();

    for _ in 0..3 {
        binder.render_frame(&mut backend, &scene, submit).unwrap();
    }
    let report = binder.render_frame(&mut backend, &scene, submit).unwrap();
    assert_eq!(report.slot, first.slot);
    assert_eq!(backend.buffer_bytes(buffer).unwrap().len(), capacity);
}
