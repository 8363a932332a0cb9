//! Frame binder
//!
//! Top-level orchestration of one frame: pack uniform blocks and instance
//! streams into the current frame slot, upload them, allocate descriptor sets
//! for every draw, record the draws pass by pass and submit.

use std::collections::HashMap;

use crate::arena::Region;
use crate::backend::{BufferUsage, DescriptorWrite, RenderBackend};
use crate::blocks::{MeshInstanceBlock, SpriteInstanceBlock};
use crate::config::BindingConfig;
use crate::dispatch::{DispatchStats, DrawCall, DrawDispatcher, DrawList, DrawShape, GeometryBinding};
use crate::error::{BindingError, BindingResult};
use crate::frame::{FrameDiagnostics, FrameRing};
use crate::instance::InstanceStream;
use crate::layout::LayoutTable;
use crate::pipeline::{PipelineKey, PipelineManager, PipelineVariant};
use crate::scene::{GeometryRef, MeshShading, SceneFrame};

/// Outcome of one rendered frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame counter value of this frame
    pub frame_number: u64,
    /// Frame slot the frame was recorded in
    pub slot: usize,
    /// Draw commands recorded
    pub draws_issued: usize,
    /// Pipeline binds recorded
    pub pipeline_binds: usize,
    /// Distinct descriptor sets allocated
    pub descriptor_sets: usize,
    /// Recoverable problems of the frame
    pub diagnostics: FrameDiagnostics,
}

impl FrameReport {
    /// Instances and text batches dropped for an out-of-range atlas index
    pub fn dropped_instances(&self) -> usize {
        self.diagnostics.atlas_index_errors()
    }

    /// Whether more point lights were supplied than packed
    pub fn light_overflow(&self) -> bool {
        self.diagnostics.light_overflows() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PlannedWrite {
    binding: u32,
    usage: BufferUsage,
    region: Region,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlannedSet {
    set: u32,
    writes: Vec<PlannedWrite>,
}

impl PlannedSet {
    fn uniform(set: u32, binding: u32, region: Region) -> Self {
        Self {
            set,
            writes: vec![PlannedWrite { binding, usage: BufferUsage::Uniform, region }],
        }
    }

    fn storage(set: u32, binding: u32, region: Region) -> Self {
        Self {
            set,
            writes: vec![PlannedWrite { binding, usage: BufferUsage::Storage, region }],
        }
    }

    /// Set holding only backend-owned sampler / image bindings
    const fn textures(set: u32) -> Self {
        Self { set, writes: Vec::new() }
    }
}

#[derive(Debug)]
struct PlannedDraw<B> {
    variant: PipelineVariant,
    sets: Vec<PlannedSet>,
    geometry: GeometryBinding<B>,
    shape: DrawShape,
}

/// Binds a frame's resources and draws for a render backend
pub struct FrameBinder<T: RenderBackend> {
    table: LayoutTable,
    config: BindingConfig,
    pipelines: PipelineManager<T::Pipeline>,
    ring: FrameRing<T::Buffer, T::Fence>,
    dispatcher: DrawDispatcher,
    mesh_instances: InstanceStream<MeshInstanceBlock>,
    sprite_instances: InstanceStream<SpriteInstanceBlock>,
    text_instances: InstanceStream<SpriteInstanceBlock>,
}

impl<T: RenderBackend> FrameBinder<T> {
    /// Validate the layout table, create every pipeline variant and the frame ring
    ///
    /// Fails without creating anything further on the first layout error.
    pub fn new(backend: &mut T, table: LayoutTable, config: BindingConfig) -> BindingResult<Self> {
        table.validate_host_blocks()?;

        let mut pipelines = PipelineManager::new();
        pipelines.initialize_standard_pipelines(backend, &table)?;
        let ring = FrameRing::new(backend, &config)?;

        log::info!(
            "Frame binder ready: {} pipelines, {} frames in flight",
            pipelines.len(),
            ring.len()
        );

        Ok(Self {
            table,
            config,
            pipelines,
            ring,
            dispatcher: DrawDispatcher::new(),
            mesh_instances: InstanceStream::new(),
            sprite_instances: InstanceStream::new(),
            text_instances: InstanceStream::new(),
        })
    }

    /// Layout table the pipelines were validated against
    pub const fn table(&self) -> &LayoutTable {
        &self.table
    }

    /// Active configuration
    pub const fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Created pipelines
    pub const fn pipelines(&self) -> &PipelineManager<T::Pipeline> {
        &self.pipelines
    }

    /// Frame ring
    pub const fn ring(&self) -> &FrameRing<T::Buffer, T::Fence> {
        &self.ring
    }

    /// Record and submit one frame
    ///
    /// `submit` receives the backend and the fence that must signal when the
    /// GPU is done with the frame. On any error before submission the frame
    /// is abandoned and its slot stays free.
    pub fn render_frame<S>(
        &mut self,
        backend: &mut T,
        scene: &SceneFrame<'_, T::Buffer>,
        submit: S,
    ) -> BindingResult<FrameReport>
    where
        S: FnOnce(&mut T, &T::Fence) -> BindingResult<()>,
    {
        self.ring.begin_frame(backend)?;
        let frame_number = self.ring.frame_number();
        let slot = self.ring.slot_index();

        let (stats, descriptor_sets) = match self.record_frame(backend, scene) {
            Ok(recorded) => recorded,
            Err(error) => {
                log::error!("Frame {} abandoned: {}", frame_number, error);
                self.ring.abandon();
                return Err(error);
            }
        };

        let diagnostics = self.ring.end_frame(backend, submit)?;
        log::trace!(
            "Frame {} recorded {} draws with {} pipeline binds",
            frame_number,
            stats.draws,
            stats.pipeline_binds
        );

        Ok(FrameReport {
            frame_number,
            slot,
            draws_issued: stats.draws,
            pipeline_binds: stats.pipeline_binds,
            descriptor_sets,
            diagnostics,
        })
    }

    fn record_frame(
        &mut self,
        backend: &mut T,
        scene: &SceneFrame<'_, T::Buffer>,
    ) -> BindingResult<(DispatchStats, usize)> {
        let planned = self.plan(scene)?;
        let (uniform_buffer, storage_buffer) = self.ring.upload(backend)?;
        let slot_index = self.ring.slot_index();

        // Identical sets within a frame share one allocation
        let mut allocated: HashMap<(PipelineKey, PlannedSet), T::DescriptorSet> = HashMap::new();
        let mut list = DrawList::new();

        for draw in planned {
            let key = self.pipelines.key(draw.variant)?;
            let layout = &self.pipelines.get(key)?.layout;

            let mut descriptor_sets = Vec::with_capacity(draw.sets.len());
            for planned_set in draw.sets {
                let set = planned_set.set;
                let cache_key = (key, planned_set);
                let descriptor_set = match allocated.get(&cache_key) {
                    Some(&descriptor_set) => descriptor_set,
                    None => {
                        let set_layout = layout
                            .set(set)
                            .ok_or(BindingError::UnexpectedDescriptorSet { set })?;
                        let writes: Vec<DescriptorWrite<T::Buffer>> = cache_key
                            .1
                            .writes
                            .iter()
                            .map(|write| DescriptorWrite {
                                binding: write.binding,
                                buffer: match write.usage {
                                    BufferUsage::Uniform => uniform_buffer,
                                    BufferUsage::Storage => storage_buffer,
                                },
                                region: write.region,
                            })
                            .collect();
                        let descriptor_set = backend.descriptor_set(slot_index, set_layout, &writes)?;
                        allocated.insert(cache_key, descriptor_set);
                        descriptor_set
                    }
                };
                descriptor_sets.push((set, descriptor_set));
            }

            list.push(DrawCall {
                pipeline: key,
                descriptor_sets,
                geometry: draw.geometry,
                shape: draw.shape,
            });
        }

        let stats = list.record(&mut self.dispatcher, backend, &self.pipelines)?;
        Ok((stats, allocated.len()))
    }

    /// Pack every block of the frame and plan its draws
    fn plan(&mut self, scene: &SceneFrame<'_, T::Buffer>) -> BindingResult<Vec<PlannedDraw<T::Buffer>>> {
        let slot = self.ring.current_slot()?;
        let mut draws = Vec::new();

        let (frame_region, overflow) = slot
            .uniforms
            .pack_frame(scene.camera, &scene.ambient, &scene.point_lights);
        if let Some(warning) = overflow {
            slot.warn(warning);
        }
        let frame_set = PlannedSet::uniform(0, 0, frame_region);

        for draw in &scene.meshes {
            let region = slot.uniforms.pack_mesh(draw.mesh.model_matrix());
            draws.push(PlannedDraw {
                variant: mesh_variant(draw.shading),
                sets: vec![frame_set.clone(), PlannedSet::uniform(1, 0, region)],
                geometry: GeometryBinding::from(&draw.geometry),
                shape: geometry_shape(&draw.geometry, 1, 0),
            });
        }

        for batch in &scene.instanced_meshes {
            if batch.models.is_empty() {
                continue;
            }
            self.mesh_instances.clear();
            for model in batch.models {
                self.mesh_instances.push(model);
            }
            let region = self.mesh_instances.write_to(&mut slot.storage);
            draws.push(PlannedDraw {
                variant: PipelineVariant::InstancedMesh,
                sets: vec![frame_set.clone(), PlannedSet::storage(1, 0, region)],
                geometry: GeometryBinding::from(&batch.geometry),
                shape: geometry_shape(&batch.geometry, self.mesh_instances.len() as u32, 0),
            });
        }

        for batch in &scene.sprites {
            self.sprite_instances.clear();
            let count = self
                .sprite_instances
                .extend_sprites(batch.instances, |warning| slot.diagnostics.record(warning));
            if count == 0 {
                continue;
            }
            let region = self.sprite_instances.write_to(&mut slot.storage);
            draws.push(PlannedDraw {
                variant: PipelineVariant::Sprite,
                sets: atlas_split_sets(region),
                geometry: GeometryBinding::none(),
                shape: DrawShape::quads(count),
            });
        }

        // One instance per text, selected by first_instance. A rejected
        // text's warning position is its index in `scene.text`.
        self.text_instances.clear();
        let mut text_draws = Vec::with_capacity(scene.text.len());
        for text in &scene.text {
            match self.text_instances.push(&text.transform, text.atlas_index) {
                Ok(instance) => text_draws.push((instance, &text.geometry)),
                Err(warning) => slot.warn(warning),
            }
        }
        if !text_draws.is_empty() {
            let region = self.text_instances.write_to(&mut slot.storage);
            for (instance, geometry) in text_draws {
                draws.push(PlannedDraw {
                    variant: PipelineVariant::Text,
                    sets: atlas_split_sets(region),
                    geometry: GeometryBinding::from(geometry),
                    shape: geometry_shape(geometry, 1, instance),
                });
            }
        }

        for quad in &scene.ui_quads {
            let region = slot.uniforms.pack_ui_element(&quad.transform);
            draws.push(PlannedDraw {
                variant: PipelineVariant::UiQuad,
                sets: vec![PlannedSet::uniform(0, 2, region)],
                geometry: GeometryBinding::from(&quad.geometry),
                shape: geometry_shape(&quad.geometry, 1, 0),
            });
        }

        for (position, text) in scene.ui_text.iter().enumerate() {
            let text_region = match slot.uniforms.pack_text(text.atlas_index, position) {
                Ok(region) => region,
                Err(warning) => {
                    slot.warn(warning);
                    continue;
                }
            };
            let element_region = slot.uniforms.pack_ui_element(&text.transform);
            let mut set = PlannedSet::uniform(0, 2, element_region);
            set.writes.push(PlannedWrite {
                binding: 3,
                usage: BufferUsage::Uniform,
                region: text_region,
            });
            draws.push(PlannedDraw {
                variant: PipelineVariant::UiText,
                sets: vec![set],
                geometry: GeometryBinding::from(&text.geometry),
                shape: geometry_shape(&text.geometry, 1, 0),
            });
        }

        Ok(draws)
    }
}

const fn mesh_variant(shading: MeshShading) -> PipelineVariant {
    match shading {
        MeshShading::Basic => PipelineVariant::BasicMesh,
        MeshShading::Normal => PipelineVariant::NormalMesh,
        MeshShading::Lambert => PipelineVariant::LambertMesh,
    }
}

/// Instance storage at set 0, sampler at set 1, atlases at set 2
fn atlas_split_sets(instances: Region) -> Vec<PlannedSet> {
    vec![
        PlannedSet::storage(0, 0, instances),
        PlannedSet::textures(1),
        PlannedSet::textures(2),
    ]
}

/// Indexed draw when the geometry has indices, plain draw otherwise
fn geometry_shape<B>(geometry: &GeometryRef<B>, instance_count: u32, first_instance: u32) -> DrawShape {
    if geometry.index_buffer.is_some() {
        DrawShape::indexed(geometry.index_count, instance_count, first_instance)
    } else {
        DrawShape::Draw {
            vertex_count: geometry.vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordedBuffer;

    #[test]
    fn test_geometry_shape() {
        let indexed = GeometryRef::indexed(RecordedBuffer(0), RecordedBuffer(1), 4, 6);
        assert_eq!(geometry_shape(&indexed, 3, 2), DrawShape::indexed(6, 3, 2));

        let plain = GeometryRef {
            vertex_buffer: RecordedBuffer(0),
            index_buffer: None,
            vertex_count: 3,
            index_count: 0,
        };
        assert!(matches!(
            geometry_shape(&plain, 1, 0),
            DrawShape::Draw { vertex_count: 3, instance_count: 1, .. }
        ));
    }

    #[test]
    fn test_identical_sets_share_a_cache_key() {
        let region = Region { offset: 0, range: 304 };
        assert_eq!(PlannedSet::uniform(0, 0, region), PlannedSet::uniform(0, 0, region));
        assert_ne!(PlannedSet::uniform(0, 0, region), PlannedSet::storage(0, 0, region));
        assert_eq!(atlas_split_sets(region).len(), 3);
    }
}
