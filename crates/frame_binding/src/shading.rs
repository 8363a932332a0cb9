//! Reference shading
//!
//! CPU versions of the shader math, reading their inputs from packed block
//! bytes exactly as the shaders declare them. Agreement between these
//! functions and the scene input is what proves the host packing and the
//! shader declarations match.

use crate::blocks::{FrameDataBlock, GpuBlock, MeshDataBlock, MeshInstanceBlock, SpriteInstanceBlock, UiElementBlock};
use crate::dispatch::QUAD_VERTICES;
use crate::foundation::math::{gpu, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Unit quad corners in `gl_VertexIndex` order, two counter-clockwise triangles
const QUAD_CORNERS: [[f32; 2]; QUAD_VERTICES as usize] = [
    [-0.5, -0.5],
    [0.5, -0.5],
    [0.5, 0.5],
    [-0.5, -0.5],
    [0.5, 0.5],
    [-0.5, 0.5],
];

/// Read one block from the start of `bytes`
pub fn read_block<T: GpuBlock>(bytes: &[u8]) -> Option<T> {
    bytes.get(..T::SIZE).map(bytemuck::pod_read_unaligned)
}

/// Read element `index` of a storage array, as `buffer[gl_InstanceIndex]` does
pub fn read_element<T: GpuBlock>(bytes: &[u8], index: usize) -> Option<T> {
    let start = index.checked_mul(T::SIZE)?;
    read_block(bytes.get(start..)?)
}

/// Projection and view matrices of a frame block
pub fn frame_matrices(frame: &FrameDataBlock) -> (Mat4, Mat4) {
    (gpu::mat4_from_rows(&frame.projection), gpu::mat4_from_rows(&frame.view))
}

/// `projection * view * model * vec4(position, 1.0)`
pub fn basic_vertex(frame: &FrameDataBlock, mesh: &MeshDataBlock, position: Vec3) -> Vec4 {
    clip_position(frame, &gpu::mat4_from_rows(&mesh.model), position)
}

/// Clip position of one vertex of instance `instance_index`
///
/// `None` when the index is past the packed instances.
pub fn instanced_vertex(frame: &FrameDataBlock, instances: &[u8], instance_index: u32, position: Vec3) -> Option<Vec4> {
    let instance: MeshInstanceBlock = read_element(instances, instance_index as usize)?;
    Some(clip_position(frame, &gpu::mat4_from_rows(&instance.model), position))
}

/// Normal mapped into color range
pub fn normal_color(normal: Vec3) -> Vec3 {
    normal.normalize() * 0.5 + Vec3::repeat(0.5)
}

/// Per-vertex Lambert term: ambient plus every active point light
///
/// Inputs are in world space.
pub fn lambert_color(frame: &FrameDataBlock, world_position: Vec3, world_normal: Vec3) -> Vec3 {
    let normal = world_normal.normalize();
    let active = (frame.point_light_count as usize).min(frame.point_lights.len());

    frame.point_lights[..active]
        .iter()
        .fold(Vec3::from(frame.ambient), |color, light| {
            let to_light = (Vec3::from(light.position) - world_position).normalize();
            color + Vec3::from(light.color) * normal.dot(&to_light).max(0.0)
        })
}

/// Clip position and lit color of a Lambert-shaded vertex
pub fn lambert_vertex(frame: &FrameDataBlock, mesh: &MeshDataBlock, position: Vec3, normal: Vec3) -> (Vec4, Vec3) {
    let model = gpu::mat4_from_rows(&mesh.model);
    let world_position = (model * position.push(1.0)).xyz();
    let world_normal = model.fixed_view::<3, 3>(0, 0) * normal;
    (
        clip_position(frame, &model, position),
        lambert_color(frame, world_position, world_normal),
    )
}

/// Sprite corner for `gl_VertexIndex`, with its texture coordinate and atlas
pub fn sprite_vertex(instance: &SpriteInstanceBlock, vertex_index: u32) -> (Vec2, Vec2, u32) {
    let [x, y] = QUAD_CORNERS[(vertex_index % QUAD_VERTICES) as usize];
    let transform = gpu::mat3_from_padded_rows(&instance.transform);
    let position = transform_point(&transform, Vec2::new(x, y));
    (position, Vec2::new(x + 0.5, 0.5 - y), instance.atlas_index)
}

/// Glyph vertex of a world text, placed by the text's storage instance
///
/// `position` and `uv` are the vertex attributes. `None` when the index is
/// past the packed instances.
pub fn text_vertex(instances: &[u8], instance_index: u32, position: Vec2, uv: Vec2) -> Option<(Vec2, Vec2, u32)> {
    let instance: SpriteInstanceBlock = read_element(instances, instance_index as usize)?;
    let transform = gpu::mat3_from_padded_rows(&instance.transform);
    Some((transform_point(&transform, position), uv, instance.atlas_index))
}

/// Screen-space position of a UI vertex
pub fn ui_vertex(element: &UiElementBlock, position: Vec2) -> Vec2 {
    transform_point(&gpu::mat3_from_padded_rows(&element.transform), position)
}

fn clip_position(frame: &FrameDataBlock, model: &Mat4, position: Vec3) -> Vec4 {
    let (projection, view) = frame_matrices(frame);
    projection * view * model * position.push(1.0)
}

fn transform_point(transform: &Mat3, point: Vec2) -> Vec2 {
    (transform * point.push(1.0)).xy()
}
