//! Per-frame scene input
//!
//! Everything the binder consumes for one frame: camera, lights and the draw
//! lists of every shader family. Geometry buffers are owned by the caller and
//! referenced by handle.

use crate::foundation::math::{Mat3, Mat4, Mat4Ext, Transform, Transform2D, Vec3};

/// Camera matrices consumed by the frame block
///
/// Uses a right-handed Y-up view space looking down -Z. The projection maps
/// into Vulkan clip space.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Point the camera is looking at
    pub target: Vec3,
    /// Up vector for camera orientation
    pub up: Vec3,
    projection: Mat4,
    view: Mat4,
}

impl Default for Camera {
    /// Camera at the origin facing -Z with an identity projection
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            target: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            projection: Mat4::identity(),
            view: Mat4::identity(),
        }
    }
}

impl Camera {
    /// Perspective camera looking at `target`
    ///
    /// `fov_degrees` is the vertical field of view.
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let up = Vec3::new(0.0, 1.0, 0.0);
        Self {
            position,
            target,
            up,
            projection: Mat4::perspective_vk(fov_degrees.to_radians(), aspect, near, far),
            view: Mat4::look_at(position, target, up),
        }
    }

    /// Camera from explicit matrices
    pub fn from_matrices(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection,
            view,
            ..Self::default()
        }
    }

    /// Camera whose view is the inverse of a world transform
    pub fn from_transform(transform: &Transform, projection: Mat4) -> Self {
        let view = transform.to_matrix().try_inverse().unwrap_or_else(Mat4::identity);
        Self {
            position: transform.position,
            target: transform.position + transform.rotation * Vec3::new(0.0, 0.0, -1.0),
            projection,
            view,
            ..Self::default()
        }
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view = Mat4::look_at(self.position, self.target, self.up);
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Point the camera at a new target
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        self.view = Mat4::look_at(self.position, self.target, self.up);
    }

    /// Projection matrix
    pub const fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// View matrix
    pub const fn view_matrix(&self) -> &Mat4 {
        &self.view
    }
}

/// Uniform ambient term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// Light color
    pub color: Vec3,
    /// Scalar applied to the color before upload
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 0.1,
        }
    }
}

impl AmbientLight {
    /// Create an ambient light
    pub const fn new(color: Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    /// Color as uploaded
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Omnidirectional light without falloff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Light color
    pub color: Vec3,
    /// Scalar applied to the color before upload
    pub intensity: f32,
}

impl PointLight {
    /// Create a point light
    pub const fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self { position, color, intensity }
    }

    /// Color as uploaded
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Geometry buffers owned by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRef<B> {
    /// Vertex buffer handle
    pub vertex_buffer: B,
    /// `u16` index buffer handle
    pub index_buffer: Option<B>,
    /// Vertices in the vertex buffer
    pub vertex_count: u32,
    /// Indices in the index buffer
    pub index_count: u32,
}

impl<B> GeometryRef<B> {
    /// Indexed geometry
    pub const fn indexed(vertex_buffer: B, index_buffer: B, vertex_count: u32, index_count: u32) -> Self {
        Self {
            vertex_buffer,
            index_buffer: Some(index_buffer),
            vertex_count,
            index_count,
        }
    }
}

/// Shading applied to a non-instanced mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshShading {
    /// Flat vertex color
    Basic,
    /// Normals shown as color
    Normal,
    /// Per-vertex Lambert lighting
    Lambert,
}

/// Mesh transform with a cached model matrix
///
/// The model matrix is rebuilt whenever the transform changes, so packing a
/// mesh never recomputes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    transform: Transform,
    model: Mat4,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new(Transform::identity())
    }
}

impl Mesh {
    /// Create a mesh at a transform
    pub fn new(transform: Transform) -> Self {
        let model = transform.to_matrix();
        Self { transform, model }
    }

    /// Current transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Replace the transform and rebuild the model matrix
    pub fn set_transform(&mut self, transform: Transform) {
        self.model = transform.to_matrix();
        self.transform = transform;
    }

    /// Move the mesh
    pub fn set_position(&mut self, position: Vec3) {
        let transform = Transform { position, ..self.transform.clone() };
        self.set_transform(transform);
    }

    /// Cached model matrix
    pub const fn model_matrix(&self) -> &Mat4 {
        &self.model
    }
}

/// One non-instanced mesh draw
#[derive(Debug, Clone, Copy)]
pub struct MeshDraw<'a, B> {
    /// Mesh supplying the model matrix
    pub mesh: &'a Mesh,
    /// Geometry to draw
    pub geometry: GeometryRef<B>,
    /// Shader family
    pub shading: MeshShading,
}

/// Many copies of one geometry, one model matrix per instance
#[derive(Debug, Clone, Copy)]
pub struct InstancedMeshBatch<'a, B> {
    /// Per-instance model matrices, in `gl_InstanceIndex` order
    pub models: &'a [Mat4],
    /// Geometry to draw
    pub geometry: GeometryRef<B>,
}

/// One atlas quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteInstance {
    /// 2D transform of the unit quad
    pub transform: Mat3,
    /// Atlas array index, below `MAX_ATLASES`
    pub atlas_index: u32,
}

impl SpriteInstance {
    /// Instance from a 2D transform
    pub fn new(transform: &Transform2D, atlas_index: u32) -> Self {
        Self {
            transform: transform.to_matrix(),
            atlas_index,
        }
    }
}

/// Sprites drawn with one instanced call; quad vertices come from `gl_VertexIndex`
#[derive(Debug, Clone, Copy)]
pub struct SpriteBatch<'a> {
    /// Instances in `gl_InstanceIndex` order
    pub instances: &'a [SpriteInstance],
}

/// World-space text
///
/// The glyph quads of the whole string live in `geometry`; the text is drawn
/// as a single instance whose transform and atlas index come from the text
/// instance stream.
#[derive(Debug, Clone, Copy)]
pub struct TextDraw<B> {
    /// 2D transform applied to every glyph vertex
    pub transform: Mat3,
    /// Glyph atlas index, below `MAX_ATLASES`
    pub atlas_index: u32,
    /// Glyph quads: position and texture coordinate per vertex
    pub geometry: GeometryRef<B>,
}

impl<B> TextDraw<B> {
    /// Text placed by a 2D transform
    pub fn new(transform: &Transform2D, atlas_index: u32, geometry: GeometryRef<B>) -> Self {
        Self {
            transform: transform.to_matrix(),
            atlas_index,
            geometry,
        }
    }
}

/// Untextured screen-space quad
#[derive(Debug, Clone, Copy)]
pub struct UiQuadDraw<B> {
    /// Screen-space transform
    pub transform: Mat3,
    /// Quad geometry
    pub geometry: GeometryRef<B>,
}

/// Screen-space text sampled from one glyph atlas
#[derive(Debug, Clone, Copy)]
pub struct UiTextDraw<B> {
    /// Screen-space transform
    pub transform: Mat3,
    /// Glyph atlas index
    pub atlas_index: u32,
    /// Text geometry
    pub geometry: GeometryRef<B>,
}

/// Everything to draw in one frame
#[derive(Debug, Clone)]
pub struct SceneFrame<'a, B> {
    /// Active camera
    pub camera: &'a Camera,
    /// Ambient term
    pub ambient: AmbientLight,
    /// Point lights; only the first `MAX_POINT_LIGHTS` are packed
    pub point_lights: Vec<PointLight>,
    /// Non-instanced meshes
    pub meshes: Vec<MeshDraw<'a, B>>,
    /// Instanced meshes
    pub instanced_meshes: Vec<InstancedMeshBatch<'a, B>>,
    /// Sprite batches
    pub sprites: Vec<SpriteBatch<'a>>,
    /// World-space text
    pub text: Vec<TextDraw<B>>,
    /// UI quads
    pub ui_quads: Vec<UiQuadDraw<B>>,
    /// UI text
    pub ui_text: Vec<UiTextDraw<B>>,
}

impl<'a, B> SceneFrame<'a, B> {
    /// Empty frame seen through `camera`
    pub fn new(camera: &'a Camera) -> Self {
        Self {
            camera,
            ambient: AmbientLight::default(),
            point_lights: Vec::new(),
            meshes: Vec::new(),
            instanced_meshes: Vec::new(),
            sprites: Vec::new(),
            text: Vec::new(),
            ui_quads: Vec::new(),
            ui_text: Vec::new(),
        }
    }

    /// Set the ambient term
    pub fn with_ambient(mut self, ambient: AmbientLight) -> Self {
        self.ambient = ambient;
        self
    }

    /// Add a point light
    pub fn add_light(mut self, light: PointLight) -> Self {
        self.point_lights.push(light);
        self
    }

    /// Whether the frame has no draws
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
            && self.instanced_meshes.is_empty()
            && self.sprites.is_empty()
            && self.text.is_empty()
            && self.ui_quads.is_empty()
            && self.ui_text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mesh_model_follows_transform() {
        let mut mesh = Mesh::default();
        assert_eq!(*mesh.model_matrix(), Mat4::identity());

        mesh.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(mesh.model_matrix()[(0, 3)], 1.0);
        assert_relative_eq!(mesh.model_matrix()[(2, 3)], 3.0);
    }

    #[test]
    fn test_default_camera_is_identity() {
        let camera = Camera::default();
        assert_eq!(*camera.view_matrix(), Mat4::identity());
        assert_eq!(*camera.projection_matrix(), Mat4::identity());
    }

    #[test]
    fn test_camera_from_transform_inverts() {
        let transform = Transform::from_position(Vec3::new(0.0, 0.0, 5.0));
        let camera = Camera::from_transform(&transform, Mat4::identity());
        let origin = camera.view_matrix() * nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(origin.z, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_light_radiance_is_premultiplied() {
        let light = PointLight::new(Vec3::zeros(), Vec3::new(1.0, 0.5, 0.0), 2.0);
        assert_relative_eq!(light.radiance(), Vec3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(AmbientLight::new(Vec3::new(1.0, 1.0, 1.0), 0.25).radiance().x, 0.25);
    }
}
