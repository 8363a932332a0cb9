//! Math utilities and types
//!
//! Provides the math types used by the binding layer together with the
//! helpers that lay matrices out the way GLSL blocks declare them.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Self {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_rotation * (-self.position.component_mul(&inv_scale));

        Self {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }
}

/// 2D affine transform used by sprites, text and UI elements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    /// Position in 2D space
    pub position: Vec2,
    /// Rotation in radians, counter-clockwise
    pub rotation: f32,
    /// Scale factors
    pub scale: Vec2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl Transform2D {
    /// Create a transform with only position
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a homogeneous 3x3 matrix
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::new_translation(&self.position)
            * Mat3::new_rotation(self.rotation)
            * Mat3::new_nonuniform_scaling(&self.scale)
    }
}

/// Pixel-space to normalized-device-space projection for 2D content
///
/// Maps `(0, 0)..(width, height)` onto `(-1, -1)..(1, 1)`.
pub fn screen_projection(width: f32, height: f32) -> Mat3 {
    Mat3::new(
        2.0 / width, 0.0, -1.0,
        0.0, 2.0 / height, -1.0,
        0.0, 0.0, 1.0,
    )
}

/// Matrix layout helpers for GPU blocks
///
/// GLSL `row_major` stores each matrix row contiguously; column-major stores
/// each column contiguously. A `mat3` occupies three 16-byte vectors in both
/// std140 and std430.
pub mod gpu {
    use super::{Mat3, Mat4};

    /// Rows of a 4x4 matrix, as a `row_major mat4` stores them
    pub fn mat4_rows(m: &Mat4) -> [[f32; 4]; 4] {
        m.transpose().into()
    }

    /// Columns of a 4x4 matrix, as a column-major `mat4` stores them
    pub fn mat4_columns(m: &Mat4) -> [[f32; 4]; 4] {
        (*m).into()
    }

    /// Rows of a 3x3 matrix padded to four floats each
    pub fn mat3_padded_rows(m: &Mat3) -> [[f32; 4]; 3] {
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)], 0.0],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)], 0.0],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)], 0.0],
        ]
    }

    /// Columns of a 3x3 matrix padded to four floats each
    pub fn mat3_padded_columns(m: &Mat3) -> [[f32; 4]; 3] {
        mat3_padded_rows(&m.transpose())
    }

    /// Rebuild a 4x4 matrix from `row_major` storage
    pub fn mat4_from_rows(rows: &[[f32; 4]; 4]) -> Mat4 {
        Mat4::from_fn(|r, c| rows[r][c])
    }

    /// Rebuild a 3x3 matrix from padded `row_major` storage
    pub fn mat3_from_padded_rows(rows: &[[f32; 4]; 3]) -> Mat3 {
        Mat3::from_fn(|r, c| rows[r][c])
    }
}

/// Extension trait for Mat4 with camera matrix constructors
pub trait Mat4Ext {
    /// Right-handed perspective projection for Vulkan clip space
    ///
    /// Looks down -Z, flips Y, and maps depth into `[0, 1]`.
    fn perspective_vk(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_vk(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = -1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = (near * far) / (near - far);
        result[(3, 2)] = -1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }
}
