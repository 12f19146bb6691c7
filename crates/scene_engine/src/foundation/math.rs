//! Math utilities and types
//!
//! nalgebra aliases used by geometric components, plus the transform
//! composition helpers that world-matrix propagation is built on.

pub use nalgebra::{
    Vector3,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Scale components below this are treated as zero when decomposing matrices
const SCALE_EPSILON: f32 = 1.0e-6;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
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
    /// Create a transform from its three parts
    pub const fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (`T * R * S`)
    pub fn to_matrix(&self) -> Mat4 {
        compose_matrix(&self.position, &self.rotation, &self.scale)
    }

    /// Decompose an affine matrix without shear
    ///
    /// A zero-length basis column yields a zero scale on that axis and leaves
    /// the column out of the rotation estimate.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let columns = [
            Vec3::new(matrix.m11, matrix.m21, matrix.m31),
            Vec3::new(matrix.m12, matrix.m22, matrix.m32),
            Vec3::new(matrix.m13, matrix.m23, matrix.m33),
        ];
        let scale = Vec3::new(columns[0].norm(), columns[1].norm(), columns[2].norm());

        let axis = |i: usize| {
            if scale[i] > SCALE_EPSILON {
                columns[i] / scale[i]
            } else {
                Vec3::zeros()
            }
        };
        let rotation_matrix = Mat3::from_columns(&[axis(0), axis(1), axis(2)]);
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Build `translation * rotation * scale` without an intermediate `Transform`
pub fn compose_matrix(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position)
        * rotation.to_homogeneous()
        * Mat4::new_nonuniform_scaling(scale)
}

/// Rotation that points the local -Z axis along `forward`
///
/// Falls back to another up axis when `forward` is parallel to `up`, and to
/// identity when `forward` has no length.
pub fn look_rotation(forward: &Vec3, up: &Vec3) -> Quat {
    if forward.norm_squared() <= SCALE_EPSILON {
        return Quat::identity();
    }
    let direction = forward.normalize();
    let up = if direction.cross(up).norm_squared() <= SCALE_EPSILON {
        if direction.z.abs() < 0.9 { Vec3::z() } else { Vec3::x() }
    } else {
        *up
    };
    Quat::face_towards(&-direction, &up)
}

/// View and inverse-view matrices for an observer placed by `world`
///
/// Scale is discarded so the view stays orthonormal.
pub fn view_from_world(world: &Mat4) -> (Mat4, Mat4) {
    let transform = Transform::from_matrix(world);
    let inverse_view = Mat4::new_translation(&transform.position) * transform.rotation.to_homogeneous();
    let view = transform.rotation.inverse().to_homogeneous()
        * Mat4::new_translation(&-transform.position);
    (view, inverse_view)
}

/// Right-handed perspective projection with `[-1, 1]` depth
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    nalgebra::Perspective3::new(aspect, fov_y, near, far).to_homogeneous()
}
