use super::{Matrix4x4, Vec3};

/// Object-to-world matrix paired with its inverse. Only constructible from
/// invertible matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    forward: Matrix4x4,
    inverse: Matrix4x4,
}

impl Default for Transform {
    fn default() -> Self {
        Transform::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Transform {
            forward: Matrix4x4::identity(),
            inverse: Matrix4x4::identity(),
        }
    }

    pub fn new(forward: Matrix4x4) -> Option<Self> {
        let inverse = forward.invert()?;
        Some(Transform { forward, inverse })
    }

    pub fn forward(&self) -> &Matrix4x4 {
        &self.forward
    }

    pub fn inverse(&self) -> &Matrix4x4 {
        &self.inverse
    }

    /// World-space point into object space
    pub fn inverse_point(&self, point: Vec3) -> Vec3 {
        self.inverse.apply_affine_point(point)
    }

    pub fn inverse_vector(&self, v: Vec3) -> Vec3 {
        self.inverse.apply_vector(v)
    }
}
