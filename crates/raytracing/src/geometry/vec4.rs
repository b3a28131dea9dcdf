use std::ops;

use bytemuck::{Pod, Zeroable};

use super::Vec3;

/// 4-wide vector. Vertex positions are stored as (x, y, z, 1) and rays as
/// (origin, t_min) / (direction, t_max) pairs.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, PartialOrd, Pod, Zeroable)]
pub struct Vec4(pub f32, pub f32, pub f32, pub f32);

impl Vec4 {
    pub const fn zero() -> Vec4 {
        Vec4(0.0, 0.0, 0.0, 0.0)
    }

    /// Point in homogeneous coordinates (w = 1)
    pub fn point(p: Vec3) -> Vec4 {
        Vec4(p.0, p.1, p.2, 1.0)
    }

    pub fn from_vec3(v: Vec3, w: f32) -> Vec4 {
        Vec4(v.0, v.1, v.2, w)
    }

    pub fn xyz(&self) -> Vec3 {
        Vec3(self.0, self.1, self.2)
    }

    pub fn w(&self) -> f32 {
        self.3
    }

    /// Divides through by w
    pub fn homogeneous_divide(self) -> Vec3 {
        Vec3(self.0 / self.3, self.1 / self.3, self.2 / self.3)
    }
}

impl ops::Add for Vec4 {
    type Output = Vec4;
    fn add(self, rhs: Self) -> Self::Output {
        Vec4(self.0 + rhs.0,
            self.1 + rhs.1,
            self.2 + rhs.2,
            self.3 + rhs.3)
    }
}

impl ops::Sub for Vec4 {
    type Output = Vec4;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec4(self.0 - rhs.0,
            self.1 - rhs.1,
            self.2 - rhs.2,
            self.3 - rhs.3)
    }
}

impl ops::Mul<f32> for Vec4 {
    type Output = Vec4;
    fn mul(self, rhs: f32) -> Self::Output {
        Vec4(self.0 * rhs,
            self.1 * rhs,
            self.2 * rhs,
            self.3 * rhs)
    }
}

impl From<[f32; 4]> for Vec4 {
    fn from(value: [f32; 4]) -> Self {
        Vec4(value[0], value[1], value[2], value[3])
    }
}

impl From<Vec4> for [f32; 4] {
    fn from(value: Vec4) -> Self {
        [value.0, value.1, value.2, value.3]
    }
}
