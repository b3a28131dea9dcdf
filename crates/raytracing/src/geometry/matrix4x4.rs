use std::ops::{Index, IndexMut};

use bytemuck::{Pod, Zeroable};

use super::{Vec3, Vec4};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Matrix4x4 {
    // row-major
    pub data: [[f32; 4]; 4],
}

impl Index<usize> for Matrix4x4 {
    type Output = f32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index / 4][index % 4]
    }
}

impl IndexMut<usize> for Matrix4x4 {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index / 4][index % 4]
    }
}

impl Default for Matrix4x4 {
    fn default() -> Self {
        Matrix4x4::identity()
    }
}

impl Matrix4x4 {
    pub const fn identity() -> Self {
        Matrix4x4 {
            data: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[rustfmt::skip]
    pub fn create(a11: f32, a12: f32, a13: f32, a14: f32,
                  a21: f32, a22: f32, a23: f32, a24: f32,
                  a31: f32, a32: f32, a33: f32, a34: f32,
                  a41: f32, a42: f32, a43: f32, a44: f32) -> Self {
        Matrix4x4 {
            data: [[a11, a12, a13, a14],
                   [a21, a22, a23, a24],
                   [a31, a32, a33, a34],
                   [a41, a42, a43, a44]]
        }
    }

    /// Gauss-Jordan elimination with partial pivoting. Returns `None` for
    /// singular (or non-finite) matrices.
    pub fn invert(&self) -> Option<Self> {
        let mut a = self.data;
        let mut inv = Matrix4x4::identity().data;

        for col in 0..4 {
            let mut pivot = col;
            for row in (col + 1)..4 {
                if a[row][col].abs() > a[pivot][col].abs() {
                    pivot = row;
                }
            }

            let pivot_value = a[pivot][col];
            if pivot_value == 0.0 || !pivot_value.is_finite() {
                return None;
            }

            a.swap(col, pivot);
            inv.swap(col, pivot);

            let scale = 1.0 / pivot_value;
            for k in 0..4 {
                a[col][k] *= scale;
                inv[col][k] *= scale;
            }

            for row in 0..4 {
                if row == col {
                    continue;
                }
                let factor = a[row][col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..4 {
                    a[row][k] -= factor * a[col][k];
                    inv[row][k] -= factor * inv[col][k];
                }
            }
        }

        let inv = Matrix4x4 { data: inv };
        inv.is_finite().then_some(inv)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|v| v.is_finite())
    }

    pub fn matmul(a: Matrix4x4, b: Matrix4x4) -> Self {
        let mut m = Matrix4x4::identity();
        for i in 0..4 {
            for j in 0..4 {
                let mut dot = 0.0;
                for k in 0..4 {
                    dot += a.data[i][k] * b.data[k][j]
                }
                m.data[i][j] = dot;
            }
        }
        m
    }

    pub fn transposed(&self) -> Matrix4x4 {
        let mut me = *self;
        for i in 0..4 {
            for j in 0..i {
                me.data[i][j] = self.data[j][i];
                me.data[j][i] = self.data[i][j];
            }
        }
        me
    }

    pub fn translation(direction: Vec3) -> Matrix4x4 {
        let mut me = Self::identity();
        me.data[0][3] = direction.0;
        me.data[1][3] = direction.1;
        me.data[2][3] = direction.2;

        me
    }

    pub fn scale(scale: Vec3) -> Matrix4x4 {
        let mut me = Self::identity();
        me.data[0][0] = scale.0;
        me.data[1][1] = scale.1;
        me.data[2][2] = scale.2;

        me
    }

    // counterclockwise about +Y when looking down the axis, right-handed
    #[rustfmt::skip]
    pub fn rotation_y(theta: f32) -> Matrix4x4 {
        let (s, c) = theta.sin_cos();
        Matrix4x4::create(
            c,   0.0, s,   0.0,
            0.0, 1.0, 0.0, 0.0,
            -s,  0.0, c,   0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Right-handed view matrix; the camera looks down -Z in view space.
    #[rustfmt::skip]
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Matrix4x4 {
        let f = (target - eye).unit();
        let r = Vec3::cross(f, up).unit();
        let u = Vec3::cross(r, f);

        Matrix4x4::create(
            r.0,  r.1,  r.2,  -Vec3::dot(r, eye),
            u.0,  u.1,  u.2,  -Vec3::dot(u, eye),
            -f.0, -f.1, -f.2, Vec3::dot(f, eye),
            0.0,  0.0,  0.0,  1.0,
        )
    }

    /// OpenGL-style perspective projection (NDC depth in [-1, 1]); `yfov` in radians
    #[rustfmt::skip]
    pub fn perspective(yfov: f32, aspect: f32, near: f32, far: f32) -> Matrix4x4 {
        let f = 1.0 / (yfov / 2.0).tan();
        Matrix4x4::create(
            f / aspect, 0.0, 0.0,                          0.0,
            0.0,        f,   0.0,                          0.0,
            0.0,        0.0, (far + near) / (near - far),  2.0 * far * near / (near - far),
            0.0,        0.0, -1.0,                         0.0,
        )
    }

    /// OpenGL-style orthographic projection (NDC depth in [-1, 1])
    #[rustfmt::skip]
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4x4 {
        Matrix4x4::create(
            2.0 / (right - left), 0.0,                  0.0,                 -(right + left) / (right - left),
            0.0,                  2.0 / (top - bottom), 0.0,                 -(top + bottom) / (top - bottom),
            0.0,                  0.0,                  -2.0 / (far - near), -(far + near) / (far - near),
            0.0,                  0.0,                  0.0,                 1.0,
        )
    }
}

impl Matrix4x4 {
    pub fn mul_vec4(&self, v: Vec4) -> Vec4 {
        let row = |i: usize| {
            self.data[i][0] * v.0
                + self.data[i][1] * v.1
                + self.data[i][2] * v.2
                + self.data[i][3] * v.3
        };
        Vec4(row(0), row(1), row(2), row(3))
    }

    pub fn apply_point(&self, p: Vec3) -> Vec3 {
        self.mul_vec4(Vec4::point(p)).homogeneous_divide()
    }

    /// Affine transform of a point, ignoring the projective row
    pub fn apply_affine_point(&self, p: Vec3) -> Vec3 {
        self.apply_vector(p) + Vec3(self.data[0][3], self.data[1][3], self.data[2][3])
    }

    pub fn apply_vector(&self, v: Vec3) -> Vec3 {
        let a = self.data[0][0] * v.0 + self.data[0][1] * v.1 + self.data[0][2] * v.2;
        let b = self.data[1][0] * v.0 + self.data[1][1] * v.1 + self.data[1][2] * v.2;
        let c = self.data[2][0] * v.0 + self.data[2][1] * v.1 + self.data[2][2] * v.2;
        Vec3(a, b, c)
    }
}

// both `From` implementations assume row major
impl From<[f32; 16]> for Matrix4x4 {
    fn from(value: [f32; 16]) -> Self {
        Matrix4x4 {
            data: [
                [value[0], value[1], value[2], value[3]],
                [value[4], value[5], value[6], value[7]],
                [value[8], value[9], value[10], value[11]],
                [value[12], value[13], value[14], value[15]],
            ],
        }
    }
}

impl From<[[f32; 4]; 4]> for Matrix4x4 {
    fn from(value: [[f32; 4]; 4]) -> Self {
        Self { data: value }
    }
}
