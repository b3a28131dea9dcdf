use super::{Matrix4x4, Vec3};

/// Axis-aligned bounding box
/// Defined by 2 points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl Default for AABB {
    fn default() -> Self {
        AABB::empty()
    }
}

impl AABB {
    pub fn new(minimum: Vec3, maximum: Vec3) -> AABB {
        AABB { minimum, maximum }
    }

    /// Inverted box; the identity for `surrounding_box`
    pub const fn empty() -> AABB {
        AABB {
            minimum: Vec3::splat(f32::INFINITY),
            maximum: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.minimum.0 > self.maximum.0
            || self.minimum.1 > self.maximum.1
            || self.minimum.2 > self.maximum.2
    }

    pub fn from_points(points: &[Vec3]) -> AABB {
        points
            .iter()
            .fold(AABB::empty(), |acc, &p| acc.grow(p))
    }

    pub fn grow(self, p: Vec3) -> AABB {
        AABB {
            minimum: Vec3::elementwise_min(self.minimum, p),
            maximum: Vec3::elementwise_max(self.maximum, p),
        }
    }

    /// Returns a box which surrounds both a and b
    pub fn surrounding_box(a: AABB, b: AABB) -> AABB {
        AABB {
            minimum: Vec3::elementwise_min(a.minimum, b.minimum),
            maximum: Vec3::elementwise_max(a.maximum, b.maximum),
        }
    }

    pub fn extent(&self) -> Vec3 {
        self.maximum - self.minimum
    }

    pub fn centroid(&self) -> Vec3 {
        (self.minimum + self.maximum) * 0.5
    }

    /// Surface area; zero for empty boxes so they never dominate SAH costs
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.extent();
        2.0 * (d.0 * d.1 + d.1 * d.2 + d.2 * d.0)
    }

    /// Bounds of all 8 transformed corners
    pub fn transform_aabb(&self, m: &Matrix4x4) -> AABB {
        if self.is_empty() {
            return *self;
        }

        let mut out = AABB::empty();
        for corner in 0..8 {
            let p = Vec3(
                if corner & 1 == 0 { self.minimum.0 } else { self.maximum.0 },
                if corner & 2 == 0 { self.minimum.1 } else { self.maximum.1 },
                if corner & 4 == 0 { self.minimum.2 } else { self.maximum.2 },
            );
            out = out.grow(m.apply_affine_point(p));
        }
        out
    }

    /// Slab test against the ray's inverse direction. Returns the entry
    /// distance when the box overlaps [t_min, t_max].
    pub fn intersect(&self, origin: Vec3, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut t0 = t_min;
        let mut t1 = t_max;
        for axis in 0..3 {
            let near = (self.minimum[axis] - origin[axis]) * inv_dir[axis];
            let far = (self.maximum[axis] - origin[axis]) * inv_dir[axis];
            let (near, far) = if near > far { (far, near) } else { (near, far) };
            // NaN from 0 * inf keeps the previous bound
            t0 = if near > t0 { near } else { t0 };
            t1 = if far < t1 { far } else { t1 };
            if t0 > t1 {
                return None;
            }
        }
        Some(t0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_is_identity_for_union() {
        let b = AABB::new(Vec3(-1.0, 0.0, 2.0), Vec3(1.0, 3.0, 4.0));
        assert_eq!(AABB::surrounding_box(AABB::empty(), b), b);
        assert_eq!(AABB::empty().surface_area(), 0.0);
    }

    #[test]
    fn transformed_box_covers_rotated_corners() {
        let b = AABB::new(Vec3(-1.0, -1.0, -1.0), Vec3(1.0, 1.0, 1.0));
        let m = Matrix4x4::matmul(
            Matrix4x4::translation(Vec3(4.0, 0.0, 0.0)),
            Matrix4x4::rotation_y(std::f32::consts::FRAC_PI_4),
        );
        let t = b.transform_aabb(&m);
        let r = std::f32::consts::SQRT_2;
        assert!((t.minimum.0 - (4.0 - r)).abs() < 1e-5);
        assert!((t.maximum.0 - (4.0 + r)).abs() < 1e-5);
        assert!((t.maximum.1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn slab_test_handles_axis_parallel_rays() {
        let b = AABB::new(Vec3(-1.0, -1.0, -6.0), Vec3(1.0, 1.0, -4.0));
        let dir = Vec3(0.0, 0.0, -1.0);
        let inv = Vec3(1.0 / dir.0, 1.0 / dir.1, 1.0 / dir.2);
        let hit = b.intersect(Vec3::zero(), inv, 0.0, f32::MAX);
        assert_eq!(hit, Some(4.0));

        let miss = b.intersect(Vec3(2.0, 0.0, 0.0), inv, 0.0, f32::MAX);
        assert_eq!(miss, None);
    }
}
