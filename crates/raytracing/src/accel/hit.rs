use bytemuck::{Pod, Zeroable};

use crate::{
    geometry::{Vec3, Vec4},
    ids::INVALID_ID,
};

/// Result of a nearest-hit query. A miss has `t == f32::MAX` and every id
/// set to `INVALID_ID`. Triangle hits carry barycentrics `(u, v)` in
/// `coords[0..2]`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct HitRecord {
    pub t: f32,
    pub prim_id: u32,
    pub inst_id: u32,
    pub geom_id: u32,
    pub coords: [f32; 4],
}

impl Default for HitRecord {
    fn default() -> Self {
        HitRecord::miss()
    }
}

impl HitRecord {
    pub const fn miss() -> HitRecord {
        HitRecord {
            t: f32::MAX,
            prim_id: INVALID_ID,
            inst_id: INVALID_ID,
            geom_id: INVALID_ID,
            coords: [0.0; 4],
        }
    }

    pub fn is_miss(&self) -> bool {
        self.inst_id == INVALID_ID
    }

    pub fn is_hit(&self) -> bool {
        !self.is_miss()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}

impl Ray {
    /// Unpacks the `(origin, t_min)` / `(direction, t_max)` pair used by the
    /// query interface
    pub fn from_packed(origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> Ray {
        Ray {
            origin: origin_and_tmin.xyz(),
            direction: direction_and_tmax.xyz(),
            t_min: origin_and_tmin.w(),
            t_max: direction_and_tmax.w(),
        }
    }

    /// Per-axis reciprocal with components below 1e-30 clamped to a signed
    /// 1e-30, so slab distances stay finite for axis-aligned rays. The
    /// shader computes the same values.
    pub fn inv_direction(&self) -> Vec3 {
        fn safe_inv(d: f32) -> f32 {
            const TINY: f32 = 1e-30;
            if d.abs() < TINY {
                1.0 / if d < 0.0 { -TINY } else { TINY }
            } else {
                1.0 / d
            }
        }
        Vec3(safe_inv(self.direction.0), safe_inv(self.direction.1), safe_inv(self.direction.2))
    }
}

/// Moller-Trumbore, two-sided. Returns `(t, u, v)` for hits with
/// `t_min <= t < t_max`.
pub fn intersect_triangle(ray: &Ray, p0: Vec3, p1: Vec3, p2: Vec3, t_max: f32) -> Option<(f32, f32, f32)> {
    let e1 = p1 - p0;
    let e2 = p2 - p0;

    let p = Vec3::cross(ray.direction, e2);
    let det = Vec3::dot(p, e1);
    // zero-area triangles and rays in the triangle's plane
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = ray.origin - p0;
    let u = Vec3::dot(p, s) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = Vec3::cross(s, e1);
    let v = Vec3::dot(q, ray.direction) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = Vec3::dot(q, e2) * inv_det;
    (t >= ray.t_min && t < t_max).then_some((t, u, v))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const P0: Vec3 = Vec3(0.0, 0.0, -5.0);
    const P1: Vec3 = Vec3(1.0, 0.0, -5.0);
    const P2: Vec3 = Vec3(0.0, 1.0, -5.0);

    fn ray(origin: Vec3, direction: Vec3) -> Ray {
        Ray { origin, direction, t_min: 0.0, t_max: f32::MAX }
    }

    #[test]
    fn hit_reports_distance_and_barycentrics() {
        let r = ray(Vec3(0.25, 0.5, 0.0), Vec3(0.0, 0.0, -1.0));
        let (t, u, v) = intersect_triangle(&r, P0, P1, P2, r.t_max).unwrap();
        assert_relative_eq!(t, 5.0);
        assert_relative_eq!(u, 0.25);
        assert_relative_eq!(v, 0.5);
    }

    #[test]
    fn interval_is_half_open() {
        let r = ray(Vec3(0.25, 0.25, 0.0), Vec3(0.0, 0.0, -1.0));
        assert!(intersect_triangle(&r, P0, P1, P2, 5.0).is_none());
        assert!(intersect_triangle(&r, P0, P1, P2, 5.0001).is_some());

        let behind = Ray { t_min: 5.5, ..r };
        assert!(intersect_triangle(&behind, P0, P1, P2, f32::MAX).is_none());
    }

    #[test]
    fn degenerate_triangle_never_hits() {
        let r = ray(Vec3(0.0, 0.0, 0.0), Vec3(0.0, 0.0, -1.0));
        assert!(intersect_triangle(&r, P0, P0, P1, f32::MAX).is_none());
    }

    #[test]
    fn inverse_direction_stays_finite() {
        let r = ray(Vec3::zero(), Vec3(0.0, -0.0, -2.0));
        let inv = r.inv_direction();
        assert!(inv.0.is_finite() && inv.0 > 1e29);
        assert_eq!(inv.0, inv.1);
        assert_eq!(inv.2, -0.5);

        // a box edge-on to the ray still clips on the other axes
        let b = crate::geometry::AABB::new(Vec3(0.0, -1.0, -6.0), Vec3(1.0, 1.0, -4.0));
        assert_eq!(b.intersect(Vec3::zero(), inv, 0.0, f32::MAX), Some(2.0));
        assert_eq!(b.intersect(Vec3(1.5, 0.0, 0.0), inv, 0.0, f32::MAX), None);
    }

    #[test]
    fn miss_record_uses_sentinels() {
        let miss = HitRecord::miss();
        assert_eq!(miss.t, f32::MAX);
        assert_eq!(miss.inst_id, INVALID_ID);
        assert_eq!(miss.geom_id, INVALID_ID);
        assert_eq!(miss.prim_id, INVALID_ID);
        assert_eq!(std::mem::size_of::<HitRecord>(), 32);
    }
}
