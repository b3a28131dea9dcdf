//! Primary-ray generation and per-pixel color resolution. Ray parameters
//! come from one pure function so the looped and the dispatched forms of
//! the kernel consume identical bits.

use bytemuck::{Pod, Zeroable};

use crate::{
    accel::{AccelError, AccelerationStructure, HitRecord},
    geometry::{Matrix4x4, Vec3, Vec4},
    ids::INVALID_ID,
};

#[rustfmt::skip]
pub const PALETTE: [u32; 20] = [
    0xffe6194b, 0xff3cb44b, 0xffffe119, 0xff0082c8,
    0xfff58231, 0xff911eb4, 0xff46f0f0, 0xfff032e6,
    0xffd2f53c, 0xfffabebe, 0xff008080, 0xffe6beff,
    0xffaa6e28, 0xfffffac8, 0xff800000, 0xffaaffc3,
    0xff808000, 0xffffd8b1, 0xff000080, 0xff808080,
];

/// Palette slot a miss lands on (`INVALID_ID % 20`)
pub const BACKGROUND_PALETTE_INDEX: usize = (INVALID_ID % PALETTE.len() as u32) as usize;

pub fn palette_color(inst_id: u32) -> u32 {
    PALETTE[(inst_id % PALETTE.len() as u32) as usize]
}

pub fn hit_color(hit: &HitRecord) -> u32 {
    palette_color(hit.inst_id)
}

/// Primary ray through the center of pixel `(x, y)`: the NDC point is
/// unprojected through `inv_proj_view` and the direction normalized from
/// the camera position. Returns `(origin, t_min)` and `(direction, t_max)`.
pub fn eye_ray(x: f32, y: f32, width: u32, height: u32, cam_pos: Vec3, inv_proj_view: &Matrix4x4) -> (Vec4, Vec4) {
    let ndc = Vec4(
        2.0 * (x + 0.5) / width as f32 - 1.0,
        2.0 * (y + 0.5) / height as f32 - 1.0,
        0.0,
        1.0,
    );
    let unprojected = inv_proj_view.mul_vec4(ndc).homogeneous_divide();
    let direction = Vec3::normalized(unprojected - cam_pos);

    (Vec4::from_vec3(cam_pos, 0.0), Vec4::from_vec3(direction, f32::MAX))
}

/// Per-frame parameter block for the dispatched kernel. The matrix is stored
/// column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RayTracerUniforms {
    pub inv_proj_view: [[f32; 4]; 4],
    pub cam_pos: [f32; 4],
    pub height: u32,
    pub width: u32,
    pub accel_capacity: u32,
    pub accel_size: u32,
}

#[derive(Debug, Clone)]
pub struct RayTracer {
    width: u32,
    height: u32,
    cam_pos: Vec3,
    inv_proj_view: Matrix4x4,
}

impl RayTracer {
    pub fn new(width: u32, height: u32) -> Self {
        RayTracer {
            width,
            height,
            cam_pos: Vec3::zero(),
            inv_proj_view: Matrix4x4::identity(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cam_pos(&self) -> Vec3 {
        self.cam_pos
    }

    pub fn inv_proj_view(&self) -> &Matrix4x4 {
        &self.inv_proj_view
    }

    /// Plain setter; the matrix must be non-singular
    pub fn update_view(&mut self, cam_pos: Vec3, inv_proj_view: &Matrix4x4) {
        self.cam_pos = cam_pos;
        self.inv_proj_view = *inv_proj_view;
    }

    pub fn init_eye_ray(&self, x: u32, y: u32) -> (Vec4, Vec4) {
        eye_ray(x as f32, y as f32, self.width, self.height, self.cam_pos, &self.inv_proj_view)
    }

    /// Every pixel's ray, row-major
    pub fn generate_rays(&self) -> Vec<(Vec4, Vec4)> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .map(|(x, y)| self.init_eye_ray(x, y))
            .collect()
    }

    pub fn trace_pixel<A>(&self, accel: &A, x: u32, y: u32) -> HitRecord
    where
        A: AccelerationStructure + ?Sized,
    {
        let (origin, direction) = self.init_eye_ray(x, y);
        accel.ray_query_nearest_hit(origin, direction)
    }

    /// Like `trace_pixel`, but through the batched query so backend
    /// failures surface as errors instead of misses
    pub fn query_pixel<A>(&self, accel: &A, x: u32, y: u32) -> Result<HitRecord, AccelError>
    where
        A: AccelerationStructure + ?Sized,
    {
        let hits = accel.ray_query_nearest_hit_batch(&[self.init_eye_ray(x, y)])?;
        Ok(hits.first().copied().unwrap_or_default())
    }

    /// Writes the color of pixel `(x, y)` into the row-major `out`
    pub fn cast_single_ray<A>(&self, accel: &A, x: u32, y: u32, out: &mut [u32])
    where
        A: AccelerationStructure + ?Sized,
    {
        let hit = self.trace_pixel(accel, x, y);
        out[(y * self.width + x) as usize] = hit_color(&hit);
    }

    pub fn render_sequential<A>(&self, accel: &A) -> Vec<u32>
    where
        A: AccelerationStructure + ?Sized,
    {
        let mut out = vec![0u32; (self.width * self.height) as usize];
        for y in 0..self.height {
            for x in 0..self.width {
                self.cast_single_ray(accel, x, y, &mut out);
            }
        }
        out
    }

    pub fn uniforms(&self, accel_capacity: u32, accel_size: u32) -> RayTracerUniforms {
        RayTracerUniforms {
            inv_proj_view: self.inv_proj_view.transposed().data,
            cam_pos: Vec4::point(self.cam_pos).into(),
            height: self.height,
            width: self.width,
            accel_capacity,
            accel_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn background_is_palette_slot_15() {
        assert_eq!(BACKGROUND_PALETTE_INDEX, 15);
        assert_eq!(palette_color(INVALID_ID), 0xffaaffc3);
        assert_eq!(hit_color(&HitRecord::miss()), PALETTE[15]);
    }

    #[test]
    fn palette_wraps_modulo_20() {
        for inst_id in [0u32, 1, 19, 20, 21, 399, 12345] {
            assert_eq!(palette_color(inst_id), PALETTE[(inst_id % 20) as usize]);
        }
    }

    #[test]
    fn center_ray_looks_down_view_axis() {
        let eye = Vec3(0.0, 1.0, 4.0);
        let view = Matrix4x4::look_at(eye, Vec3(0.0, 1.0, 0.0), Vec3(0.0, 1.0, 0.0));
        let proj = Matrix4x4::perspective(1.0, 1.0, 0.1, 100.0);
        let inv = Matrix4x4::matmul(proj, view).invert().unwrap();

        // odd size so the middle pixel sits at NDC (0, 0)
        let mut tracer = RayTracer::new(9, 9);
        tracer.update_view(eye, &inv);
        let (origin, direction) = tracer.init_eye_ray(4, 4);

        assert_eq!(origin, Vec4(0.0, 1.0, 4.0, 0.0));
        assert_eq!(direction.w(), f32::MAX);
        assert_abs_diff_eq!(direction.0, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(direction.1, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(direction.2, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn generated_rays_match_per_pixel_rays_bitwise() {
        let mut tracer = RayTracer::new(7, 5);
        let proj = Matrix4x4::perspective(0.8, 7.0 / 5.0, 0.1, 50.0);
        tracer.update_view(Vec3(1.0, 2.0, 3.0), &proj.invert().unwrap());

        let rays = tracer.generate_rays();
        assert_eq!(rays.len(), 35);
        for y in 0..5 {
            for x in 0..7 {
                let expected = tracer.init_eye_ray(x, y);
                let got = rays[(y * 7 + x) as usize];
                assert_eq!(bytemuck::bytes_of(&got.0), bytemuck::bytes_of(&expected.0));
                assert_eq!(bytemuck::bytes_of(&got.1), bytemuck::bytes_of(&expected.1));
            }
        }
    }

    // every query hits instance 3 at t = 1; batches fail when `lost` is set
    struct FixedHit {
        lost: bool,
    }

    impl AccelerationStructure for FixedHit {
        fn clear_geom(&mut self) {}
        fn add_geom_triangles4f(&mut self, _: &[Vec4], _: &[u32]) -> u32 {
            INVALID_ID
        }
        fn update_geom_triangles4f(&mut self, _: u32, _: &[Vec4], _: &[u32]) -> Result<(), AccelError> {
            Ok(())
        }
        fn clear_scene(&mut self) {}
        fn add_instance(&mut self, _: u32, _: &Matrix4x4) -> u32 {
            INVALID_ID
        }
        fn update_instance(&mut self, _: u32, _: &Matrix4x4) -> Result<(), AccelError> {
            Ok(())
        }
        fn commit_scene(&mut self) -> Result<(), AccelError> {
            Ok(())
        }
        fn ray_query_nearest_hit(&self, _: Vec4, _: Vec4) -> HitRecord {
            HitRecord {
                t: 1.0,
                inst_id: 3,
                geom_id: 0,
                prim_id: 0,
                ..HitRecord::miss()
            }
        }
        fn ray_query_any_hit(&self, _: Vec4, _: Vec4) -> bool {
            true
        }
        fn ray_query_nearest_hit_batch(&self, rays: &[(Vec4, Vec4)]) -> Result<Vec<HitRecord>, AccelError> {
            if self.lost {
                return Err(AccelError::Backend("device lost".into()));
            }
            Ok(rays.iter().map(|&(o, d)| self.ray_query_nearest_hit(o, d)).collect())
        }
        fn state(&self) -> crate::accel::SceneState {
            crate::accel::SceneState::Ready
        }
        fn stats(&self) -> crate::accel::AccelStats {
            unimplemented!()
        }
    }

    #[test]
    fn query_pixel_reports_backend_failures() {
        let tracer = RayTracer::new(4, 4);
        let hit = tracer.query_pixel(&FixedHit { lost: false }, 1, 2).unwrap();
        assert_eq!(hit.inst_id, 3);
        assert_eq!(hit, tracer.trace_pixel(&FixedHit { lost: false }, 1, 2));

        let lost = FixedHit { lost: true };
        assert!(matches!(tracer.query_pixel(&lost, 1, 2), Err(AccelError::Backend(_))));
    }

    #[test]
    fn uniform_block_layout() {
        assert_eq!(std::mem::size_of::<RayTracerUniforms>(), 96);
        let mut tracer = RayTracer::new(640, 480);
        tracer.update_view(Vec3(1.0, 2.0, 3.0), &Matrix4x4::translation(Vec3(4.0, 5.0, 6.0)));
        let u = tracer.uniforms(10, 3);
        // translation lands in the last column
        assert_eq!(u.inv_proj_view[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(u.cam_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!((u.width, u.height, u.accel_capacity, u.accel_size), (640, 480, 10, 3));
    }
}
