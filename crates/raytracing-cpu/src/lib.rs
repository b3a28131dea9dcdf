use std::{sync::Arc, time::Instant};

use rayon::prelude::*;
use raytracing::{
    accel::{AccelError, AccelStats, AccelerationStructure, CommittedScene, HitRecord, Ray, SceneStaging, SceneState},
    geometry::{Matrix4x4, Vec4},
    kernel::{hit_color, RayTracer},
    scene::SceneCapacity,
};
use tracing::{info, trace_span};

mod accel;

#[cfg(test)]
mod tests;

/// Software-traversal backend. Bottom levels are built on `commit_scene`
/// and traversed on the calling thread.
#[derive(Debug, Default)]
pub struct CpuAccelerationStructure {
    staging: SceneStaging,
}

impl CpuAccelerationStructure {
    pub fn new(capacity: SceneCapacity) -> Self {
        CpuAccelerationStructure {
            staging: SceneStaging::new(capacity),
        }
    }

    /// Keeps the current committed scene alive independently of later commits
    pub fn snapshot(&self) -> Option<Arc<CommittedScene>> {
        self.staging.snapshot()
    }
}

impl AccelerationStructure for CpuAccelerationStructure {
    fn clear_geom(&mut self) {
        self.staging.clear_geom();
    }

    fn add_geom_triangles4f(&mut self, vertices: &[Vec4], indices: &[u32]) -> u32 {
        self.staging.add_geom_triangles4f(vertices, indices)
    }

    fn update_geom_triangles4f(
        &mut self,
        geom_id: u32,
        vertices: &[Vec4],
        indices: &[u32],
    ) -> Result<(), AccelError> {
        self.staging.update_geom_triangles4f(geom_id, vertices, indices)
    }

    fn clear_scene(&mut self) {
        self.staging.clear_scene();
    }

    fn add_instance(&mut self, geom_id: u32, transform: &Matrix4x4) -> u32 {
        self.staging.add_instance(geom_id, transform)
    }

    fn update_instance(&mut self, inst_id: u32, transform: &Matrix4x4) -> Result<(), AccelError> {
        self.staging.update_instance(inst_id, transform)
    }

    fn commit_scene(&mut self) -> Result<(), AccelError> {
        self.staging.commit_scene().map(|_| ())
    }

    fn ray_query_nearest_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> HitRecord {
        let Some(scene) = self.staging.committed() else {
            return HitRecord::miss();
        };
        let ray = Ray::from_packed(origin_and_tmin, direction_and_tmax);
        accel::traverse_scene(scene, &ray, false).unwrap_or_default()
    }

    fn ray_query_any_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> bool {
        let Some(scene) = self.staging.committed() else {
            return false;
        };
        let ray = Ray::from_packed(origin_and_tmin, direction_and_tmax);
        accel::traverse_scene(scene, &ray, true).is_some()
    }

    fn ray_query_nearest_hit_batch(&self, rays: &[(Vec4, Vec4)]) -> Result<Vec<HitRecord>, AccelError> {
        Ok(rays
            .par_iter()
            .map(|&(o, d)| self.ray_query_nearest_hit(o, d))
            .collect())
    }

    fn state(&self) -> SceneState {
        self.staging.state()
    }

    fn stats(&self) -> AccelStats {
        self.staging.stats()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackendSettings {
    /// 0 uses rayon's default (one per logical core)
    pub num_threads: u32,
}

/// Parallel-loop form of the ray-cast kernel: rows are split across a rayon
/// pool, each pixel writing only its own slot.
pub fn render<A>(accel: &A, tracer: &RayTracer, backend_settings: CpuBackendSettings) -> Vec<u32>
where
    A: AccelerationStructure + ?Sized,
{
    let width = tracer.width() as usize;
    let height = tracer.height() as usize;
    let mut colors = vec![0u32; width * height];
    if width == 0 || height == 0 {
        return colors;
    }

    let render_span = trace_span!("render");
    let _enter = render_span.enter();
    let start = Instant::now();

    let trace_rows = |colors: &mut [u32]| {
        colors
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, pixel) in row.iter_mut().enumerate() {
                    let hit = tracer.trace_pixel(accel, x as u32, y as u32);
                    *pixel = hit_color(&hit);
                }
            });
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(backend_settings.num_threads as usize)
        .build();
    match pool {
        Ok(pool) => pool.install(|| trace_rows(&mut colors)),
        Err(e) => {
            tracing::warn!("could not create worker pool ({e}), using the global pool");
            trace_rows(&mut colors);
        }
    }

    info!("rendered {width}x{height} in {:?}", start.elapsed());
    colors
}
