//! Hardware backend: staging and bottom-level builds happen on the host, the
//! committed snapshot is flattened into storage buffers and traversed by a
//! wgpu compute shader.

use std::sync::Arc;

use bytemuck::Zeroable;
use raytracing::{
    accel::{AccelError, AccelStats, AccelerationStructure, CommittedScene, HitRecord, SceneStaging, SceneState},
    geometry::{Matrix4x4, Vec4},
    ids::INVALID_ID,
    kernel::{palette_color, RayTracer, RayTracerUniforms},
    scene::SceneCapacity,
};
use tracing::{debug, error, info, trace_span};

pub mod buffers;
mod context;
mod pipeline;

pub use buffers::{DeviceScene, GpuInstance, GpuRay, GpuSceneBuffers, GpuTriangle};
pub use context::{GpuBackendSettings, GpuContext, GpuError};
pub use pipeline::RayTracePipeline;


#[derive(Debug)]
pub struct GpuAccelerationStructure {
    staging: SceneStaging,
    context: Arc<GpuContext>,
    pipeline: RayTracePipeline,
    device_scene: Option<DeviceScene>,
    // snapshot the device buffers were packed from
    uploaded: Option<Arc<CommittedScene>>,
}

impl GpuAccelerationStructure {
    pub fn new(capacity: SceneCapacity, settings: &GpuBackendSettings) -> Result<Self, GpuError> {
        let context = Arc::new(GpuContext::new(settings)?);
        Self::with_context(context, capacity)
    }

    /// Shares an existing device, e.g. between several scenes
    pub fn with_context(context: Arc<GpuContext>, capacity: SceneCapacity) -> Result<Self, GpuError> {
        let pipeline = RayTracePipeline::new(&context)?;
        Ok(GpuAccelerationStructure {
            staging: SceneStaging::new(capacity),
            context,
            pipeline,
            device_scene: None,
            uploaded: None,
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    fn drop_device_scene(&mut self) {
        self.device_scene = None;
        self.uploaded = None;
    }

    // Re-uploads when the staging snapshot is not the one on the device
    fn sync_device(&mut self) -> Result<(), AccelError> {
        let snapshot = self.staging.snapshot();
        let current = match (&snapshot, &self.uploaded) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if current {
            return Ok(());
        }

        let Some(snapshot) = snapshot else {
            self.drop_device_scene();
            return Ok(());
        };

        let packed = GpuSceneBuffers::pack(&snapshot);
        let device_scene = match DeviceScene::upload(&self.context, &packed) {
            Ok(scene) => scene,
            Err(e) => {
                error!("scene upload failed: {e}");
                // queries must not keep hitting the previous upload
                self.drop_device_scene();
                self.staging.invalidate();
                return Err(AccelError::Backend(Box::new(e)));
            }
        };
        debug!(
            "device scene: {} tlas nodes, {} blas nodes, {} triangles",
            packed.tlas_nodes.len(),
            packed.blas_nodes.len(),
            packed.triangles.len()
        );
        self.device_scene = Some(device_scene);
        self.uploaded = Some(snapshot);
        Ok(())
    }

    fn uniforms(&self, tracer: Option<&RayTracer>) -> RayTracerUniforms {
        let capacity = self.staging.capacity().max_instances;
        let size = self.device_scene.as_ref().map_or(0, |s| s.instance_count);
        match tracer {
            Some(tracer) => tracer.uniforms(capacity, size),
            None => RayTracerUniforms {
                accel_capacity: capacity,
                accel_size: size,
                ..RayTracerUniforms::zeroed()
            },
        }
    }
}

impl AccelerationStructure for GpuAccelerationStructure {
    fn clear_geom(&mut self) {
        self.staging.clear_geom();
        self.drop_device_scene();
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
        self.drop_device_scene();
    }

    fn add_instance(&mut self, geom_id: u32, transform: &Matrix4x4) -> u32 {
        self.staging.add_instance(geom_id, transform)
    }

    fn update_instance(&mut self, inst_id: u32, transform: &Matrix4x4) -> Result<(), AccelError> {
        self.staging.update_instance(inst_id, transform)?;
        self.sync_device()
    }

    fn commit_scene(&mut self) -> Result<(), AccelError> {
        self.staging.commit_scene()?;
        self.sync_device()
    }

    fn ray_query_nearest_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> HitRecord {
        match self.ray_query_nearest_hit_batch(&[(origin_and_tmin, direction_and_tmax)]) {
            Ok(hits) => hits.first().copied().unwrap_or_default(),
            Err(e) => {
                error!("ray query failed: {e}");
                HitRecord::miss()
            }
        }
    }

    fn ray_query_any_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> bool {
        self.ray_query_nearest_hit(origin_and_tmin, direction_and_tmax).is_hit()
    }

    fn ray_query_nearest_hit_batch(&self, rays: &[(Vec4, Vec4)]) -> Result<Vec<HitRecord>, AccelError> {
        let Some(scene) = &self.device_scene else {
            return Ok(vec![HitRecord::miss(); rays.len()]);
        };
        let gpu_rays: Vec<GpuRay> = rays.iter().copied().map(GpuRay::from).collect();
        self.pipeline
            .trace_rays(&self.context, scene, &self.uniforms(None), &gpu_rays)
            .map_err(|e| AccelError::Backend(Box::new(e)))
    }

    fn state(&self) -> SceneState {
        self.staging.state()
    }

    fn stats(&self) -> AccelStats {
        self.staging.stats()
    }
}

/// Dispatched form of the ray-cast kernel: one invocation per pixel over the
/// tracer's host-generated eye rays.
pub fn render(accel: &GpuAccelerationStructure, tracer: &RayTracer) -> Result<Vec<u32>, GpuError> {
    let pixel_count = (tracer.width() * tracer.height()) as usize;
    let Some(scene) = &accel.device_scene else {
        return Ok(vec![palette_color(INVALID_ID); pixel_count]);
    };

    let render_span = trace_span!("render");
    let _enter = render_span.enter();
    let start = std::time::Instant::now();

    let rays: Vec<GpuRay> = tracer.generate_rays().into_iter().map(GpuRay::from).collect();
    let colors = accel
        .pipeline
        .cast_single_ray(&accel.context, scene, &accel.uniforms(Some(tracer)), &rays)?;

    info!("rendered {}x{} in {:?}", tracer.width(), tracer.height(), start.elapsed());
    Ok(colors)
}
