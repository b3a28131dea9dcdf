//! Compute pipelines for the traversal shader and the dispatch/readback
//! plumbing around them.

use raytracing::{accel::HitRecord, kernel::RayTracerUniforms};
use tracing::trace;
use wgpu::util::DeviceExt;

use crate::{
    buffers::{storage_buffer, DeviceScene, GpuRay},
    context::{GpuContext, GpuError},
};

const RAYTRACE_SHADER: &str = include_str!("shaders/raytrace.wgsl");

const TRACE_WORKGROUP_SIZE: u32 = 64;
const MAX_WORKGROUPS_PER_DIM: u32 = 65535;
const PIXEL_TILE: u32 = 8;

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Splits `workgroups` over x and y so neither exceeds the per-dimension limit
pub(crate) fn dispatch_size(workgroups: u32) -> (u32, u32) {
    if workgroups <= MAX_WORKGROUPS_PER_DIM {
        (workgroups.max(1), 1)
    } else {
        (MAX_WORKGROUPS_PER_DIM, workgroups.div_ceil(MAX_WORKGROUPS_PER_DIM))
    }
}

pub struct RayTracePipeline {
    trace_rays: wgpu::ComputePipeline,
    cast_single_ray: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl std::fmt::Debug for RayTracePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayTracePipeline").finish_non_exhaustive()
    }
}

impl RayTracePipeline {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        ctx.scoped(|device| {
            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("raytrace shader"),
                source: wgpu::ShaderSource::Wgsl(RAYTRACE_SHADER.into()),
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("raytrace bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // tlas nodes, instances, blas nodes, triangles, prim ids
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, true),
                    storage_entry(5, true),
                    // rays in, hits and colors out
                    storage_entry(6, true),
                    storage_entry(7, false),
                    storage_entry(8, false),
                ],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("raytrace pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let make_pipeline = |entry_point: &str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader_module,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                })
            };

            RayTracePipeline {
                trace_rays: make_pipeline("trace_rays"),
                cast_single_ray: make_pipeline("cast_single_ray"),
                bind_group_layout,
            }
        })
    }

    /// Nearest hit for every ray, in input order
    pub fn trace_rays(
        &self,
        ctx: &GpuContext,
        scene: &DeviceScene,
        uniforms: &RayTracerUniforms,
        rays: &[GpuRay],
    ) -> Result<Vec<HitRecord>, GpuError> {
        if rays.is_empty() {
            return Ok(Vec::new());
        }
        let ray_count = rays.len() as u32;

        let uniform_buffer = self.uniform_buffer(ctx, uniforms);
        let ray_buffer = storage_buffer(ctx, "rays", rays, wgpu::BufferUsages::empty())?;
        let hit_buffer = storage_buffer(ctx, "hits", &vec![HitRecord::miss(); rays.len()], wgpu::BufferUsages::COPY_SRC)?;
        let color_buffer = storage_buffer::<u32>(ctx, "colors", &[], wgpu::BufferUsages::empty())?;

        let bind_group = self.bind_group(ctx, scene, &uniform_buffer, &ray_buffer, &hit_buffer, &color_buffer);
        let (x, y) = dispatch_size(ray_count.div_ceil(TRACE_WORKGROUP_SIZE));
        trace!("trace_rays: {ray_count} rays in {x}x{y} workgroups");

        self.dispatch_and_read(ctx, &self.trace_rays, &bind_group, (x, y), &hit_buffer, rays.len())
    }

    /// One ARGB color per pixel, row-major. `rays` holds one primary ray per
    /// pixel in the same order.
    pub fn cast_single_ray(
        &self,
        ctx: &GpuContext,
        scene: &DeviceScene,
        uniforms: &RayTracerUniforms,
        rays: &[GpuRay],
    ) -> Result<Vec<u32>, GpuError> {
        let pixel_count = (uniforms.width * uniforms.height) as usize;
        if pixel_count == 0 {
            return Ok(Vec::new());
        }
        if rays.len() != pixel_count {
            return Err(GpuError::Validation(format!(
                "{} rays for {pixel_count} pixels",
                rays.len()
            )));
        }

        let uniform_buffer = self.uniform_buffer(ctx, uniforms);
        let ray_buffer = storage_buffer(ctx, "rays", rays, wgpu::BufferUsages::empty())?;
        let hit_buffer = storage_buffer::<HitRecord>(ctx, "hits", &[], wgpu::BufferUsages::empty())?;
        let color_buffer = storage_buffer(ctx, "colors", &vec![0u32; pixel_count], wgpu::BufferUsages::COPY_SRC)?;

        let bind_group = self.bind_group(ctx, scene, &uniform_buffer, &ray_buffer, &hit_buffer, &color_buffer);
        let groups = (uniforms.width.div_ceil(PIXEL_TILE), uniforms.height.div_ceil(PIXEL_TILE));

        self.dispatch_and_read(ctx, &self.cast_single_ray, &bind_group, groups, &color_buffer, pixel_count)
    }

    fn uniform_buffer(&self, ctx: &GpuContext, uniforms: &RayTracerUniforms) -> wgpu::Buffer {
        ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("raytracer uniforms"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn bind_group(
        &self,
        ctx: &GpuContext,
        scene: &DeviceScene,
        uniforms: &wgpu::Buffer,
        rays: &wgpu::Buffer,
        hits: &wgpu::Buffer,
        colors: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let buffers = [
            uniforms,
            &scene.tlas_nodes,
            &scene.instances,
            &scene.blas_nodes,
            &scene.triangles,
            &scene.prim_ids,
            rays,
            hits,
            colors,
        ];
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raytrace bind group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }

    fn dispatch_and_read<T: bytemuck::Pod>(
        &self,
        ctx: &GpuContext,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        (x, y): (u32, u32),
        output: &wgpu::Buffer,
        len: usize,
    ) -> Result<Vec<T>, GpuError> {
        let size = (len * size_of::<T>()) as u64;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        ctx.scoped(|device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raytrace encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("raytrace pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(x, y, 1);
            }
            encoder.copy_buffer_to_buffer(output, 0, &staging, 0, size);
            ctx.queue.submit(Some(encoder.finish()));
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::Validation("readback callback dropped".to_string()))??;

        let data = slice.get_mapped_range();
        let out = bytemuck::pod_collect_to_vec::<u8, T>(&data);
        drop(data);
        staging.unmap();
        Ok(out)
    }
}
