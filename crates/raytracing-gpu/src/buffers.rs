//! Flattening a committed scene into device buffers.
//!
//! Bottom levels are concatenated; node and triangle indices inside a bottom
//! level stay local and each instance record carries the offsets. Instances
//! are stored in top-level leaf order so leaves index them directly.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use raytracing::{
    accel::{BvhNode, CommittedScene},
    geometry::Vec4,
};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::context::{GpuContext, GpuError};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuInstance {
    /// column-major, as WGSL expects
    pub world_to_object: [[f32; 4]; 4],
    pub blas_node_offset: u32,
    pub triangle_offset: u32,
    pub geom_id: u32,
    pub inst_id: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 4],
    pub v1: [f32; 4],
    pub v2: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuRay {
    pub origin_tmin: [f32; 4],
    pub dir_tmax: [f32; 4],
}

impl From<(Vec4, Vec4)> for GpuRay {
    fn from((origin_tmin, dir_tmax): (Vec4, Vec4)) -> Self {
        GpuRay {
            origin_tmin: origin_tmin.into(),
            dir_tmax: dir_tmax.into(),
        }
    }
}

// stands in for a bottom level without triangles; its inverted box fails
// every slab test
const EMPTY_NODE: BvhNode = BvhNode {
    min: [f32::INFINITY; 3],
    left_or_first: 0,
    max: [f32::NEG_INFINITY; 3],
    count: 0,
};

/// Host-side copy of everything the kernel reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuSceneBuffers {
    pub tlas_nodes: Vec<BvhNode>,
    pub instances: Vec<GpuInstance>,
    pub blas_nodes: Vec<BvhNode>,
    pub triangles: Vec<GpuTriangle>,
    pub prim_ids: Vec<u32>,
}

impl GpuSceneBuffers {
    pub fn pack(scene: &CommittedScene) -> Self {
        let mut out = GpuSceneBuffers {
            tlas_nodes: scene.tlas.bvh.nodes.clone(),
            ..Default::default()
        };

        // (node offset, triangle offset) per geometry
        let mut offsets: HashMap<u32, (u32, u32)> = HashMap::new();
        for (geom_id, blas) in scene.unique_blases() {
            offsets.insert(geom_id, (out.blas_nodes.len() as u32, out.triangles.len() as u32));
            if blas.nodes().is_empty() {
                out.blas_nodes.push(EMPTY_NODE);
            } else {
                out.blas_nodes.extend_from_slice(blas.nodes());
            }
            out.triangles.extend(blas.triangles.iter().map(|[a, b, c]| GpuTriangle {
                v0: Vec4::point(*a).into(),
                v1: Vec4::point(*b).into(),
                v2: Vec4::point(*c).into(),
            }));
            out.prim_ids.extend_from_slice(&blas.prim_ids);
        }

        out.instances = scene
            .tlas
            .bvh
            .prim_order
            .iter()
            .map(|&i| {
                let inst = &scene.instances[i as usize];
                let (blas_node_offset, triangle_offset) = offsets[&inst.geom_id];
                GpuInstance {
                    world_to_object: inst.transform.inverse().transposed().data,
                    blas_node_offset,
                    triangle_offset,
                    geom_id: inst.geom_id,
                    inst_id: inst.inst_id,
                }
            })
            .collect();

        out
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn byte_size(&self) -> usize {
        size_of_val(self.tlas_nodes.as_slice())
            + size_of_val(self.instances.as_slice())
            + size_of_val(self.blas_nodes.as_slice())
            + size_of_val(self.triangles.as_slice())
            + size_of_val(self.prim_ids.as_slice())
    }
}

/// wgpu rejects zero-sized storage bindings, so empty arrays get one zeroed
/// element
pub(crate) fn padded_bytes<T: Pod>(data: &[T]) -> Vec<u8> {
    if data.is_empty() {
        bytemuck::bytes_of(&T::zeroed()).to_vec()
    } else {
        bytemuck::cast_slice(data).to_vec()
    }
}

pub(crate) fn storage_buffer<T: Pod>(
    ctx: &GpuContext,
    label: &str,
    data: &[T],
    extra_usage: wgpu::BufferUsages,
) -> Result<wgpu::Buffer, GpuError> {
    let contents = padded_bytes(data);
    let max = ctx.device.limits().max_storage_buffer_binding_size as usize;
    if contents.len() > max {
        return Err(GpuError::OutOfMemory(format!(
            "{label} needs {} bytes, binding limit is {max}",
            contents.len()
        )));
    }

    ctx.scoped(|device| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &contents,
            usage: wgpu::BufferUsages::STORAGE | extra_usage,
        })
    })
}

/// A packed scene resident on the device
#[derive(Debug)]
pub struct DeviceScene {
    pub tlas_nodes: wgpu::Buffer,
    pub instances: wgpu::Buffer,
    pub blas_nodes: wgpu::Buffer,
    pub triangles: wgpu::Buffer,
    pub prim_ids: wgpu::Buffer,
    pub instance_count: u32,
}

impl DeviceScene {
    pub fn upload(ctx: &GpuContext, packed: &GpuSceneBuffers) -> Result<DeviceScene, GpuError> {
        let none = wgpu::BufferUsages::empty();
        let scene = DeviceScene {
            tlas_nodes: storage_buffer(ctx, "tlas nodes", &packed.tlas_nodes, none)?,
            instances: storage_buffer(ctx, "instances", &packed.instances, none)?,
            blas_nodes: storage_buffer(ctx, "blas nodes", &packed.blas_nodes, none)?,
            triangles: storage_buffer(ctx, "triangles", &packed.triangles, none)?,
            prim_ids: storage_buffer(ctx, "prim ids", &packed.prim_ids, none)?,
            instance_count: packed.instance_count(),
        };
        debug!("uploaded {} bytes of scene data", packed.byte_size());
        Ok(scene)
    }
}
