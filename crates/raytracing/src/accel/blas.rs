use std::time::Instant;

use tracing::debug;

use crate::geometry::{Vec3, Vec4, AABB};

use super::bvh2::{Bvh2, BvhNode};

/// Per-mesh hierarchy. Owns a copy of its triangles in leaf order so
/// traversal never touches the mesh store.
#[derive(Debug, Clone, PartialEq)]
pub struct BottomLevelBvh {
    pub bvh: Bvh2,
    pub triangles: Vec<[Vec3; 3]>,
    /// original primitive index of each entry in `triangles`
    pub prim_ids: Vec<u32>,
    pub bounds: AABB,
}

fn triangle_bounds(tri: &[Vec3; 3]) -> AABB {
    if tri.iter().all(Vec3::is_finite) {
        AABB::from_points(tri)
    } else {
        AABB::empty()
    }
}

impl BottomLevelBvh {
    /// `indices` are local to `vertices` and already validated by the mesh store
    pub fn build(vertices: &[Vec4], indices: &[u32]) -> BottomLevelBvh {
        let start = Instant::now();

        let source: Vec<[Vec3; 3]> = indices
            .chunks_exact(3)
            .map(|t| {
                [
                    vertices[t[0] as usize].xyz(),
                    vertices[t[1] as usize].xyz(),
                    vertices[t[2] as usize].xyz(),
                ]
            })
            .collect();
        let boxes: Vec<AABB> = source.iter().map(triangle_bounds).collect();

        let bvh = Bvh2::build(&boxes);
        let triangles = bvh.prim_order.iter().map(|&p| source[p as usize]).collect();
        let prim_ids = bvh.prim_order.clone();
        let bounds = bvh.bounds();

        debug!(
            "built bottom level over {} triangles ({} nodes) in {:?}",
            source.len(),
            bvh.nodes.len(),
            start.elapsed()
        );

        BottomLevelBvh {
            bvh,
            triangles,
            prim_ids,
            bounds,
        }
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.bvh.nodes
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}
