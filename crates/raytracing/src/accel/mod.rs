//! Two-level acceleration structure: per-mesh bottom levels, a scene-wide top
//! level over instances, and the facade both backends implement.

use thiserror::Error;

use crate::{
    geometry::{Matrix4x4, Vec4},
    scene::{MeshStoreError, SceneCapacity},
};

pub mod blas;
pub mod bvh2;
pub mod hit;
pub mod staging;
pub mod tlas;

pub use blas::BottomLevelBvh;
pub use bvh2::{Bvh2, BvhNode};
pub use hit::{intersect_triangle, HitRecord, Ray};
pub use staging::SceneStaging;
pub use tlas::{CommittedInstance, CommittedScene, TopLevelBvh};

#[derive(Debug, Error)]
pub enum AccelError {
    #[error("scene has no instances to commit")]
    EmptyScene,
    #[error("instance {inst_id} references geometry {geom_id} from before the last ClearGeom")]
    DanglingGeometry { inst_id: u32, geom_id: u32 },
    #[error("unknown geometry id {0}")]
    UnknownGeometry(u32),
    #[error("unknown instance id {0}")]
    UnknownInstance(u32),
    #[error("instance transform is not invertible")]
    SingularTransform,
    #[error("{0} not implemented by this backend")]
    NotImplemented(&'static str),
    #[error(transparent)]
    Mesh(#[from] MeshStoreError),
    #[error("backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Empty,
    GeomLoaded,
    InstancesStaged,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelStats {
    pub geometry_count: u32,
    pub instance_count: u32,
    pub total_vertices: u32,
    pub total_primitives: u32,
    pub blas_node_count: u32,
    pub tlas_node_count: u32,
    pub capacity: SceneCapacity,
}

/// Geometry ingestion, instancing, commit and ray queries, independent of
/// where traversal runs.
///
/// Id-returning calls report failure with `INVALID_ID` and log the reason.
/// Queries outside the `Ready` state return a miss. Mutating calls must not
/// overlap with queries; queries may run concurrently with each other.
pub trait AccelerationStructure: Send + Sync {
    fn clear_geom(&mut self);

    fn add_geom_triangles4f(&mut self, vertices: &[Vec4], indices: &[u32]) -> u32;

    fn update_geom_triangles4f(
        &mut self,
        geom_id: u32,
        vertices: &[Vec4],
        indices: &[u32],
    ) -> Result<(), AccelError>;

    fn clear_scene(&mut self);

    fn add_instance(&mut self, geom_id: u32, transform: &Matrix4x4) -> u32;

    fn update_instance(&mut self, inst_id: u32, transform: &Matrix4x4) -> Result<(), AccelError>;

    fn commit_scene(&mut self) -> Result<(), AccelError>;

    /// Closest hit with `t` in `[origin_and_tmin.w, direction_and_tmax.w)`
    fn ray_query_nearest_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> HitRecord;

    fn ray_query_any_hit(&self, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> bool;

    /// Many nearest-hit queries at once. Device failures are returned
    /// instead of being folded into misses.
    fn ray_query_nearest_hit_batch(&self, rays: &[(Vec4, Vec4)]) -> Result<Vec<HitRecord>, AccelError> {
        Ok(rays
            .iter()
            .map(|&(o, d)| self.ray_query_nearest_hit(o, d))
            .collect())
    }

    fn state(&self) -> SceneState;

    fn stats(&self) -> AccelStats;
}
