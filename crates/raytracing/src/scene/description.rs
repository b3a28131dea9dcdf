use tracing::warn;

use crate::{
    accel::{AccelError, AccelerationStructure},
    geometry::{Matrix4x4, Vec4, AABB},
    ids::{is_valid, INVALID_ID},
};

use super::Camera;

/// Triangle soup for one mesh: `(x, y, z, 1)` positions and local indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vec4>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceData {
    /// index into `SceneDescription::meshes`
    pub mesh: usize,
    /// row-major object-to-world
    pub transform: Matrix4x4,
}

/// What scene loaders hand to the core: meshes, placements and a camera
#[derive(Debug, Clone)]
pub struct SceneDescription {
    pub meshes: Vec<MeshData>,
    pub instances: Vec<InstanceData>,
    pub camera: Camera,
}

/// Outcome of `SceneDescription::load_into`. Rejected meshes and instances
/// are logged and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// geometry id per mesh, `INVALID_ID` where the mesh was rejected
    pub geom_ids: Vec<u32>,
    pub inst_ids: Vec<u32>,
    pub rejected_meshes: usize,
    pub rejected_instances: usize,
}

impl SceneDescription {
    /// World-space bounds of all instances
    pub fn bounds(&self) -> AABB {
        self.instances
            .iter()
            .filter_map(|inst| {
                let mesh = self.meshes.get(inst.mesh)?;
                let local = AABB::from_points(&mesh.vertices.iter().map(Vec4::xyz).collect::<Vec<_>>());
                Some(local.transform_aabb(&inst.transform))
            })
            .fold(AABB::empty(), AABB::surrounding_box)
    }

    pub fn triangle_count(&self) -> usize {
        self.instances
            .iter()
            .filter_map(|inst| self.meshes.get(inst.mesh))
            .map(|m| m.indices.len() / 3)
            .sum()
    }

    /// Runs ClearGeom, AddGeom, ClearScene, AddInstance and CommitScene
    /// against `accel`
    pub fn load_into<A>(&self, accel: &mut A) -> Result<LoadSummary, AccelError>
    where
        A: AccelerationStructure + ?Sized,
    {
        let mut summary = LoadSummary::default();

        accel.clear_geom();
        for mesh in &self.meshes {
            let geom_id = accel.add_geom_triangles4f(&mesh.vertices, &mesh.indices);
            if !is_valid(geom_id) {
                warn!("mesh '{}' was not loaded", mesh.name);
                summary.rejected_meshes += 1;
            }
            summary.geom_ids.push(geom_id);
        }

        accel.clear_scene();
        for inst in &self.instances {
            let geom_id = summary.geom_ids.get(inst.mesh).copied().unwrap_or(INVALID_ID);
            let inst_id = if is_valid(geom_id) {
                accel.add_instance(geom_id, &inst.transform)
            } else {
                INVALID_ID
            };
            if !is_valid(inst_id) {
                summary.rejected_instances += 1;
            }
            summary.inst_ids.push(inst_id);
        }

        accel.commit_scene()?;
        Ok(summary)
    }
}
