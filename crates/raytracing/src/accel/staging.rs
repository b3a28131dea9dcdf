use std::{sync::Arc, time::Instant};

use tracing::{debug, info, warn};

use crate::{
    geometry::{Matrix4x4, Transform, Vec4},
    ids::{GeomHandle, INVALID_ID},
    scene::{MeshStore, SceneCapacity},
};

use super::{
    blas::BottomLevelBvh,
    tlas::{CommittedInstance, CommittedScene},
    AccelError, AccelStats, SceneState,
};

#[derive(Debug, Clone)]
struct StagedInstance {
    geom: GeomHandle,
    transform: Transform,
}

/// Backend-independent half of an acceleration structure: the mesh store,
/// the geometry and instance tables, and the current committed snapshot.
/// Backends wrap this and add traversal (and upload, for device backends).
#[derive(Debug, Default)]
pub struct SceneStaging {
    meshes: MeshStore,
    // indexed by geometry id; bottom levels are built on commit
    geometries: Vec<Option<Arc<BottomLevelBvh>>>,
    geom_generation: u32,
    instances: Vec<StagedInstance>,
    committed: Option<Arc<CommittedScene>>,
    dirty: bool,
}

impl SceneStaging {
    pub fn new(capacity: SceneCapacity) -> Self {
        SceneStaging {
            meshes: MeshStore::new(capacity),
            ..Default::default()
        }
    }

    pub fn capacity(&self) -> SceneCapacity {
        self.meshes.capacity()
    }

    pub fn meshes(&self) -> &MeshStore {
        &self.meshes
    }

    pub fn clear_geom(&mut self) {
        self.meshes.clear();
        self.geometries.clear();
        self.geom_generation = self.geom_generation.wrapping_add(1);
        self.committed = None;
        self.dirty = true;
    }

    pub fn add_geom_triangles4f(&mut self, vertices: &[Vec4], indices: &[u32]) -> u32 {
        match self.meshes.add_mesh(vertices, indices) {
            Ok(id) => {
                debug_assert_eq!(id as usize, self.geometries.len());
                self.geometries.push(None);
                id
            }
            Err(e) => {
                warn!("rejected geometry: {e}");
                INVALID_ID
            }
        }
    }

    /// Replaces a geometry's triangles. Its bottom level is rebuilt by the
    /// next commit; until then the previous snapshot stays queryable.
    pub fn update_geom_triangles4f(
        &mut self,
        geom_id: u32,
        vertices: &[Vec4],
        indices: &[u32],
    ) -> Result<(), AccelError> {
        if geom_id as usize >= self.geometries.len() {
            return Err(AccelError::UnknownGeometry(geom_id));
        }
        self.meshes.replace_mesh(geom_id, vertices, indices)?;
        self.geometries[geom_id as usize] = None;
        self.dirty = true;
        Ok(())
    }

    pub fn clear_scene(&mut self) {
        self.instances.clear();
        self.committed = None;
        self.dirty = true;
    }

    pub fn add_instance(&mut self, geom_id: u32, transform: &Matrix4x4) -> u32 {
        if geom_id as usize >= self.geometries.len() {
            warn!("{}", AccelError::UnknownGeometry(geom_id));
            return INVALID_ID;
        }
        let max_instances = self.capacity().max_instances;
        if self.instances.len() as u64 >= max_instances as u64 {
            warn!("instance capacity exceeded ({max_instances})");
            return INVALID_ID;
        }
        let Some(transform) = Transform::new(*transform) else {
            warn!("{}", AccelError::SingularTransform);
            return INVALID_ID;
        };

        let inst_id = self.instances.len() as u32;
        self.instances.push(StagedInstance {
            geom: GeomHandle::new(self.geom_generation, geom_id),
            transform,
        });
        self.dirty = true;
        inst_id
    }

    /// Moves an instance. When the staged scene matches the committed one
    /// the top level is refitted and swapped in right away; otherwise the new
    /// transform is picked up by the next commit.
    pub fn update_instance(&mut self, inst_id: u32, transform: &Matrix4x4) -> Result<(), AccelError> {
        let transform = Transform::new(*transform).ok_or(AccelError::SingularTransform)?;
        let staged = self
            .instances
            .get_mut(inst_id as usize)
            .ok_or(AccelError::UnknownInstance(inst_id))?;
        staged.transform = transform;

        if self.dirty {
            return Ok(());
        }
        if let Some(committed) = &self.committed {
            if let Some(refitted) = committed.with_instance_transform(inst_id as usize, transform) {
                self.committed = Some(Arc::new(refitted));
            }
        }
        Ok(())
    }

    /// Builds the top level over all staged instances (and any missing bottom
    /// levels) and publishes it as the new snapshot. A no-op when nothing
    /// changed since the last commit.
    pub fn commit_scene(&mut self) -> Result<Arc<CommittedScene>, AccelError> {
        if !self.dirty {
            if let Some(committed) = &self.committed {
                return Ok(committed.clone());
            }
        }
        if self.instances.is_empty() {
            return Err(AccelError::EmptyScene);
        }

        for (inst_id, inst) in self.instances.iter().enumerate() {
            if inst.geom.generation != self.geom_generation
                || inst.geom.index as usize >= self.geometries.len()
            {
                return Err(AccelError::DanglingGeometry {
                    inst_id: inst_id as u32,
                    geom_id: inst.geom.index,
                });
            }
        }

        let start = Instant::now();
        let mut built = 0;
        for inst in &self.instances {
            let geom_id = inst.geom.index;
            if self.geometries[geom_id as usize].is_some() {
                continue;
            }
            let (Some(vertices), Some(indices)) = (self.meshes.vertices(geom_id), self.meshes.indices(geom_id))
            else {
                return Err(AccelError::UnknownGeometry(geom_id));
            };
            self.geometries[geom_id as usize] = Some(Arc::new(BottomLevelBvh::build(vertices, indices)));
            built += 1;
        }
        debug!("built {built} bottom levels in {:?}", start.elapsed());

        let start = Instant::now();
        let mut instances = Vec::with_capacity(self.instances.len());
        for (inst_id, inst) in self.instances.iter().enumerate() {
            let geom_id = inst.geom.index;
            let blas = self.geometries[geom_id as usize]
                .clone()
                .ok_or(AccelError::UnknownGeometry(geom_id))?;
            instances.push(CommittedInstance::new(inst_id as u32, geom_id, blas, inst.transform));
        }
        let scene = Arc::new(CommittedScene::new(instances));
        info!(
            "committed scene: {} instances, {} top-level nodes in {:?}",
            scene.instances.len(),
            scene.tlas.bvh.nodes.len(),
            start.elapsed()
        );

        self.committed = Some(scene.clone());
        self.dirty = false;
        Ok(scene)
    }

    /// Drops the committed snapshot and marks the staged scene dirty, so
    /// queries miss until the next successful commit
    pub fn invalidate(&mut self) {
        self.committed = None;
        self.dirty = true;
    }

    /// Current snapshot, if the last commit is still valid
    pub fn snapshot(&self) -> Option<Arc<CommittedScene>> {
        self.committed.clone()
    }

    pub fn committed(&self) -> Option<&CommittedScene> {
        self.committed.as_deref()
    }

    pub fn state(&self) -> SceneState {
        if self.committed.is_some() && !self.dirty {
            SceneState::Ready
        } else if !self.instances.is_empty() {
            SceneState::InstancesStaged
        } else if !self.geometries.is_empty() {
            SceneState::GeomLoaded
        } else {
            SceneState::Empty
        }
    }

    pub fn stats(&self) -> AccelStats {
        AccelStats {
            geometry_count: self.geometries.len() as u32,
            instance_count: self.instances.len() as u32,
            total_vertices: self.meshes.total_vertices(),
            total_primitives: self.meshes.total_primitives(),
            blas_node_count: self
                .geometries
                .iter()
                .flatten()
                .map(|b| b.nodes().len() as u32)
                .sum(),
            tlas_node_count: self
                .committed
                .as_ref()
                .map(|c| c.tlas.bvh.nodes.len() as u32)
                .unwrap_or(0),
            capacity: self.capacity(),
        }
    }
}
