use std::{collections::HashSet, sync::Arc};

use crate::geometry::{Transform, AABB};

use super::{blas::BottomLevelBvh, bvh2::Bvh2};

/// Instance as seen by traversal: a shared bottom level plus its placement.
#[derive(Debug, Clone)]
pub struct CommittedInstance {
    pub inst_id: u32,
    pub geom_id: u32,
    pub blas: Arc<BottomLevelBvh>,
    pub transform: Transform,
    pub world_bounds: AABB,
}

impl CommittedInstance {
    pub fn new(inst_id: u32, geom_id: u32, blas: Arc<BottomLevelBvh>, transform: Transform) -> Self {
        let world_bounds = blas.bounds.transform_aabb(transform.forward());
        CommittedInstance {
            inst_id,
            geom_id,
            blas,
            transform,
            world_bounds,
        }
    }
}

/// Scene-wide hierarchy; leaves reference entries of `CommittedScene::instances`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopLevelBvh {
    pub bvh: Bvh2,
}

impl TopLevelBvh {
    pub fn build(instances: &[CommittedInstance]) -> TopLevelBvh {
        let boxes: Vec<AABB> = instances.iter().map(|i| i.world_bounds).collect();
        TopLevelBvh {
            bvh: Bvh2::build(&boxes),
        }
    }

    /// Same topology, boxes recomputed from the instances' current bounds
    pub fn refitted(&self, instances: &[CommittedInstance]) -> TopLevelBvh {
        let boxes: Vec<AABB> = instances.iter().map(|i| i.world_bounds).collect();
        let mut bvh = self.bvh.clone();
        bvh.refit(&boxes);
        TopLevelBvh { bvh }
    }
}

/// Immutable, query-ready snapshot produced by `CommitScene`. Held behind an
/// `Arc` so a new commit can replace it without disturbing readers.
#[derive(Debug, Clone, Default)]
pub struct CommittedScene {
    pub instances: Vec<CommittedInstance>,
    pub tlas: TopLevelBvh,
}

impl CommittedScene {
    pub fn new(instances: Vec<CommittedInstance>) -> Self {
        let tlas = TopLevelBvh::build(&instances);
        CommittedScene { instances, tlas }
    }

    pub fn bounds(&self) -> AABB {
        self.tlas.bvh.bounds()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Distinct bottom levels with their geometry ids, in first-use order
    pub fn unique_blases(&self) -> Vec<(u32, &Arc<BottomLevelBvh>)> {
        let mut seen = HashSet::new();
        self.instances
            .iter()
            .filter(|inst| seen.insert(inst.geom_id))
            .map(|inst| (inst.geom_id, &inst.blas))
            .collect()
    }

    /// Copy with one instance moved and the top level refitted
    pub fn with_instance_transform(&self, inst_index: usize, transform: Transform) -> Option<CommittedScene> {
        let mut instances = self.instances.clone();
        let inst = instances.get_mut(inst_index)?;
        *inst = CommittedInstance::new(inst.inst_id, inst.geom_id, inst.blas.clone(), transform);
        let tlas = self.tlas.refitted(&instances);
        Some(CommittedScene { instances, tlas })
    }
}
