//! Binary BVH shared by both hierarchy levels. Nodes are laid out depth-first:
//! an internal node's left child directly follows it and `left_or_first`
//! holds the right child's index. Leaves reference a run of `count`
//! primitives starting at `left_or_first` in the build's primitive order.

use bytemuck::{Pod, Zeroable};

use crate::geometry::{Vec3, AABB};

pub const MAX_LEAF_SIZE: usize = 4;
const BIN_COUNT: usize = 16;
/// Below this depth splits are plain halvings, so a tree over 2^24
/// primitives stays within 56 levels.
pub const MAX_SAH_DEPTH: usize = 32;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub min: [f32; 3],
    pub left_or_first: u32,
    pub max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    fn new(bounds: AABB) -> BvhNode {
        BvhNode {
            min: bounds.minimum.into(),
            left_or_first: 0,
            max: bounds.maximum.into(),
            count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    pub fn bounds(&self) -> AABB {
        AABB::new(self.min.into(), self.max.into())
    }

    fn set_bounds(&mut self, bounds: AABB) {
        self.min = bounds.minimum.into();
        self.max = bounds.maximum.into();
    }
}

/// Output of a build. `prim_order[i]` is the caller's index of the i-th
/// primitive referenced by the leaves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bvh2 {
    pub nodes: Vec<BvhNode>,
    pub prim_order: Vec<u32>,
}

#[derive(Clone, Copy)]
struct BuildPrim {
    index: u32,
    bounds: AABB,
    centroid: Vec3,
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: AABB,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Bin { bounds: AABB::empty(), count: 0 }
    }
}

impl Bvh2 {
    /// Binned SAH build. Output depends only on the order and values of
    /// `prim_bounds`. Empty boxes are kept as primitives but never widen
    /// their parents.
    pub fn build(prim_bounds: &[AABB]) -> Bvh2 {
        let mut prims: Vec<BuildPrim> = prim_bounds
            .iter()
            .enumerate()
            .map(|(i, &bounds)| BuildPrim {
                index: i as u32,
                bounds,
                centroid: if bounds.is_empty() { Vec3::zero() } else { bounds.centroid() },
            })
            .collect();

        let mut nodes = Vec::with_capacity(2 * prims.len() / MAX_LEAF_SIZE + 1);
        if !prims.is_empty() {
            build_recursive(&mut prims, 0, 0, &mut nodes);
        }

        Bvh2 {
            nodes,
            prim_order: prims.iter().map(|p| p.index).collect(),
        }
    }

    pub fn bounds(&self) -> AABB {
        self.nodes.first().map(BvhNode::bounds).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        fn visit(nodes: &[BvhNode], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf() {
                1
            } else {
                1 + visit(nodes, idx + 1).max(visit(nodes, node.left_or_first as usize))
            }
        }
        if self.nodes.is_empty() { 0 } else { visit(&self.nodes, 0) }
    }

    /// Recomputes node boxes bottom-up for new primitive bounds (indexed like
    /// the build input) while keeping the topology.
    pub fn refit(&mut self, prim_bounds: &[AABB]) {
        // children always have larger indices than their parent
        for idx in (0..self.nodes.len()).rev() {
            let node = self.nodes[idx];
            let bounds = if node.is_leaf() {
                let first = node.left_or_first as usize;
                self.prim_order[first..first + node.count as usize]
                    .iter()
                    .fold(AABB::empty(), |acc, &p| AABB::surrounding_box(acc, prim_bounds[p as usize]))
            } else {
                AABB::surrounding_box(
                    self.nodes[idx + 1].bounds(),
                    self.nodes[node.left_or_first as usize].bounds(),
                )
            };
            self.nodes[idx].set_bounds(bounds);
        }
    }
}

fn build_recursive(prims: &mut [BuildPrim], first: usize, depth: usize, nodes: &mut Vec<BvhNode>) -> usize {
    let bounds = prims
        .iter()
        .fold(AABB::empty(), |acc, p| AABB::surrounding_box(acc, p.bounds));

    let node_idx = nodes.len();
    nodes.push(BvhNode::new(bounds));

    if prims.len() <= MAX_LEAF_SIZE {
        nodes[node_idx].left_or_first = first as u32;
        nodes[node_idx].count = prims.len() as u32;
        return node_idx;
    }

    let split = if depth < MAX_SAH_DEPTH { sah_split(prims) } else { None };
    let split = split.unwrap_or(prims.len() / 2);
    let (left, right) = prims.split_at_mut(split);

    build_recursive(left, first, depth + 1, nodes);
    let right_idx = build_recursive(right, first + split, depth + 1, nodes);
    nodes[node_idx].left_or_first = right_idx as u32;

    node_idx
}

/// Partitions `prims` (stably) at the cheapest bin boundary along the
/// longest centroid axis and returns the split position, or `None` when the
/// centroids cannot be separated.
fn sah_split(prims: &mut [BuildPrim]) -> Option<usize> {
    let centroid_bounds = prims
        .iter()
        .fold(AABB::empty(), |acc, p| acc.grow(p.centroid));
    let extent = centroid_bounds.extent();
    let axis = extent.max_axis();
    let axis_min = centroid_bounds.minimum[axis];
    let axis_extent = extent[axis];
    if axis_extent <= 0.0 || !axis_extent.is_finite() {
        return None;
    }

    let scale = BIN_COUNT as f32 / axis_extent;
    let bin_of = |p: &BuildPrim| {
        let b = ((p.centroid[axis] - axis_min) * scale) as usize;
        b.min(BIN_COUNT - 1)
    };

    let mut bins = [Bin::default(); BIN_COUNT];
    for p in prims.iter() {
        let bin = &mut bins[bin_of(p)];
        bin.bounds = AABB::surrounding_box(bin.bounds, p.bounds);
        bin.count += 1;
    }

    // sweep from the right to get suffix areas, then from the left
    let mut right_area = [0.0f32; BIN_COUNT];
    let mut right_count = [0usize; BIN_COUNT];
    let mut acc = Bin::default();
    for i in (1..BIN_COUNT).rev() {
        acc.bounds = AABB::surrounding_box(acc.bounds, bins[i].bounds);
        acc.count += bins[i].count;
        right_area[i] = acc.bounds.surface_area();
        right_count[i] = acc.count;
    }

    let mut best: Option<(usize, f32)> = None;
    let mut acc = Bin::default();
    for plane in 0..BIN_COUNT - 1 {
        acc.bounds = AABB::surrounding_box(acc.bounds, bins[plane].bounds);
        acc.count += bins[plane].count;
        if acc.count == 0 || right_count[plane + 1] == 0 {
            continue;
        }
        let cost = acc.bounds.surface_area() * acc.count as f32
            + right_area[plane + 1] * right_count[plane + 1] as f32;
        match best {
            Some((_, best_cost)) if best_cost <= cost => {}
            _ => best = Some((plane, cost)),
        }
    }

    let (plane, _) = best?;
    let (left, right): (Vec<BuildPrim>, Vec<BuildPrim>) =
        prims.iter().copied().partition(|p| bin_of(p) <= plane);
    let split = left.len();
    for (slot, p) in prims.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = p;
    }
    Some(split)
}
