use raytracing::{
    accel::{intersect_triangle, BottomLevelBvh, CommittedScene, HitRecord, Ray},
    geometry::Vec3,
};

// builds stop using SAH at MAX_SAH_DEPTH, which keeps every tree under 64 levels
const STACK_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct TriangleHit {
    t: f32,
    prim_id: u32,
    u: f32,
    v: f32,
}

// Nearest (or any, if early_exit is set) triangle of one bottom level with
// t in [ray.t_min, t_max). The ray is in the instance's object space.
fn traverse_blas(blas: &BottomLevelBvh, ray: &Ray, t_max: f32, early_exit: bool) -> Option<TriangleHit> {
    let nodes = blas.nodes();
    if nodes.is_empty() {
        return None;
    }

    let inv_dir = ray.inv_direction();
    let mut closest_t = t_max;
    let mut hit: Option<TriangleHit> = None;

    let mut stack: Vec<u32> = Vec::with_capacity(STACK_CAPACITY);
    stack.push(0);

    while let Some(node_index) = stack.pop() {
        let node = &nodes[node_index as usize];
        if node.bounds().intersect(ray.origin, inv_dir, ray.t_min, closest_t).is_none() {
            continue;
        }

        if node.is_leaf() {
            let first = node.left_or_first as usize;
            for i in first..first + node.count as usize {
                let [p0, p1, p2] = blas.triangles[i];
                if let Some((t, u, v)) = intersect_triangle(ray, p0, p1, p2, closest_t) {
                    closest_t = t;
                    hit = Some(TriangleHit {
                        t,
                        prim_id: blas.prim_ids[i],
                        u,
                        v,
                    });
                    if early_exit {
                        return hit;
                    }
                }
            }
        } else {
            // left child is visited first
            stack.push(node.left_or_first);
            stack.push(node_index + 1);
        }
    }

    hit
}

/// Two-level traversal of a committed scene. Rays are moved into each
/// instance's object space without renormalizing, so `t` is shared by both
/// spaces.
pub(crate) fn traverse_scene(scene: &CommittedScene, ray: &Ray, early_exit: bool) -> Option<HitRecord> {
    let nodes = &scene.tlas.bvh.nodes;
    if nodes.is_empty() {
        return None;
    }

    let inv_dir: Vec3 = ray.inv_direction();
    let mut closest_t = ray.t_max;
    let mut hit: Option<HitRecord> = None;

    let mut stack: Vec<u32> = Vec::with_capacity(STACK_CAPACITY);
    stack.push(0);

    while let Some(node_index) = stack.pop() {
        let node = &nodes[node_index as usize];
        if node.bounds().intersect(ray.origin, inv_dir, ray.t_min, closest_t).is_none() {
            continue;
        }

        if !node.is_leaf() {
            stack.push(node.left_or_first);
            stack.push(node_index + 1);
            continue;
        }

        let first = node.left_or_first as usize;
        for &inst_index in &scene.tlas.bvh.prim_order[first..first + node.count as usize] {
            let instance = &scene.instances[inst_index as usize];
            let local_ray = Ray {
                origin: instance.transform.inverse_point(ray.origin),
                direction: instance.transform.inverse_vector(ray.direction),
                t_min: ray.t_min,
                t_max: closest_t,
            };

            let Some(tri) = traverse_blas(&instance.blas, &local_ray, closest_t, early_exit) else {
                continue;
            };
            closest_t = tri.t;
            hit = Some(HitRecord {
                t: tri.t,
                prim_id: tri.prim_id,
                inst_id: instance.inst_id,
                geom_id: instance.geom_id,
                coords: [tri.u, tri.v, 0.0, 0.0],
            });
            if early_exit {
                return hit;
            }
        }
    }

    hit
}
