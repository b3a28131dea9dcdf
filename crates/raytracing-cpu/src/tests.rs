use approx::assert_abs_diff_eq;
use rand::{Rng, SeedableRng, rngs::StdRng};
use raytracing::{
    AccelerationStructure, HitRecord, INVALID_ID, SceneState,
    accel::{AccelError, Ray, intersect_triangle},
    geometry::{Matrix4x4, Vec3, Vec4},
    kernel::{PALETTE, RayTracer, eye_ray, palette_color},
    scene::{SceneCapacity, SceneDescription, test_scenes},
};

use crate::{CpuAccelerationStructure, CpuBackendSettings};

fn load(description: &SceneDescription) -> CpuAccelerationStructure {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity::default());
    description
        .load_into(&mut accel)
        .expect("builtin scene should commit");
    accel
}

fn tracer_for(description: &SceneDescription, width: u32, height: u32) -> RayTracer {
    let mut tracer = RayTracer::new(width, height);
    let inv = description
        .camera
        .inv_proj_view(width, height)
        .expect("camera should be invertible");
    tracer.update_view(description.camera.position, &inv);
    tracer
}

fn ray(origin: Vec3, direction: Vec3) -> (Vec4, Vec4) {
    (Vec4::from_vec3(origin, 0.0), Vec4::from_vec3(direction, f32::MAX))
}

fn random_rays(n: usize, seed: u64) -> Vec<(Vec4, Vec4)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let origin = Vec3(
                rng.random_range(-8.0..8.0),
                rng.random_range(-4.0..8.0),
                rng.random_range(-2.0..14.0),
            );
            let target = Vec3(
                rng.random_range(-6.0..6.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-8.0..6.0),
            );
            ray(origin, (target - origin).unit())
        })
        .collect()
}

// nearest hit by testing every triangle of every instance
fn brute_force(description: &SceneDescription, origin_and_tmin: Vec4, direction_and_tmax: Vec4) -> Option<(f32, u32)> {
    let world_ray = Ray::from_packed(origin_and_tmin, direction_and_tmax);
    let mut best: Option<(f32, u32)> = None;
    for (inst_id, inst) in description.instances.iter().enumerate() {
        let inverse = inst.transform.invert().unwrap();
        let local = Ray {
            origin: inverse.apply_affine_point(world_ray.origin),
            direction: inverse.apply_vector(world_ray.direction),
            ..world_ray
        };
        let mesh = &description.meshes[inst.mesh];
        for tri in mesh.indices.chunks_exact(3) {
            let p = |i: u32| mesh.vertices[i as usize].xyz();
            let t_max = best.map_or(f32::MAX, |(t, _)| t);
            if let Some((t, _, _)) = intersect_triangle(&local, p(tri[0]), p(tri[1]), p(tri[2]), t_max) {
                best = Some((t, inst_id as u32));
            }
        }
    }
    best
}

#[test]
fn single_triangle_end_to_end() {
    let description = test_scenes::single_triangle_scene();
    let accel = load(&description);
    assert_eq!(accel.state(), SceneState::Ready);

    let width = 100;
    let height = 100;
    let inv = description.camera.inv_proj_view(width, height).unwrap();
    let cam = description.camera.position;

    // pixel 59.5 maps to NDC 0.2
    let (origin, direction) = eye_ray(59.5, 59.5, width, height, cam, &inv);
    let hit = accel.ray_query_nearest_hit(origin, direction);
    assert_eq!(hit.geom_id, 0);
    assert_eq!(hit.inst_id, 0);
    assert_eq!(hit.prim_id, 0);
    assert_abs_diff_eq!(hit.t, 5.0, epsilon = 0.01);
    assert_abs_diff_eq!(hit.coords[0], 0.2, epsilon = 1e-4);
    assert_abs_diff_eq!(hit.coords[1], 0.2, epsilon = 1e-4);

    // pixel 99 maps to NDC 0.99
    let (origin, direction) = eye_ray(99.0, 99.0, width, height, cam, &inv);
    let miss = accel.ray_query_nearest_hit(origin, direction);
    assert_eq!(miss, HitRecord::miss());
    assert_eq!(miss.t, f32::MAX);
    assert!(!accel.ray_query_any_hit(origin, direction));
}

#[test]
fn miss_exactly_when_no_triangle_is_hit() {
    for description in [test_scenes::two_cubes_scene(), test_scenes::instanced_grid_scene()] {
        let accel = load(&description);
        for (origin, direction) in random_rays(2000, 42) {
            let hit = accel.ray_query_nearest_hit(origin, direction);
            match brute_force(&description, origin, direction) {
                None => assert_eq!(hit, HitRecord::miss()),
                Some((t, inst_id)) => {
                    assert!(hit.is_hit());
                    assert_abs_diff_eq!(hit.t, t, epsilon = 1e-4);
                    // instances in these scenes never touch, so no ties
                    assert_eq!(hit.inst_id, inst_id);
                }
            }
        }
    }
}

#[test]
fn any_hit_agrees_with_nearest_hit() {
    let accel = load(&test_scenes::instanced_grid_scene());
    for (origin, direction) in random_rays(1000, 3) {
        let nearest = accel.ray_query_nearest_hit(origin, direction);
        assert_eq!(accel.ray_query_any_hit(origin, direction), nearest.is_hit());
    }
}

#[test]
fn repeated_commit_gives_identical_results() {
    let mut accel = load(&test_scenes::instanced_grid_scene());
    let rays = random_rays(500, 9);
    let before: Vec<HitRecord> = rays.iter().map(|&(o, d)| accel.ray_query_nearest_hit(o, d)).collect();

    accel.commit_scene().unwrap();
    let after: Vec<HitRecord> = rays.iter().map(|&(o, d)| accel.ray_query_nearest_hit(o, d)).collect();
    assert_eq!(before, after);
}

#[test]
fn rebuilds_from_identical_input_are_deterministic() {
    let description = test_scenes::instanced_grid_scene();
    let rays = random_rays(1000, 1234);

    let runs: Vec<Vec<HitRecord>> = (0..3)
        .map(|_| {
            let accel = load(&description);
            accel.ray_query_nearest_hit_batch(&rays).unwrap()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn instances_of_one_mesh_hit_independently() {
    let accel = load(&test_scenes::two_cubes_scene());

    let (o, d) = ray(Vec3(-2.0, 0.0, 0.0), Vec3(0.0, 0.0, -1.0));
    let left = accel.ray_query_nearest_hit(o, d);
    assert_eq!(left.inst_id, 0);
    assert_eq!(left.geom_id, 0);
    assert_abs_diff_eq!(left.t, 5.5, epsilon = 1e-5);

    let (o, d) = ray(Vec3(2.0, 0.25, 0.0), Vec3(0.0, 0.0, -1.0));
    let right = accel.ray_query_nearest_hit(o, d);
    assert_eq!(right.inst_id, 1);
    assert_eq!(right.geom_id, 0);
    assert_abs_diff_eq!(right.t, 5.5, epsilon = 1e-5);

    // between the cubes
    let (o, d) = ray(Vec3::zero(), Vec3(0.0, 0.0, -1.0));
    assert!(accel.ray_query_nearest_hit(o, d).is_miss());

    // along the row, only the nearer cube counts
    let (o, d) = ray(Vec3(-10.0, 0.1, -6.0), Vec3(1.0, 0.0, 0.0));
    let side = accel.ray_query_nearest_hit(o, d);
    assert_eq!(side.inst_id, 0);
    assert_abs_diff_eq!(side.t, 7.5, epsilon = 1e-5);

    // starting past the first cube skips it
    let (mut o, d) = ray(Vec3(-10.0, 0.1, -6.0), Vec3(1.0, 0.0, 0.0));
    o.3 = 9.0;
    let far = accel.ray_query_nearest_hit(o, d);
    assert_eq!(far.inst_id, 1);
    assert_abs_diff_eq!(far.t, 11.5, epsilon = 1e-5);
}

#[test]
fn colors_follow_palette() {
    let description = test_scenes::two_cubes_scene();
    let accel = load(&description);
    let tracer = tracer_for(&description, 48, 32);

    let colors = crate::render(&accel, &tracer, CpuBackendSettings { num_threads: 4 });
    for y in 0..tracer.height() {
        for x in 0..tracer.width() {
            let hit = tracer.trace_pixel(&accel, x, y);
            let color = colors[(y * tracer.width() + x) as usize];
            assert_eq!(color, palette_color(hit.inst_id));
            if hit.is_miss() {
                assert_eq!(color, PALETTE[15]);
            }
        }
    }
    assert!(colors.contains(&PALETTE[0]));
    assert!(colors.contains(&PALETTE[1]));
    assert!(colors.contains(&PALETTE[15]));
}

#[test]
fn parallel_render_matches_sequential() {
    let description = test_scenes::instanced_grid_scene();
    let accel = load(&description);
    let tracer = tracer_for(&description, 64, 40);

    let sequential = tracer.render_sequential(&accel);
    let parallel = crate::render(&accel, &tracer, CpuBackendSettings::default());
    assert_eq!(sequential, parallel);
}

#[test]
fn capacity_overflow_keeps_prior_mesh_queryable() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity {
        max_total_vertices: 3,
        ..Default::default()
    });
    let triangle = test_scenes::triangle_mesh();
    let cube = test_scenes::cube_mesh(1.0);

    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    assert_eq!(geom, 0);
    assert_eq!(accel.add_geom_triangles4f(&cube.vertices, &cube.indices), INVALID_ID);
    assert_eq!(accel.stats().geometry_count, 1);

    assert_eq!(accel.add_instance(geom, &Matrix4x4::identity()), 0);
    accel.commit_scene().unwrap();

    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    let hit = accel.ray_query_nearest_hit(o, d);
    assert_eq!(hit.geom_id, 0);
    assert_abs_diff_eq!(hit.t, 5.0, epsilon = 1e-5);
}

#[test]
fn mesh_count_limit_rejects_extra_meshes() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity {
        max_meshes: 1,
        ..Default::default()
    });
    let triangle = test_scenes::triangle_mesh();

    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    assert_eq!(geom, 0);
    assert_eq!(accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices), INVALID_ID);
    assert_eq!(accel.stats().geometry_count, 1);
    assert_eq!(accel.add_instance(1, &Matrix4x4::identity()), INVALID_ID);

    assert_eq!(accel.add_instance(geom, &Matrix4x4::identity()), 0);
    accel.commit_scene().unwrap();
    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert_eq!(accel.ray_query_nearest_hit(o, d).geom_id, 0);
}

#[test]
fn primitive_limit_rejects_meshes_that_would_overflow() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity {
        max_total_primitives: 1,
        ..Default::default()
    });
    let triangle = test_scenes::triangle_mesh();
    let cube = test_scenes::cube_mesh(1.0);

    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    assert_eq!(geom, 0);
    assert_eq!(accel.add_geom_triangles4f(&cube.vertices, &cube.indices), INVALID_ID);
    assert_eq!(accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices), INVALID_ID);

    let stats = accel.stats();
    assert_eq!(stats.geometry_count, 1);
    assert_eq!(stats.total_primitives, 1);
    assert_eq!(stats.total_vertices, 3);

    accel.add_instance(geom, &Matrix4x4::identity());
    accel.commit_scene().unwrap();
    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert_abs_diff_eq!(accel.ray_query_nearest_hit(o, d).t, 5.0, epsilon = 1e-5);
}

#[test]
fn instance_limit_rejects_extra_instances() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity {
        max_instances: 2,
        ..Default::default()
    });
    let triangle = test_scenes::triangle_mesh();
    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    let left = Matrix4x4::translation(Vec3(-4.0, 0.0, 0.0));
    let right = Matrix4x4::translation(Vec3(4.0, 0.0, 0.0));

    assert_eq!(accel.add_instance(geom, &Matrix4x4::identity()), 0);
    assert_eq!(accel.add_instance(geom, &left), 1);
    assert_eq!(accel.add_instance(geom, &right), INVALID_ID);
    assert_eq!(accel.stats().instance_count, 2);
    accel.commit_scene().unwrap();

    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert_eq!(accel.ray_query_nearest_hit(o, d).inst_id, 0);
    let (o, d) = ray(Vec3(-3.8, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert_eq!(accel.ray_query_nearest_hit(o, d).inst_id, 1);
    let (o, d) = ray(Vec3(4.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert!(accel.ray_query_nearest_hit(o, d).is_miss());

    // ClearScene frees the slots again
    accel.clear_scene();
    assert_eq!(accel.add_instance(geom, &right), 0);
    assert_eq!(accel.add_instance(geom, &left), 1);
}

#[test]
fn queries_outside_ready_state_miss() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity::default());
    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));
    assert!(accel.ray_query_nearest_hit(o, d).is_miss());

    let triangle = test_scenes::triangle_mesh();
    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    accel.add_instance(geom, &Matrix4x4::identity());
    assert_eq!(accel.state(), SceneState::InstancesStaged);
    assert!(accel.ray_query_nearest_hit(o, d).is_miss());

    accel.commit_scene().unwrap();
    assert!(accel.ray_query_nearest_hit(o, d).is_hit());

    accel.clear_scene();
    assert_eq!(accel.ray_query_nearest_hit(o, d), HitRecord::miss());
    assert!(!accel.ray_query_any_hit(o, d));
    assert!(matches!(accel.commit_scene(), Err(AccelError::EmptyScene)));

    // instance ids restart from zero after ClearScene
    assert_eq!(accel.add_instance(geom, &Matrix4x4::identity()), 0);
    assert_eq!(accel.add_instance(geom, &Matrix4x4::translation(Vec3(4.0, 0.0, 0.0))), 1);
    accel.commit_scene().unwrap();
    accel.clear_geom();
    assert!(accel.ray_query_nearest_hit(o, d).is_miss());
    assert!(matches!(
        accel.commit_scene(),
        Err(AccelError::DanglingGeometry { .. })
    ));
}

#[test]
fn updates_take_effect() {
    let mut accel = CpuAccelerationStructure::new(SceneCapacity::default());
    let triangle = test_scenes::triangle_mesh();
    let geom = accel.add_geom_triangles4f(&triangle.vertices, &triangle.indices);
    let inst = accel.add_instance(geom, &Matrix4x4::identity());
    accel.commit_scene().unwrap();

    let (o, d) = ray(Vec3(0.2, 0.2, 0.0), Vec3(0.0, 0.0, -1.0));

    // instance moves are refitted immediately
    accel
        .update_instance(inst, &Matrix4x4::translation(Vec3(0.0, 0.0, 2.0)))
        .unwrap();
    assert_eq!(accel.state(), SceneState::Ready);
    assert_abs_diff_eq!(accel.ray_query_nearest_hit(o, d).t, 3.0, epsilon = 1e-5);

    // geometry replacement is picked up by the next commit
    let pushed: Vec<Vec4> = triangle
        .vertices
        .iter()
        .map(|v| Vec4(v.0, v.1, -9.0, 1.0))
        .collect();
    accel.update_geom_triangles4f(geom, &pushed, &triangle.indices).unwrap();
    assert_abs_diff_eq!(accel.ray_query_nearest_hit(o, d).t, 3.0, epsilon = 1e-5);
    accel.commit_scene().unwrap();
    assert_abs_diff_eq!(accel.ray_query_nearest_hit(o, d).t, 7.0, epsilon = 1e-5);

    assert!(matches!(
        accel.update_instance(inst, &Matrix4x4::scale(Vec3(0.0, 1.0, 1.0))),
        Err(AccelError::SingularTransform)
    ));
}

#[test]
fn tmin_and_tmax_bound_the_query() {
    let accel = load(&test_scenes::single_triangle_scene());
    let direction = Vec4(0.0, 0.0, -1.0, 5.0);
    // t == tmax is excluded
    assert!(accel.ray_query_nearest_hit(Vec4(0.2, 0.2, 0.0, 0.0), direction).is_miss());

    let direction = Vec4(0.0, 0.0, -1.0, 6.0);
    assert!(accel.ray_query_nearest_hit(Vec4(0.2, 0.2, 0.0, 0.0), direction).is_hit());
    assert!(accel.ray_query_nearest_hit(Vec4(0.2, 0.2, 0.0, 5.5), direction).is_miss());
}
