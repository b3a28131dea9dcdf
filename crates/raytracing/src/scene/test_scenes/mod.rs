//! Small built-in scenes used by the CLI (`--scene-name`) and by the backend
//! test suites.

use crate::geometry::{Matrix4x4, Vec3, Vec4};

use super::{Camera, InstanceData, MeshData, SceneDescription};

pub fn triangle_mesh() -> MeshData {
    MeshData {
        name: "triangle".to_owned(),
        vertices: vec![
            Vec4(0.0, 0.0, -5.0, 1.0),
            Vec4(1.0, 0.0, -5.0, 1.0),
            Vec4(0.0, 1.0, -5.0, 1.0),
        ],
        indices: vec![0, 1, 2],
    }
}

/// Axis-aligned cube centered on the origin, 8 shared corners
#[rustfmt::skip]
pub fn cube_mesh(side_length: f32) -> MeshData {
    let h = side_length / 2.0;
    let vertices = vec![
        Vec4(-h, -h, -h, 1.0),
        Vec4( h, -h, -h, 1.0),
        Vec4( h,  h, -h, 1.0),
        Vec4(-h,  h, -h, 1.0),
        Vec4(-h, -h,  h, 1.0),
        Vec4( h, -h,  h, 1.0),
        Vec4( h,  h,  h, 1.0),
        Vec4(-h,  h,  h, 1.0),
    ];
    // counterclockwise seen from outside
    let indices = vec![
        0, 2, 1,  0, 3, 2, // -Z
        4, 5, 6,  4, 6, 7, // +Z
        0, 1, 5,  0, 5, 4, // -Y
        3, 6, 2,  3, 7, 6, // +Y
        0, 4, 7,  0, 7, 3, // -X
        1, 2, 6,  1, 6, 5, // +X
    ];
    MeshData { name: "cube".to_owned(), vertices, indices }
}

/// Square pyramid with its base on y = 0
#[rustfmt::skip]
pub fn pyramid_mesh() -> MeshData {
    let vertices = vec![
        Vec4(-0.5, 0.0, -0.5, 1.0),
        Vec4( 0.5, 0.0, -0.5, 1.0),
        Vec4( 0.5, 0.0,  0.5, 1.0),
        Vec4(-0.5, 0.0,  0.5, 1.0),
        Vec4( 0.0, 1.0,  0.0, 1.0),
    ];
    let indices = vec![
        0, 1, 2,  0, 2, 3,
        0, 4, 1,  1, 4, 2,
        2, 4, 3,  3, 4, 0,
    ];
    MeshData { name: "pyramid".to_owned(), vertices, indices }
}

// one triangle at z = -5 seen through an orthographic camera whose NDC
// depth 0 lies on the triangle's plane
pub fn single_triangle_scene() -> SceneDescription {
    SceneDescription {
        meshes: vec![triangle_mesh()],
        instances: vec![InstanceData {
            mesh: 0,
            transform: Matrix4x4::identity(),
        }],
        camera: Camera::lookat_orthographic(
            Vec3::zero(),
            Vec3(0.0, 0.0, -1.0),
            Vec3(0.0, 1.0, 0.0),
            2.0,
            0.0,
            10.0,
        ),
    }
}

/// Two instances of one unit cube at x = -2 and x = +2, z = -6
pub fn two_cubes_scene() -> SceneDescription {
    let instances = [-2.0, 2.0]
        .into_iter()
        .map(|x| InstanceData {
            mesh: 0,
            transform: Matrix4x4::translation(Vec3(x, 0.0, -6.0)),
        })
        .collect();

    SceneDescription {
        meshes: vec![cube_mesh(1.0)],
        instances,
        camera: Camera::lookat_perspective(
            Vec3::zero(),
            Vec3(0.0, 0.0, -6.0),
            Vec3(0.0, 1.0, 0.0),
            60f32.to_radians(),
        ),
    }
}

/// 8x8 grid alternating cubes and pyramids, each rotated differently
pub fn instanced_grid_scene() -> SceneDescription {
    const GRID: usize = 8;
    let mut instances = Vec::with_capacity(GRID * GRID);
    for row in 0..GRID {
        for col in 0..GRID {
            let x = (col as f32 - (GRID - 1) as f32 / 2.0) * 1.5;
            let z = (row as f32 - (GRID - 1) as f32 / 2.0) * 1.5;
            let rotation = Matrix4x4::rotation_y((row * GRID + col) as f32 * 0.3);
            let transform = Matrix4x4::matmul(Matrix4x4::translation(Vec3(x, 0.0, z)), rotation);
            instances.push(InstanceData {
                mesh: (row + col) % 2,
                transform,
            });
        }
    }

    SceneDescription {
        meshes: vec![cube_mesh(0.8), pyramid_mesh()],
        instances,
        camera: Camera::lookat_perspective(
            Vec3(0.0, 9.0, 12.0),
            Vec3::zero(),
            Vec3(0.0, 1.0, 0.0),
            45f32.to_radians(),
        ),
    }
}

pub struct TestScene {
    pub name: &'static str,
    pub scene_func: fn() -> SceneDescription,
}

pub const fn all_test_scenes() -> &'static [TestScene] {
    &[
        TestScene {
            name: "single_triangle",
            scene_func: single_triangle_scene,
        },
        TestScene {
            name: "two_cubes",
            scene_func: two_cubes_scene,
        },
        TestScene {
            name: "instanced_grid",
            scene_func: instanced_grid_scene,
        },
    ]
}

pub fn find_test_scene(name: &str) -> Option<&'static TestScene> {
    all_test_scenes().iter().find(|s| s.name == name)
}
