use std::{collections::HashMap, path::Path};

use anyhow::{Context, anyhow};
use raytracing::{
    geometry::{AABB, Matrix4x4, Vec3, Vec4},
    scene::{Camera, InstanceData, MeshData, SceneDescription},
};
use tracing::{info, warn};

const DEFAULT_YFOV: f32 = std::f32::consts::FRAC_PI_3;

// glTF matrices are column-major
fn node_matrix(node: &gltf::Node) -> Matrix4x4 {
    Matrix4x4 {
        data: node.transform().matrix(),
    }
    .transposed()
}

fn camera_from_node(camera: &gltf::Camera, world: &Matrix4x4) -> Camera {
    let position = world.apply_affine_point(Vec3::zero());
    let forward = world.apply_vector(Vec3(0.0, 0.0, -1.0));
    let up = world.apply_vector(Vec3(0.0, 1.0, 0.0));

    match camera.projection() {
        gltf::camera::Projection::Perspective(p) => {
            let mut c = Camera::lookat_perspective(position, position + forward, up, p.yfov());
            c.near_clip = p.znear();
            if let Some(far) = p.zfar() {
                c.far_clip = far;
            }
            c
        }
        gltf::camera::Projection::Orthographic(o) => Camera::lookat_orthographic(
            position,
            position + forward,
            up,
            2.0 * o.ymag(),
            o.znear(),
            o.zfar(),
        ),
    }
}

struct Loader<'a> {
    buffers: &'a [gltf::buffer::Data],
    meshes: Vec<MeshData>,
    // glTF mesh index -> our mesh indices, one per triangle primitive
    mesh_map: HashMap<usize, Vec<usize>>,
    instances: Vec<InstanceData>,
    camera: Option<Camera>,
}

impl Loader<'_> {
    fn load_mesh(&mut self, mesh: &gltf::Mesh) -> Vec<usize> {
        if let Some(loaded) = self.mesh_map.get(&mesh.index()) {
            return loaded.clone();
        }

        let buffers = self.buffers;
        let mut loaded = Vec::new();
        let mesh_name = mesh.name().unwrap_or("unnamed");
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!("skipping non-triangle primitive of mesh '{mesh_name}'");
                continue;
            }
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()][..]));
            let Some(positions) = reader.read_positions() else {
                warn!("skipping primitive without positions in mesh '{mesh_name}'");
                continue;
            };
            let vertices: Vec<Vec4> = positions.map(|p| Vec4::point(p.into())).collect();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };

            loaded.push(self.meshes.len());
            self.meshes.push(MeshData {
                name: format!("{mesh_name}#{}", primitive.index()),
                vertices,
                indices,
            });
        }

        self.mesh_map.insert(mesh.index(), loaded.clone());
        loaded
    }

    fn visit(&mut self, node: gltf::Node, parent: &Matrix4x4) {
        let world = Matrix4x4::matmul(*parent, node_matrix(&node));

        if let Some(mesh) = node.mesh() {
            for mesh_index in self.load_mesh(&mesh) {
                self.instances.push(InstanceData {
                    mesh: mesh_index,
                    transform: world,
                });
            }
        }
        if self.camera.is_none() {
            if let Some(camera) = node.camera() {
                self.camera = Some(camera_from_node(&camera, &world));
            }
        }

        for child in node.children() {
            self.visit(child, &world);
        }
    }
}

/// Flattens the default scene of a glTF file into meshes and world-space
/// instances. Nodes sharing a glTF mesh share the loaded meshes.
pub fn load_gltf(path: &Path) -> anyhow::Result<SceneDescription> {
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("failed to import {}", path.display()))?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("{} contains no scenes", path.display()))?;

    let mut loader = Loader {
        buffers: &buffers,
        meshes: Vec::new(),
        mesh_map: HashMap::new(),
        instances: Vec::new(),
        camera: None,
    };
    for node in scene.nodes() {
        loader.visit(node, &Matrix4x4::identity());
    }

    let found_camera = loader.camera;
    let mut description = SceneDescription {
        meshes: loader.meshes,
        instances: loader.instances,
        camera: found_camera.unwrap_or_else(|| Camera::framing(AABB::empty(), DEFAULT_YFOV)),
    };
    if found_camera.is_none() {
        info!("no camera in {}, framing scene bounds", path.display());
        description.camera = Camera::framing(description.bounds(), DEFAULT_YFOV);
    }

    info!(
        "loaded {}: {} meshes, {} instances, {} triangles",
        path.display(),
        description.meshes.len(),
        description.instances.len(),
        description.triangle_count()
    );
    Ok(description)
}
