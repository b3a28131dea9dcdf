use std::ops::Range;

use thiserror::Error;
use tracing::debug;

use crate::geometry::Vec4;

/// Limits declared when the scene is initialized. The mesh store never grows
/// past them; calls that would are rejected and leave existing data intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCapacity {
    pub max_meshes: u32,
    pub max_total_vertices: u32,
    pub max_total_primitives: u32,
    pub max_instances: u32,
}

impl Default for SceneCapacity {
    fn default() -> Self {
        SceneCapacity {
            max_meshes: 1 << 16,
            max_total_vertices: 1 << 24,
            max_total_primitives: 1 << 24,
            max_instances: 1 << 20,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshStoreError {
    #[error("mesh has no vertices")]
    EmptyVertices,
    #[error("index count {0} is not a multiple of 3")]
    NotTriangles(usize),
    #[error("index {index} out of range for mesh with {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{resource} capacity exceeded: {requested} requested, {capacity} available")]
    CapacityExceeded {
        resource: &'static str,
        requested: u64,
        capacity: u64,
    },
    #[error("unknown mesh id {0}")]
    UnknownMesh(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRecord {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
}

impl MeshRecord {
    pub fn vertex_range(&self) -> Range<usize> {
        self.vertex_offset as usize..(self.vertex_offset + self.vertex_count) as usize
    }

    pub fn index_range(&self) -> Range<usize> {
        self.index_offset as usize..(self.index_offset + self.index_count) as usize
    }

    pub fn primitive_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// Shared vertex/index storage for every loaded mesh. Data is copied in;
/// indices stay local to their mesh.
#[derive(Debug, Default)]
pub struct MeshStore {
    capacity: SceneCapacity,
    vertices: Vec<Vec4>,
    indices: Vec<u32>,
    records: Vec<MeshRecord>,
}

fn validate(vertices: &[Vec4], indices: &[u32]) -> Result<(), MeshStoreError> {
    if vertices.is_empty() {
        return Err(MeshStoreError::EmptyVertices);
    }
    if indices.len() % 3 != 0 {
        return Err(MeshStoreError::NotTriangles(indices.len()));
    }
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(MeshStoreError::IndexOutOfRange {
            index,
            vertex_count: vertices.len(),
        });
    }
    Ok(())
}

fn check_capacity(resource: &'static str, requested: u64, capacity: u32) -> Result<(), MeshStoreError> {
    if requested > capacity as u64 {
        return Err(MeshStoreError::CapacityExceeded {
            resource,
            requested,
            capacity: capacity as u64,
        });
    }
    Ok(())
}

impl MeshStore {
    pub fn new(capacity: SceneCapacity) -> Self {
        MeshStore {
            capacity,
            vertices: Vec::new(),
            indices: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn capacity(&self) -> SceneCapacity {
        self.capacity
    }

    pub fn mesh_count(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn total_vertices(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn total_primitives(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Appends a mesh and returns its dense id
    pub fn add_mesh(&mut self, vertices: &[Vec4], indices: &[u32]) -> Result<u32, MeshStoreError> {
        validate(vertices, indices)?;

        check_capacity("mesh", self.records.len() as u64 + 1, self.capacity.max_meshes)?;
        check_capacity(
            "vertex",
            self.vertices.len() as u64 + vertices.len() as u64,
            self.capacity.max_total_vertices,
        )?;
        check_capacity(
            "primitive",
            (self.indices.len() / 3) as u64 + (indices.len() / 3) as u64,
            self.capacity.max_total_primitives,
        )?;

        let record = MeshRecord {
            vertex_offset: self.vertices.len() as u32,
            vertex_count: vertices.len() as u32,
            index_offset: self.indices.len() as u32,
            index_count: indices.len() as u32,
        };
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);

        let id = self.records.len() as u32;
        self.records.push(record);
        debug!(
            "mesh {id}: {} vertices, {} triangles",
            record.vertex_count,
            record.primitive_count()
        );
        Ok(id)
    }

    /// Replaces the data of an existing mesh. The shared buffers are spliced
    /// so the capacity check only counts live data; other meshes keep their
    /// ids and have their offsets shifted.
    pub fn replace_mesh(
        &mut self,
        mesh_id: u32,
        vertices: &[Vec4],
        indices: &[u32],
    ) -> Result<(), MeshStoreError> {
        let old = *self
            .records
            .get(mesh_id as usize)
            .ok_or(MeshStoreError::UnknownMesh(mesh_id))?;
        validate(vertices, indices)?;

        check_capacity(
            "vertex",
            (self.vertices.len() - old.vertex_count as usize + vertices.len()) as u64,
            self.capacity.max_total_vertices,
        )?;
        check_capacity(
            "primitive",
            ((self.indices.len() - old.index_count as usize + indices.len()) / 3) as u64,
            self.capacity.max_total_primitives,
        )?;

        self.vertices
            .splice(old.vertex_range(), vertices.iter().copied());
        self.indices
            .splice(old.index_range(), indices.iter().copied());

        let vertex_delta = vertices.len() as i64 - old.vertex_count as i64;
        let index_delta = indices.len() as i64 - old.index_count as i64;
        for record in &mut self.records[mesh_id as usize + 1..] {
            record.vertex_offset = (record.vertex_offset as i64 + vertex_delta) as u32;
            record.index_offset = (record.index_offset as i64 + index_delta) as u32;
        }

        let record = &mut self.records[mesh_id as usize];
        record.vertex_count = vertices.len() as u32;
        record.index_count = indices.len() as u32;
        Ok(())
    }

    pub fn record(&self, mesh_id: u32) -> Option<&MeshRecord> {
        self.records.get(mesh_id as usize)
    }

    pub fn vertices(&self, mesh_id: u32) -> Option<&[Vec4]> {
        self.record(mesh_id).map(|r| &self.vertices[r.vertex_range()])
    }

    pub fn indices(&self, mesh_id: u32) -> Option<&[u32]> {
        self.record(mesh_id).map(|r| &self.indices[r.index_range()])
    }

    /// Drops every mesh; capacity is kept
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(z: f32) -> Vec<Vec4> {
        vec![
            Vec4(0.0, 0.0, z, 1.0),
            Vec4(1.0, 0.0, z, 1.0),
            Vec4(0.0, 1.0, z, 1.0),
        ]
    }

    #[test]
    fn ids_are_dense_and_local_indices_preserved() {
        let mut store = MeshStore::new(SceneCapacity::default());
        assert_eq!(store.add_mesh(&triangle(0.0), &[0, 1, 2]), Ok(0));
        assert_eq!(store.add_mesh(&triangle(1.0), &[2, 1, 0]), Ok(1));

        assert_eq!(store.indices(1), Some(&[2, 1, 0][..]));
        assert_eq!(store.vertices(1).map(|v| v[0].2), Some(1.0));
        assert_eq!(store.total_vertices(), 6);
        assert_eq!(store.total_primitives(), 2);
    }

    #[test]
    fn rejects_malformed_meshes() {
        let mut store = MeshStore::new(SceneCapacity::default());
        assert_eq!(store.add_mesh(&[], &[]), Err(MeshStoreError::EmptyVertices));
        assert_eq!(
            store.add_mesh(&triangle(0.0), &[0, 1]),
            Err(MeshStoreError::NotTriangles(2))
        );
        assert_eq!(
            store.add_mesh(&triangle(0.0), &[0, 1, 3]),
            Err(MeshStoreError::IndexOutOfRange { index: 3, vertex_count: 3 })
        );
        assert_eq!(store.mesh_count(), 0);
    }

    #[test]
    fn capacity_overflow_keeps_existing_data() {
        let mut store = MeshStore::new(SceneCapacity {
            max_total_vertices: 4,
            ..Default::default()
        });
        store.add_mesh(&triangle(0.0), &[0, 1, 2]).unwrap();
        let err = store.add_mesh(&triangle(1.0), &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, MeshStoreError::CapacityExceeded { resource: "vertex", .. }));

        assert_eq!(store.mesh_count(), 1);
        assert_eq!(store.vertices(0), Some(&triangle(0.0)[..]));
    }

    #[test]
    fn replace_shifts_following_meshes() {
        let mut store = MeshStore::new(SceneCapacity::default());
        store.add_mesh(&triangle(0.0), &[0, 1, 2]).unwrap();
        store.add_mesh(&triangle(2.0), &[0, 1, 2]).unwrap();

        let mut quad = triangle(5.0);
        quad.push(Vec4(1.0, 1.0, 5.0, 1.0));
        store.replace_mesh(0, &quad, &[0, 1, 2, 2, 1, 3]).unwrap();

        assert_eq!(store.vertices(0).map(<[Vec4]>::len), Some(4));
        assert_eq!(store.record(1).map(|r| r.vertex_offset), Some(4));
        assert_eq!(store.record(1).map(|r| r.index_offset), Some(6));
        assert_eq!(store.vertices(1), Some(&triangle(2.0)[..]));
        assert_eq!(store.total_primitives(), 3);

        assert_eq!(
            store.replace_mesh(7, &quad, &[0, 1, 2]),
            Err(MeshStoreError::UnknownMesh(7))
        );
    }
}
