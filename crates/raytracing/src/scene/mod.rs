mod camera;
mod description;
mod mesh_store;
pub mod test_scenes;

pub use camera::{Camera, CameraType};
pub use description::{InstanceData, LoadSummary, MeshData, SceneDescription};
pub use mesh_store::{MeshRecord, MeshStore, MeshStoreError, SceneCapacity};
