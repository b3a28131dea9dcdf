//! Backend-agnostic core of the ray caster: math, the mesh store, the
//! two-level BVH build pipeline, the `AccelerationStructure` facade and the
//! primary-ray kernel.

pub mod accel;
pub mod geometry;
pub mod ids;
pub mod kernel;
pub mod scene;
pub mod settings;

pub use accel::{AccelError, AccelStats, AccelerationStructure, HitRecord, SceneState};
pub use ids::INVALID_ID;
pub use kernel::RayTracer;
