mod aabb;
mod matrix4x4;
mod transform;
mod vec3;
mod vec4;

pub use aabb::AABB;
pub use matrix4x4::Matrix4x4;
pub use transform::Transform;
pub use vec3::Vec3;
pub use vec4::Vec4;
