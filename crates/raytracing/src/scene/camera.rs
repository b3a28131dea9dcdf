use crate::geometry::{Matrix4x4, Vec3, AABB};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraType {
    Orthographic {
        screen_space_height: f32,
    },
    Perspective {
        yfov: f32, // radians
    },
}

/// Look-at camera; produces the inverse view-projection matrix consumed by
/// the ray-cast kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub camera_type: CameraType,
    pub near_clip: f32,
    pub far_clip: f32,
}

const DEFAULT_FAR_CLIP: f32 = 1000.0;
const DEFAULT_NEAR_CLIP: f32 = 0.01;

impl Camera {
    pub fn lookat_perspective(position: Vec3, target: Vec3, up: Vec3, yfov: f32) -> Camera {
        Camera {
            position,
            target,
            up,
            camera_type: CameraType::Perspective { yfov },
            near_clip: DEFAULT_NEAR_CLIP,
            far_clip: DEFAULT_FAR_CLIP,
        }
    }

    pub fn lookat_orthographic(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        screen_space_height: f32,
        near_clip: f32,
        far_clip: f32,
    ) -> Camera {
        Camera {
            position,
            target,
            up,
            camera_type: CameraType::Orthographic { screen_space_height },
            near_clip,
            far_clip,
        }
    }

    /// Perspective camera on the +Z side of `bounds`, far enough back to see
    /// all of it
    pub fn framing(bounds: AABB, yfov: f32) -> Camera {
        if bounds.is_empty() {
            return Camera::lookat_perspective(Vec3::zero(), Vec3(0.0, 0.0, -1.0), Vec3(0.0, 1.0, 0.0), yfov);
        }
        let center = bounds.centroid();
        let radius = (bounds.extent().length() * 0.5).max(1e-3);
        let distance = radius / (yfov * 0.5).sin();
        let mut camera = Camera::lookat_perspective(
            center + Vec3(0.0, 0.0, distance),
            center,
            Vec3(0.0, 1.0, 0.0),
            yfov,
        );
        camera.far_clip = (distance + radius) * 2.0;
        camera
    }

    pub fn view_matrix(&self) -> Matrix4x4 {
        Matrix4x4::look_at(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4x4 {
        match self.camera_type {
            CameraType::Perspective { yfov } => {
                Matrix4x4::perspective(yfov, aspect, self.near_clip, self.far_clip)
            }
            CameraType::Orthographic { screen_space_height } => {
                let h = screen_space_height / 2.0;
                let w = h * aspect;
                Matrix4x4::orthographic(-w, w, -h, h, self.near_clip, self.far_clip)
            }
        }
    }

    /// `None` for degenerate cameras (eye on target, up parallel to view)
    pub fn inv_proj_view(&self, width: u32, height: u32) -> Option<Matrix4x4> {
        let aspect = width as f32 / height as f32;
        Matrix4x4::matmul(self.projection_matrix(aspect), self.view_matrix()).invert()
    }
}
