use bitflags::bitflags;
use glam::{Mat4, Quat, Vec2, Vec3};

use crate::math::Frustum;

bitflags! {
    /// Per-camera overrides of global rendering settings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CameraOverrideFlags: u8 {
        const LOW_MATERIAL_QUALITY = 1 << 0;
        const DISABLE_SHADOWS = 1 << 1;
    }
}

/// Viewing camera; also used for shadow-casting sub-cameras. Looks down −Z
/// in local space, right-handed, wgpu depth range 0..1.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub orthographic: bool,
    pub ortho_size: Vec2,
    pub zoom: f32,
    pub view_mask: u32,
    pub override_flags: CameraOverrideFlags,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: 45_f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
            orthographic: false,
            ortho_size: Vec2::splat(10.0),
            zoom: 1.0,
            view_mask: !0,
            override_flags: CameraOverrideFlags::empty(),
        }
    }
}

impl Camera {
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn frustum(&self) -> Frustum {
        self.split_frustum(self.near, self.far)
    }

    /// Frustum covering only the `[near, far]` sub-range of the view depth,
    /// clamped to the camera's own clip planes.
    pub fn split_frustum(&self, near: f32, far: f32) -> Frustum {
        let near = near.clamp(self.near, self.far);
        let far = far.clamp(near, self.far);
        let world = self.world_matrix();
        if self.orthographic {
            Frustum::orthographic(self.ortho_size, self.zoom, near, far, &world)
        } else {
            Frustum::perspective(self.fov_y, self.aspect, self.zoom, near, far, &world)
        }
    }

    /// GPU projection matrix (depth 0..1). Zoom scales the projection plane.
    pub fn projection_matrix(&self) -> Mat4 {
        if self.orthographic {
            let half = self.ortho_size * 0.5 / self.zoom;
            Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, self.near, self.far)
        } else {
            let mut projection =
                Mat4::perspective_rh(self.fov_y, self.aspect, self.near.max(1.0e-4), self.far);
            projection.x_axis.x *= self.zoom;
            projection.y_axis.y *= self.zoom;
            projection
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_frustum_is_clamped_to_clip_planes() {
        let camera = Camera {
            near: 1.0,
            far: 50.0,
            ..Camera::default()
        };

        let full = camera.frustum().bounding_box();
        let clamped = camera.split_frustum(0.0, 500.0).bounding_box();
        assert!(full.min.abs_diff_eq(clamped.min, 1e-4));
        assert!(full.max.abs_diff_eq(clamped.max, 1e-4));
    }

    #[test]
    fn view_projection_maps_forward_point_into_clip_space() {
        let camera = Camera {
            position: Vec3::new(0.0, 2.0, 5.0),
            ..Camera::default()
        };

        let world_point = camera.position + camera.forward() * 10.0;
        let clip = camera.view_projection_matrix() * world_point.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn zoom_narrows_the_frustum() {
        let wide = Camera::default();
        let zoomed = Camera {
            zoom: 2.0,
            ..Camera::default()
        };

        let wide_box = wide.frustum().bounding_box();
        let zoomed_box = zoomed.frustum().bounding_box();
        assert!(zoomed_box.size().x < wide_box.size().x);
    }
}
