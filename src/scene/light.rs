use glam::{Mat4, Quat, Vec3};

use crate::gfx::TextureHandle;
use crate::math::{BoundingBox, Frustum, EPSILON, LARGE_VALUE};

pub const MAX_CASCADE_SPLITS: usize = 4;
pub const MAX_CUBEMAP_FACES: usize = 6;
/// Upper bound of shadow splits any light type can request.
pub const MAX_LIGHT_SPLITS: usize = MAX_CUBEMAP_FACES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// Ranking class for per-drawable light accumulation. Importance strictly
/// dominates automatic ranking (see the penalty bands in the drawable
/// processor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightImportance {
    Important,
    Auto,
    NotImportant,
}

/// Directional cascade layout: split distances from the camera, plus the
/// fraction of the shadow range where cascades start fading out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeParameters {
    pub splits: [f32; MAX_CASCADE_SPLITS],
    pub fade_start: f32,
}

impl Default for CascadeParameters {
    fn default() -> Self {
        Self {
            splits: [10.0, 50.0, 200.0, 0.0],
            fade_start: 0.8,
        }
    }
}

impl CascadeParameters {
    pub fn new(splits: [f32; MAX_CASCADE_SPLITS]) -> Self {
        Self {
            splits,
            ..Self::default()
        }
    }

    pub fn shadow_range(&self) -> f32 {
        self.splits.iter().copied().fold(0.0, f32::max)
    }
}

/// Shadow camera focusing and stabilization parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusParameters {
    /// Clip the shadow frustum to visible lit geometry.
    pub focus: bool,
    /// Allow a non-square shadow camera; uniform size trades resolution for
    /// stability under camera rotation.
    pub non_uniform: bool,
    /// Quantization step for the shadow camera view size.
    pub quantize: f32,
    /// Lower bound of the quantized view size.
    pub min_view: f32,
}

impl Default for FocusParameters {
    fn default() -> Self {
        Self {
            focus: true,
            non_uniform: true,
            quantize: 0.5,
            min_view: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasParameters {
    pub constant_bias: f32,
    pub slope_scaled_bias: f32,
    pub normal_offset: f32,
}

impl Default for BiasParameters {
    fn default() -> Self {
        Self {
            constant_bias: 0.00025,
            slope_scaled_bias: 0.5,
            normal_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub position: Vec3,
    pub rotation: Quat,
    pub color: Vec3,
    pub brightness: f32,
    pub specular_intensity: f32,
    pub range: f32,
    /// Full vertical opening angle of a spot light, radians.
    pub fov: f32,
    pub aspect_ratio: f32,
    pub importance: LightImportance,
    pub cast_shadows: bool,
    pub num_shadow_splits: usize,
    pub cascade: CascadeParameters,
    pub focus: FocusParameters,
    pub bias: BiasParameters,
    /// Base darkness of shadows; 0 is fully dark, 1 disables shadowing.
    pub shadow_intensity: f32,
    pub shadow_fade_distance: f32,
    pub shadow_max_distance: f32,
    pub fade_distance: f32,
    pub draw_distance: f32,
    pub shadow_near_far_ratio: f32,
    pub shadow_max_extrusion: f32,
    pub cookie: Option<TextureHandle>,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            color: Vec3::ONE,
            brightness: 1.0,
            specular_intensity: 1.0,
            range: 10.0,
            fov: 30_f32.to_radians(),
            aspect_ratio: 1.0,
            importance: LightImportance::Auto,
            cast_shadows: false,
            num_shadow_splits: 1,
            cascade: CascadeParameters::default(),
            focus: FocusParameters::default(),
            bias: BiasParameters::default(),
            shadow_intensity: 0.0,
            shadow_fade_distance: 0.0,
            shadow_max_distance: 0.0,
            fade_distance: 0.0,
            draw_distance: 0.0,
            shadow_near_far_ratio: 0.002,
            shadow_max_extrusion: 1000.0,
            cookie: None,
        }
    }
}

impl Light {
    pub fn directional(rotation: Quat) -> Self {
        Self {
            light_type: LightType::Directional,
            rotation,
            ..Self::default()
        }
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            range,
            ..Self::default()
        }
    }

    pub fn spot(position: Vec3, rotation: Quat, range: f32, fov: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            rotation,
            range,
            fov,
            ..Self::default()
        }
    }

    pub fn effective_color(&self) -> Vec3 {
        self.color * self.brightness
    }

    /// Direction the light shines toward.
    pub fn direction(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Divisor for distance when ranking lights automatically; brighter
    /// lights tolerate larger distances before losing to closer ones.
    pub fn intensity_divisor(&self) -> f32 {
        let color = self.effective_color().abs();
        let luminance = color.x * 0.299 + color.y * 0.587 + color.z * 0.114;
        luminance.max(EPSILON)
    }

    pub fn spot_frustum(&self) -> Frustum {
        Frustum::perspective(
            self.fov,
            self.aspect_ratio,
            1.0,
            self.range * self.shadow_near_far_ratio.max(EPSILON),
            self.range.max(EPSILON),
            &self.world_matrix(),
        )
    }

    pub fn world_bounds(&self) -> BoundingBox {
        match self.light_type {
            LightType::Directional => BoundingBox::from_center_half_size(
                Vec3::ZERO,
                Vec3::splat(LARGE_VALUE),
            ),
            LightType::Point => {
                BoundingBox::from_center_half_size(self.position, Vec3::splat(self.range))
            }
            LightType::Spot => self.spot_frustum().bounding_box(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_light_bounds_follow_range() {
        let light = Light::point(Vec3::new(2.0, 0.0, 0.0), 3.0);
        let bounds = light.world_bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, -3.0, -3.0));
        assert_eq!(bounds.max, Vec3::new(5.0, 3.0, 3.0));
    }

    #[test]
    fn directional_light_bounds_are_effectively_infinite() {
        let light = Light::directional(Quat::IDENTITY);
        let bounds = light.world_bounds();
        assert!(bounds.half_size().length_squared() >= LARGE_VALUE * LARGE_VALUE);
    }

    #[test]
    fn intensity_divisor_scales_with_brightness() {
        let mut light = Light::point(Vec3::ZERO, 5.0);
        let dim = light.intensity_divisor();
        light.brightness = 4.0;
        assert!(light.intensity_divisor() > dim * 3.0);
    }
}
