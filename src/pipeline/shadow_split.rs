use glam::{Mat4, Vec2, Vec3};

use crate::gfx::ShadowMapRegion;
use crate::math::{BoundingBox, FloatRange, Polyhedron};
use crate::scene::{Camera, FocusParameters, Light, LightType};

use super::batch::PipelineBatch;
use super::drawable_processor::DrawableProcessor;
use super::frame::FrameContext;

/// Cube shadow map padding, in pixels. Point light faces must not sample
/// across the edge of their virtual cube face (up to 3x3 PCF).
pub const CUBE_SHADOW_MAP_PADDING: f32 = 2.0;

/// One shadow-casting sub-camera, its view-depth range, and the atlas region
/// assigned for the current frame.
#[derive(Debug, Clone)]
pub struct ShadowSplit {
    pub shadow_camera: Camera,
    pub z_range: FloatRange,
    pub shadow_casters: Vec<u32>,
    pub shadow_batches: Vec<PipelineBatch>,
    pub shadow_map: ShadowMapRegion,
}

impl Default for ShadowSplit {
    fn default() -> Self {
        Self {
            shadow_camera: Camera::default(),
            z_range: FloatRange::default(),
            shadow_casters: Vec::new(),
            shadow_batches: Vec::new(),
            shadow_map: ShadowMapRegion::default(),
        }
    }
}

impl ShadowSplit {
    pub fn clear_casters(&mut self) {
        self.shadow_casters.clear();
        self.shadow_batches.clear();
    }

    /// Fit an orthographic shadow camera over this split of the view frustum.
    ///
    /// The camera sits behind the scene along the light direction. With
    /// focusing enabled the split frustum is clipped to the bounds of lit
    /// geometry inside the split's depth range, falling back to the unclipped
    /// frustum when clipping empties the volume. The fitted box is quantized
    /// to damp shadow swimming as the view moves.
    pub fn setup_directional_shadow_camera(
        &mut self,
        ctx: &FrameContext<'_>,
        light: &Light,
        lit_geometries: &[u32],
        drawable_processor: &DrawableProcessor,
    ) {
        let extrusion_distance = ctx.camera.far.min(light.shadow_max_extrusion);
        self.shadow_camera = Camera {
            position: ctx.camera.position - extrusion_distance * light.direction(),
            rotation: light.rotation,
            orthographic: true,
            zoom: 1.0,
            near: 0.0,
            ..Camera::default()
        };

        let parameters = light.focus;
        let scene_z_range = drawable_processor.scene_z_range();
        let split_z_range = if parameters.focus {
            scene_z_range.intersect(self.z_range)
        } else {
            self.z_range
        };

        let split_frustum = ctx.camera.split_frustum(split_z_range.min, split_z_range.max);
        let mut frustum_volume = Polyhedron::from_frustum(&split_frustum);

        if parameters.focus {
            let mut lit_geometries_box = BoundingBox::default();
            for &index in lit_geometries {
                if drawable_processor
                    .geometry_z_range(index)
                    .intersects(&split_z_range)
                {
                    if let Some(drawable) = ctx.scene.drawable(index) {
                        lit_geometries_box.merge(&drawable.world_bounds);
                    }
                }
            }

            if lit_geometries_box.is_defined() {
                frustum_volume.clip_to_box(&lit_geometries_box);
                // Degenerate input guard: restore the unclipped frustum
                // instead of fitting a zero-size camera.
                if frustum_volume.is_empty() {
                    frustum_volume = Polyhedron::from_frustum(&split_frustum);
                }
            }
        }

        frustum_volume.transform(&self.shadow_camera.view_matrix());

        // A sphere fit keeps the shadow camera size invariant under view
        // rotation, trading resolution for stability.
        let shadow_box = if parameters.non_uniform {
            frustum_volume.bounding_box()
        } else {
            BoundingBox::from_sphere(&frustum_volume.bounding_sphere())
        };

        // Light space looks down -Z; the deepest volume point sets the far clip.
        self.shadow_camera.far = (-shadow_box.min.z).max(crate::math::EPSILON);

        // The atlas region is unknown at this point; texel snapping happens
        // in finalize once the viewport is assigned.
        self.shadow_map = ShadowMapRegion::default();
        self.quantize_directional_shadow_camera(&parameters, &shadow_box);
    }

    /// Quantize the view size to discrete steps and snap the camera position
    /// to whole shadow-map texels. Quantization is idempotent: re-running it
    /// on its own output size changes nothing.
    fn quantize_directional_shadow_camera(
        &mut self,
        parameters: &FocusParameters,
        view_box: &BoundingBox,
    ) {
        let shadow_map_width = self.shadow_map.rect.width() as f32;
        let center = Vec2::new(
            (view_box.min.x + view_box.max.x) * 0.5,
            (view_box.min.y + view_box.max.y) * 0.5,
        );
        let mut view_size = Vec2::new(
            view_box.max.x - view_box.min.x,
            view_box.max.y - view_box.min.y,
        );

        if parameters.non_uniform {
            view_size = view_size.max(Vec2::splat(parameters.min_view));
            view_size.x = quantize_size(view_size.x, parameters.quantize);
            view_size.y = quantize_size(view_size.y, parameters.quantize);
        } else if parameters.focus {
            let uniform = view_size.x.max(view_size.y).max(parameters.min_view);
            view_size = Vec2::splat(quantize_size(uniform, parameters.quantize));
        }

        self.shadow_camera.ortho_size = view_size;

        // Center the camera on the view-space box.
        let rotation = self.shadow_camera.rotation;
        self.shadow_camera.position += rotation * Vec3::new(center.x, center.y, 0.0);

        // Snap to whole texels once the viewport is known; the outermost
        // texel ring is reserved for border filtering.
        if shadow_map_width > 2.0 {
            let view_position = rotation.inverse() * self.shadow_camera.position;
            let inv_actual_size = 1.0 / (shadow_map_width - 2.0);
            let texel_size = view_size * inv_actual_size;
            let snap = Vec3::new(
                -(view_position.x % texel_size.x),
                -(view_position.y % texel_size.y),
                0.0,
            );
            self.shadow_camera.position += rotation * snap;
        }
    }

    /// Re-quantize against the now-known atlas region and zoom out slightly
    /// so border texels are never sampled.
    pub fn finalize_shadow_camera(&mut self, light: &Light) {
        let shadow_map_width = self.shadow_map.rect.width() as f32;

        if light.light_type == LightType::Directional {
            let half = self.shadow_camera.ortho_size * 0.5;
            let view_box = BoundingBox::new(
                Vec3::new(-half.x, -half.y, 0.0),
                Vec3::new(half.x, half.y, 0.0),
            );
            self.quantize_directional_shadow_camera(&light.focus, &view_box);
        }

        if self.shadow_camera.zoom >= 1.0 && shadow_map_width > 0.0 {
            let padding = if light.light_type == LightType::Point {
                2.0 * CUBE_SHADOW_MAP_PADDING
            } else {
                2.0
            };
            self.shadow_camera.zoom *= (shadow_map_width - padding) / shadow_map_width;
        }
    }

    /// World-to-shadow-texture matrix for this split's atlas region.
    pub fn shadow_matrix(&self, sub_pixel_offset: f32) -> Mat4 {
        if !self.shadow_map.is_valid() {
            return Mat4::IDENTITY;
        }

        let viewport = self.shadow_map.rect;
        let texture_size = self.shadow_map.texture_size.as_vec2();
        let shadow_view = self.shadow_camera.view_matrix();
        let shadow_projection = self.shadow_camera.projection_matrix();

        let mut scale = Vec3::new(
            0.5 * viewport.width() as f32 / texture_size.x,
            0.5 * viewport.height() as f32 / texture_size.y,
            1.0,
        );
        let mut offset = Vec3::new(
            viewport.min.x as f32 / texture_size.x + scale.x,
            viewport.min.y as f32 / texture_size.y + scale.y,
            0.0,
        );

        // Texture space has Y down; clip space has Y up.
        scale.y = -scale.y;

        offset.x -= sub_pixel_offset / texture_size.x;
        offset.y -= sub_pixel_offset / texture_size.y;

        let tex_adjust = Mat4::from_translation(offset) * Mat4::from_scale(scale);
        tex_adjust * shadow_projection * shadow_view
    }
}

fn quantize_size(size: f32, quantize: f32) -> f32 {
    let steps = (size / quantize).sqrt().ceil();
    steps * steps * quantize
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec2, UVec2};

    use crate::gfx::TextureHandle;
    use crate::math::IntRect;

    fn focus_parameters() -> FocusParameters {
        FocusParameters {
            focus: true,
            non_uniform: true,
            quantize: 0.5,
            min_view: 3.0,
        }
    }

    fn quantize_box(split: &mut ShadowSplit, size: Vec2) -> Vec2 {
        let view_box = BoundingBox::new(
            Vec3::new(-size.x * 0.5, -size.y * 0.5, -1.0),
            Vec3::new(size.x * 0.5, size.y * 0.5, 0.0),
        );
        split.quantize_directional_shadow_camera(&focus_parameters(), &view_box);
        split.shadow_camera.ortho_size
    }

    #[test]
    fn quantization_is_idempotent() {
        for raw in [0.1_f32, 1.7, 3.0, 11.3, 47.9, 1000.0] {
            let mut split = ShadowSplit::default();
            let once = quantize_box(&mut split, Vec2::splat(raw));
            let twice = quantize_box(&mut split, once);
            assert_eq!(once, twice, "size {} drifted", raw);
        }
    }

    #[test]
    fn quantized_size_never_shrinks_below_input_or_minimum() {
        let mut split = ShadowSplit::default();
        let size = quantize_box(&mut split, Vec2::new(7.3, 0.2));
        assert!(size.x >= 7.3);
        assert!(size.y >= focus_parameters().min_view);
    }

    #[test]
    fn uniform_fit_produces_a_square_camera() {
        let mut split = ShadowSplit::default();
        let parameters = FocusParameters {
            non_uniform: false,
            ..focus_parameters()
        };
        let view_box = BoundingBox::new(Vec3::new(-8.0, -2.0, -1.0), Vec3::new(8.0, 2.0, 0.0));
        split.quantize_directional_shadow_camera(&parameters, &view_box);

        let size = split.shadow_camera.ortho_size;
        assert_eq!(size.x, size.y);
        assert!(size.x >= 16.0);
    }

    #[test]
    fn texel_snap_moves_camera_by_less_than_a_texel() {
        let mut split = ShadowSplit::default();
        split.shadow_map = ShadowMapRegion {
            texture: Some(TextureHandle::new(0)),
            texture_size: UVec2::splat(1024),
            rect: IntRect::new(IVec2::ZERO, IVec2::splat(512)),
        };
        split.shadow_camera.position = Vec3::new(13.37, 42.1, 0.0);

        let before = split.shadow_camera.position;
        let size = quantize_box(&mut split, Vec2::splat(20.0));
        let texel = size.x / (512.0 - 2.0);
        let moved = (split.shadow_camera.position - before).length();
        assert!(moved <= texel * 2.0_f32.sqrt() + 1e-4);
    }

    #[test]
    fn shadow_matrix_maps_the_camera_target_into_the_region() {
        let mut split = ShadowSplit::default();
        split.shadow_camera = Camera {
            position: Vec3::new(0.0, 0.0, 10.0),
            orthographic: true,
            ortho_size: Vec2::splat(20.0),
            near: 0.0,
            far: 20.0,
            ..Camera::default()
        };
        split.shadow_map = ShadowMapRegion {
            texture: Some(TextureHandle::new(0)),
            texture_size: UVec2::splat(1024),
            rect: IntRect::new(IVec2::ZERO, IVec2::splat(512)),
        };

        // A point straight ahead of the camera lands in the region center.
        let uv = split.shadow_matrix(0.0) * Vec3::ZERO.extend(1.0);
        let uv = uv.truncate() / uv.w;
        assert!((uv.x - 0.25).abs() < 1e-4);
        assert!((uv.y - 0.25).abs() < 1e-4);
        assert!(uv.z > 0.0 && uv.z < 1.0);
    }
}
