use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, UVec2, Vec2, Vec3, Vec4};
use log::warn;

use crate::gfx::ShadowMapRegion;
use crate::math::hashing::{combine_hash, hash_f32};
use crate::math::{FloatRange, Intersection, Sphere, EPSILON, LARGE_VALUE};
use crate::scene::{
    DrawableFlags, Light, LightType, Scene, MAX_CASCADE_SPLITS, MAX_CUBEMAP_FACES,
};
use crate::settings::ShadowMapSettings;

use super::drawable_processor::DrawableProcessor;
use super::frame::FrameContext;
use super::shadow_split::{ShadowSplit, CUBE_SHADOW_MAP_PADDING};

/// Frames a cache entry may go unused before it is evicted.
pub const UNUSED_FRAMES_TO_LIVE: u64 = 8;
/// Frames a live processor keeps its split resources while shadowless.
pub const SPLIT_FRAMES_TO_LIVE: u32 = 600;

/// Per-light shader-visible constants, cooked once per frame after shadow
/// maps are assigned.
#[derive(Debug, Clone)]
pub struct LightShaderParameters {
    pub position: Vec3,
    /// Surface-to-light direction.
    pub direction: Vec3,
    /// Zero means no distance attenuation (directional lights).
    pub inv_range: f32,
    pub color: Vec3,
    pub specular_intensity: f32,
    /// Cosine of the spot half-angle; -2 for non-spot lights so the cone
    /// test always passes.
    pub cutoff: f32,
    pub inv_cutoff: f32,
    pub num_light_matrices: usize,
    pub light_matrices: [Mat4; MAX_CASCADE_SPLITS],
    pub shadow_map_inv_size: Vec2,
    pub shadow_cube_uv_bias: Vec2,
    pub shadow_cube_adjust: Vec4,
    pub shadow_depth_fade: Vec4,
    pub shadow_intensity: Vec4,
    /// Cascade end distances as fractions of the camera far clip.
    pub shadow_splits: Vec4,
    pub normal_offset_scale: Vec4,
}

impl Default for LightShaderParameters {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::Z,
            inv_range: 0.0,
            color: Vec3::ZERO,
            specular_intensity: 0.0,
            cutoff: -2.0,
            inv_cutoff: 1.0,
            num_light_matrices: 0,
            light_matrices: [Mat4::IDENTITY; MAX_CASCADE_SPLITS],
            shadow_map_inv_size: Vec2::ZERO,
            shadow_cube_uv_bias: Vec2::ZERO,
            shadow_cube_adjust: Vec4::ZERO,
            shadow_depth_fade: Vec4::ZERO,
            shadow_intensity: Vec4::ZERO,
            shadow_splits: Vec4::splat(LARGE_VALUE),
            normal_offset_scale: Vec4::ZERO,
        }
    }
}

/// std140-style uniform block mirror of [`LightShaderParameters`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightParametersRaw {
    pub position: [f32; 3],
    pub inv_range: f32,
    pub direction: [f32; 3],
    pub cutoff: f32,
    pub color: [f32; 3],
    pub specular_intensity: f32,
    pub shadow_map_inv_size: [f32; 2],
    pub shadow_cube_uv_bias: [f32; 2],
    pub shadow_cube_adjust: [f32; 4],
    pub shadow_depth_fade: [f32; 4],
    pub shadow_intensity: [f32; 4],
    pub shadow_splits: [f32; 4],
    pub normal_offset_scale: [f32; 4],
    pub inv_cutoff: f32,
    pub num_light_matrices: u32,
    pub _padding: [f32; 2],
    pub light_matrices: [[[f32; 4]; 4]; MAX_CASCADE_SPLITS],
}

impl LightShaderParameters {
    pub fn to_raw(&self) -> LightParametersRaw {
        let mut light_matrices = [[[0.0; 4]; 4]; MAX_CASCADE_SPLITS];
        for (raw, matrix) in light_matrices.iter_mut().zip(self.light_matrices) {
            *raw = matrix.to_cols_array_2d();
        }
        LightParametersRaw {
            position: self.position.to_array(),
            inv_range: self.inv_range,
            direction: self.direction.to_array(),
            cutoff: self.cutoff,
            color: self.color.to_array(),
            specular_intensity: self.specular_intensity,
            shadow_map_inv_size: self.shadow_map_inv_size.to_array(),
            shadow_cube_uv_bias: self.shadow_cube_uv_bias.to_array(),
            shadow_cube_adjust: self.shadow_cube_adjust.to_array(),
            shadow_depth_fade: self.shadow_depth_fade.to_array(),
            shadow_intensity: self.shadow_intensity.to_array(),
            shadow_splits: self.shadow_splits.to_array(),
            normal_offset_scale: self.normal_offset_scale.to_array(),
            inv_cutoff: self.inv_cutoff,
            num_light_matrices: self.num_light_matrices as u32,
            _padding: [0.0; 2],
            light_matrices,
        }
    }
}

/// Per-light, per-frame state: lit geometry, shadow splits, the transient
/// shadow-map allocation, and cooked shader parameters.
///
/// The referenced light is held by drawable index only; the scene owns it.
#[derive(Debug)]
pub struct LightProcessor {
    light_index: u32,
    splits: Vec<ShadowSplit>,
    num_splits: usize,
    has_shadow: bool,
    lit_geometries: Vec<u32>,
    temp_shadow_casters: Vec<u32>,
    queued_caster_updates: Vec<u32>,
    shadow_map: ShadowMapRegion,
    shadow_map_size: UVec2,
    shader_params: LightShaderParameters,
    pipeline_state_hash: u32,
    frames_without_shadow: u32,
    camera_distance: f32,
}

impl LightProcessor {
    pub fn new(light_index: u32) -> Self {
        Self {
            light_index,
            splits: Vec::new(),
            num_splits: 0,
            has_shadow: false,
            lit_geometries: Vec::new(),
            temp_shadow_casters: Vec::new(),
            queued_caster_updates: Vec::new(),
            shadow_map: ShadowMapRegion::default(),
            shadow_map_size: UVec2::ZERO,
            shader_params: LightShaderParameters::default(),
            pipeline_state_hash: 0,
            frames_without_shadow: 0,
            camera_distance: 0.0,
        }
    }

    pub fn light_index(&self) -> u32 {
        self.light_index
    }

    pub fn lit_geometries(&self) -> &[u32] {
        &self.lit_geometries
    }

    pub fn has_shadow(&self) -> bool {
        self.has_shadow
    }

    pub fn num_splits(&self) -> usize {
        self.num_splits
    }

    pub fn split(&self, index: usize) -> &ShadowSplit {
        &self.splits[index]
    }

    pub fn split_mut(&mut self, index: usize) -> &mut ShadowSplit {
        &mut self.splits[index]
    }

    pub fn shader_params(&self) -> &LightShaderParameters {
        &self.shader_params
    }

    pub fn pipeline_state_hash(&self) -> u32 {
        self.pipeline_state_hash
    }

    /// Hash for shadow pipeline states of one split; folds the split index so
    /// per-split bias tweaks regenerate only their own states.
    pub fn split_pipeline_state_hash(&self, split_index: usize) -> u32 {
        let mut hash = self.pipeline_state_hash;
        combine_hash(&mut hash, split_index as u32);
        hash
    }

    /// Shadow-only casters discovered this frame, handed back to the
    /// drawable processor for the queued update pass.
    pub fn take_queued_updates(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.queued_caster_updates)
    }

    /// Reset per-frame state. Split resources are released after the light
    /// has gone [`SPLIT_FRAMES_TO_LIVE`] frames without shadows.
    pub fn begin_update(&mut self, ctx: &FrameContext<'_>, has_shadow: bool) {
        self.lit_geometries.clear();
        self.temp_shadow_casters.clear();
        self.queued_caster_updates.clear();
        self.shadow_map = ShadowMapRegion::default();
        self.shadow_map_size = UVec2::ZERO;
        self.has_shadow = has_shadow;

        if has_shadow {
            self.frames_without_shadow = 0;
        } else {
            self.frames_without_shadow = self.frames_without_shadow.saturating_add(1);
            if self.frames_without_shadow == SPLIT_FRAMES_TO_LIVE {
                self.splits = Vec::new();
                self.num_splits = 0;
            }
        }

        if let Some(light) = ctx.scene.drawable(self.light_index).and_then(|d| d.light.as_ref())
        {
            self.camera_distance = if light.light_type == LightType::Directional {
                0.0
            } else {
                (light.position - ctx.camera.position).length()
            };
            self.pipeline_state_hash = self.recalculate_pipeline_state_hash(light);
        }
    }

    /// Worker-thread phase: collect lit geometry and shadow casters, set up
    /// shadow cameras, and decide the shadow-map footprint.
    pub fn update(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        shadow_settings: &ShadowMapSettings,
    ) {
        let Some(drawable) = ctx.scene.drawable(self.light_index) else {
            warn!("Light drawable {} disappeared mid-frame", self.light_index);
            self.has_shadow = false;
            return;
        };
        let Some(light) = drawable.light.clone() else {
            warn!("Drawable {} is not a light", self.light_index);
            self.has_shadow = false;
            return;
        };
        let light_mask = drawable.light_mask;

        self.collect_lit_geometries(ctx, drawable_processor, &light, light_mask);

        if self.has_shadow {
            self.setup_shadow_cameras(ctx, drawable_processor, &light);
            self.collect_shadow_casters(ctx, drawable_processor, &light, light_mask);
            self.finalize_shadow_map(&light, shadow_settings);
        }
    }

    fn collect_lit_geometries(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        light: &Light,
        light_mask: u32,
    ) {
        match light.light_type {
            LightType::Directional => {
                // Directional lights reach everything in the frustum; scan
                // the known visible geometry instead of a spatial query.
                for &index in drawable_processor.visible_geometries() {
                    if drawable_processor.light_mask_in_zone(ctx.scene, index) & light_mask != 0 {
                        self.lit_geometries.push(index);
                    }
                }
            }
            LightType::Point => {
                let sphere = Sphere::new(light.position, light.range);
                let mut candidates = Vec::new();
                ctx.scene.query_sphere(
                    &sphere,
                    DrawableFlags::GEOMETRY,
                    ctx.camera.view_mask,
                    &mut candidates,
                );
                self.filter_lit_and_casters(ctx, drawable_processor, light_mask, &candidates);
            }
            LightType::Spot => {
                let frustum = light.spot_frustum();
                let mut candidates = Vec::new();
                ctx.scene.query_frustum(
                    &frustum,
                    DrawableFlags::GEOMETRY,
                    ctx.camera.view_mask,
                    &mut candidates,
                );
                self.filter_lit_and_casters(ctx, drawable_processor, light_mask, &candidates);
            }
        }
    }

    fn filter_lit_and_casters(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        light_mask: u32,
        candidates: &[u32],
    ) {
        for &index in candidates {
            let Some(drawable) = ctx.scene.drawable(index) else {
                continue;
            };
            if drawable_processor.is_visible(index)
                && (drawable_processor.light_mask_in_zone(ctx.scene, index) & light_mask) != 0
            {
                self.lit_geometries.push(index);
            }
            if self.has_shadow
                && drawable.cast_shadows
                && (drawable.shadow_mask & light_mask) != 0
            {
                self.temp_shadow_casters.push(index);
            }
        }
    }

    fn ensure_splits(&mut self, count: usize) {
        if self.splits.len() < count {
            self.splits.resize_with(count, ShadowSplit::default);
        }
    }

    fn setup_shadow_cameras(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        light: &Light,
    ) {
        match light.light_type {
            LightType::Directional => {
                let requested = light.num_shadow_splits.clamp(1, MAX_CASCADE_SPLITS);
                self.ensure_splits(requested);

                let mut near_split = ctx.camera.near;
                self.num_splits = 0;
                for i in 0..requested {
                    if near_split > ctx.camera.far {
                        break;
                    }
                    let far_split = ctx.camera.far.min(light.cascade.splits[i]);
                    if far_split <= near_split {
                        break;
                    }

                    self.splits[i].z_range = FloatRange::new(near_split, far_split);
                    let lit_geometries = &self.lit_geometries;
                    self.splits[i].setup_directional_shadow_camera(
                        ctx,
                        light,
                        lit_geometries,
                        drawable_processor,
                    );

                    near_split = far_split;
                    self.num_splits += 1;
                }
            }
            LightType::Spot => {
                self.ensure_splits(1);
                let split = &mut self.splits[0];
                split.z_range = FloatRange::new(ctx.camera.near, ctx.camera.far);
                split.shadow_camera = crate::scene::Camera {
                    position: light.position,
                    rotation: light.rotation,
                    fov_y: light.fov,
                    aspect: light.aspect_ratio,
                    near: light.shadow_near_far_ratio * light.range,
                    far: light.range.max(EPSILON),
                    orthographic: false,
                    zoom: 1.0,
                    ..crate::scene::Camera::default()
                };
                self.num_splits = 1;
            }
            LightType::Point => {
                // World-axis-aligned cube faces regardless of light rotation,
                // so adjacent faces stay seamless when the light rotates.
                const DIRECTIONS: [Vec3; MAX_CUBEMAP_FACES] = [
                    Vec3::X,
                    Vec3::NEG_X,
                    Vec3::Y,
                    Vec3::NEG_Y,
                    Vec3::NEG_Z,
                    Vec3::Z,
                ];

                self.ensure_splits(MAX_CUBEMAP_FACES);
                for (i, direction) in DIRECTIONS.into_iter().enumerate() {
                    let split = &mut self.splits[i];
                    split.z_range = FloatRange::new(ctx.camera.near, ctx.camera.far);
                    split.shadow_camera = crate::scene::Camera {
                        position: light.position,
                        rotation: face_rotation(direction),
                        fov_y: 90_f32.to_radians(),
                        aspect: 1.0,
                        near: light.shadow_near_far_ratio * light.range,
                        far: light.range.max(EPSILON),
                        orthographic: false,
                        zoom: 1.0,
                        ..crate::scene::Camera::default()
                    };
                }
                self.num_splits = MAX_CUBEMAP_FACES;
            }
        }
    }

    fn collect_shadow_casters(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        light: &Light,
        light_mask: u32,
    ) {
        let view_frustum = ctx.camera.frustum();
        let scene_z_range = drawable_processor.scene_z_range();

        for i in 0..self.num_splits {
            self.splits[i].clear_casters();

            match light.light_type {
                LightType::Point => {
                    // Skip cube faces whose frustum is entirely out of view.
                    let face_bounds = self.splits[i].shadow_camera.frustum().bounding_box();
                    if view_frustum.intersects_box(&face_bounds) == Intersection::Outside {
                        continue;
                    }
                }
                LightType::Directional => {
                    if !scene_z_range.intersects(&self.splits[i].z_range) {
                        continue;
                    }

                    // Directional casters come from a per-split query; lit
                    // geometry does not bound what casts into the split.
                    let mut candidates = Vec::new();
                    ctx.scene.query_frustum(
                        &self.splits[i].shadow_camera.frustum(),
                        DrawableFlags::GEOMETRY,
                        ctx.camera.view_mask,
                        &mut candidates,
                    );
                    self.temp_shadow_casters.clear();
                    for index in candidates {
                        let Some(drawable) = ctx.scene.drawable(index) else {
                            continue;
                        };
                        if drawable.cast_shadows && (drawable.shadow_mask & light_mask) != 0 {
                            self.temp_shadow_casters.push(index);
                        }
                    }
                }
                LightType::Spot => {}
            }

            let split = &mut self.splits[i];
            drawable_processor.preprocess_shadow_casters(
                ctx,
                &mut split.shadow_casters,
                &self.temp_shadow_casters,
                split.z_range,
                light,
                &split.shadow_camera,
                &mut self.queued_caster_updates,
            );
        }
    }

    fn finalize_shadow_map(&mut self, light: &Light, settings: &ShadowMapSettings) {
        if !self.has_shadow {
            return;
        }

        let any_casters = self.splits[..self.num_splits]
            .iter()
            .any(|split| !split.shadow_casters.is_empty());
        if !any_casters {
            self.has_shadow = false;
            self.shadow_map_size = UVec2::ZERO;
            return;
        }

        let split_size = if light.light_type == LightType::Point {
            settings.split_size_for_point_light()
        } else {
            settings.split_size
        };
        self.shadow_map_size = UVec2::splat(split_size) * self.splits_grid_size();
    }

    /// Total atlas footprint required this frame; zero when unshadowed.
    pub fn shadow_map_size(&self) -> UVec2 {
        if self.has_shadow {
            self.shadow_map_size
        } else {
            UVec2::ZERO
        }
    }

    /// Smallest reasonable 2D grid packing the active splits.
    pub fn splits_grid_size(&self) -> UVec2 {
        match self.num_splits {
            1 => UVec2::new(1, 1),
            2 => UVec2::new(2, 1),
            3..=5 => UVec2::new(2, 2),
            _ => UVec2::new(3, 2),
        }
    }

    /// Assign the atlas region allocated for this light. An invalid region
    /// means allocation failed; the light renders unshadowed this frame.
    pub fn set_shadow_map(&mut self, region: ShadowMapRegion, light: &Light) {
        if !region.is_valid() {
            self.num_splits = 0;
            self.has_shadow = false;
            self.shadow_map = ShadowMapRegion::default();
            return;
        }

        self.shadow_map = region;
        let grid = self.splits_grid_size();
        for split_index in 0..self.num_splits {
            let split = &mut self.splits[split_index];
            split.shadow_map = region.split(split_index as u32, grid);
            split.finalize_shadow_camera(light);
        }
    }

    /// Derive all shader-visible constants. Shadow-related parameters are
    /// only produced when a shadow map was assigned.
    pub fn finalize_shader_parameters(&mut self, ctx: &FrameContext<'_>, sub_pixel_offset: f32) {
        let Some(light) = ctx
            .scene
            .drawable(self.light_index)
            .and_then(|d| d.light.clone())
        else {
            return;
        };

        self.pipeline_state_hash = self.recalculate_pipeline_state_hash(&light);

        let params = &mut self.shader_params;
        *params = LightShaderParameters::default();

        params.position = light.position;
        params.direction = -light.direction();
        params.inv_range = if light.light_type == LightType::Directional {
            0.0
        } else {
            1.0 / light.range.max(EPSILON)
        };

        let fade = light_fade(&light, self.camera_distance);
        params.color = fade * light.effective_color().abs();
        params.specular_intensity = fade * light.specular_intensity;

        if light.light_type == LightType::Spot {
            params.cutoff = (light.fov * 0.5).cos();
            params.inv_cutoff = 1.0 / (1.0 - params.cutoff);
        }

        match light.light_type {
            LightType::Directional => params.num_light_matrices = 0,
            LightType::Spot => {
                params.light_matrices[0] = spot_matrix(&light);
                params.num_light_matrices = 1;
            }
            LightType::Point => {
                params.light_matrices[0] = Mat4::from_quat(light.rotation);
                params.num_light_matrices = 1;
            }
        }

        if !self.shadow_map.is_valid() {
            return;
        }

        let texture_size = self.shadow_map.texture_size.as_vec2();
        params.shadow_map_inv_size = Vec2::ONE / texture_size;

        match light.light_type {
            LightType::Directional => {
                params.num_light_matrices = MAX_CASCADE_SPLITS;
                for split_index in 0..self.num_splits.min(MAX_CASCADE_SPLITS) {
                    params.light_matrices[split_index] =
                        self.splits[split_index].shadow_matrix(sub_pixel_offset);
                }
            }
            LightType::Spot => {
                params.num_light_matrices = 2;
                params.light_matrices[1] = self.splits[0].shadow_matrix(sub_pixel_offset);
            }
            LightType::Point => {
                let viewport = self.splits[0].shadow_map.rect;
                let viewport_size = Vec2::new(viewport.width() as f32, viewport.height() as f32);
                let viewport_offset =
                    Vec2::new(viewport.min.x as f32, viewport.min.y as f32);
                let relative_size = viewport_size / texture_size;
                let relative_offset = viewport_offset / texture_size;
                params.shadow_cube_uv_bias = Vec2::ONE
                    - 2.0 * CUBE_SHADOW_MAP_PADDING * params.shadow_map_inv_size / relative_size;
                params.shadow_cube_adjust = Vec4::new(
                    relative_size.x,
                    relative_size.y,
                    relative_offset.x,
                    relative_offset.y,
                );
            }
        }

        {
            // Shadow camera depth parameters (point lights) and cascade fade
            // parameters (directional), packed in one uniform.
            let shadow_camera = &self.splits[0].shadow_camera;
            let near_clip = shadow_camera.near;
            let far_clip = shadow_camera.far;
            let q = far_clip / (far_clip - near_clip).max(EPSILON);
            let r = -q * near_clip;

            let shadow_range = light.cascade.shadow_range();
            let view_far_clip = ctx.camera.far;
            let fade_start = light.cascade.fade_start * shadow_range / view_far_clip;
            let fade_end = shadow_range / view_far_clip;
            let fade_range = (fade_end - fade_start).max(EPSILON);
            params.shadow_depth_fade = Vec4::new(q, r, fade_start, 1.0 / fade_range);
        }

        {
            // Blend configured intensity toward fully shadowed across the
            // fade window as the camera recedes from the light.
            let mut intensity = light.shadow_intensity;
            let fade_start = light.shadow_fade_distance;
            let fade_end = light.shadow_max_distance;
            if fade_start > 0.0 && fade_end > 0.0 && fade_end > fade_start {
                let t = ((self.camera_distance - fade_start) / (fade_end - fade_start))
                    .clamp(0.0, 1.0);
                intensity = intensity + (1.0 - intensity) * t;
            }
            let samples = 1.0;
            params.shadow_intensity =
                Vec4::new((1.0 - intensity) / samples, intensity, 0.0, 0.0);
        }

        params.shadow_splits = Vec4::splat(LARGE_VALUE);
        if self.num_splits > 1 {
            params.shadow_splits.x = self.splits[0].z_range.max / ctx.camera.far;
        }
        if self.num_splits > 2 {
            params.shadow_splits.y = self.splits[1].z_range.max / ctx.camera.far;
        }
        if self.num_splits > 3 {
            params.shadow_splits.z = self.splits[2].z_range.max / ctx.camera.far;
        }
    }

    /// Pack the light state bits that select pipeline states, then fold in
    /// the bias constants so any change regenerates affected states.
    fn recalculate_pipeline_state_hash(&self, light: &Light) -> u32 {
        let type_bits = match light.light_type {
            LightType::Directional => 0u32,
            LightType::Point => 1,
            LightType::Spot => 2,
        };

        let mut hash = type_bits & 0x3;
        hash |= (self.has_shadow as u32) << 2;
        hash |= (light.cookie.is_some() as u32) << 3;
        hash |= ((light.specular_intensity > 0.0) as u32) << 4;
        hash |= ((light.bias.normal_offset > 0.0) as u32) << 5;
        combine_hash(&mut hash, hash_f32(light.bias.constant_bias));
        combine_hash(&mut hash, hash_f32(light.bias.slope_scaled_bias));
        hash
    }
}

/// Distance fade factor for point and spot lights.
fn light_fade(light: &Light, distance: f32) -> f32 {
    let fade_start = light.fade_distance;
    let fade_end = light.draw_distance;
    if light.light_type != LightType::Directional
        && fade_end > 0.0
        && fade_start > 0.0
        && fade_start < fade_end
    {
        (1.0 - (distance - fade_start) / (fade_end - fade_start)).min(1.0)
    } else {
        1.0
    }
}

/// Projection into spot-light texture space. The projected cone is made
/// slightly smaller than the cookie/shadow map to prevent light spill.
fn spot_matrix(light: &Light) -> Mat4 {
    let spot_view = light.world_matrix().inverse();

    let h = 1.005 / (light.fov * 0.5).tan();
    let w = h / light.aspect_ratio;
    let mut spot_proj = Mat4::ZERO;
    spot_proj.x_axis.x = w;
    spot_proj.y_axis.y = h;
    spot_proj.z_axis.z = -1.0 / light.range.max(EPSILON);
    spot_proj.z_axis.w = -1.0;

    let tex_adjust = Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0))
        * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0));

    tex_adjust * spot_proj * spot_view
}

fn face_rotation(direction: Vec3) -> Quat {
    let up = if direction.y.abs() > 0.9 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Quat::from_mat4(&Mat4::look_to_rh(Vec3::ZERO, direction, up).inverse())
}

struct CacheEntry {
    /// None while the processor is checked out for the current frame.
    processor: Option<Box<LightProcessor>>,
    last_used_frame: u64,
}

/// Lookup-or-create cache of light processors keyed by light identity.
/// Entries are non-owning with respect to the light itself: orphans (light
/// destroyed) and entries unused for [`UNUSED_FRAMES_TO_LIVE`] frames are
/// evicted at frame begin.
#[derive(Default)]
pub struct LightProcessorCache {
    entries: HashMap<u32, CacheEntry>,
}

impl LightProcessorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self, scene: &Scene, frame_number: u64) {
        self.entries.retain(|&light_index, entry| {
            let alive = scene
                .drawable(light_index)
                .map(|drawable| drawable.is_light())
                .unwrap_or(false);
            alive && frame_number.saturating_sub(entry.last_used_frame) <= UNUSED_FRAMES_TO_LIVE
        });
    }

    /// Take the processor for a light, creating it on first use. The caller
    /// must return it with [`checkin`](Self::checkin) at the end of the frame.
    pub fn checkout(&mut self, light_index: u32, frame_number: u64) -> Box<LightProcessor> {
        let entry = self.entries.entry(light_index).or_insert_with(|| CacheEntry {
            processor: Some(Box::new(LightProcessor::new(light_index))),
            last_used_frame: frame_number,
        });
        entry.last_used_frame = frame_number;
        entry
            .processor
            .take()
            .unwrap_or_else(|| Box::new(LightProcessor::new(light_index)))
    }

    pub fn checkin(&mut self, processor: Box<LightProcessor>) {
        let light_index = processor.light_index();
        if let Some(entry) = self.entries.get_mut(&light_index) {
            entry.processor = Some(processor);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Drawable;

    #[test]
    fn splits_grid_size_packs_counts() {
        let mut processor = LightProcessor::new(0);
        let expected = [
            (1, UVec2::new(1, 1)),
            (2, UVec2::new(2, 1)),
            (3, UVec2::new(2, 2)),
            (4, UVec2::new(2, 2)),
            (5, UVec2::new(2, 2)),
            (6, UVec2::new(3, 2)),
        ];
        for (count, grid) in expected {
            processor.num_splits = count;
            assert_eq!(processor.splits_grid_size(), grid, "count {}", count);
        }
    }

    #[test]
    fn failed_allocation_disables_shadows() {
        let mut processor = LightProcessor::new(0);
        processor.has_shadow = true;
        processor.num_splits = 4;
        processor.set_shadow_map(ShadowMapRegion::default(), &Light::default());

        assert!(!processor.has_shadow());
        assert_eq!(processor.num_splits(), 0);
        assert_eq!(processor.shadow_map_size(), UVec2::ZERO);
    }

    #[test]
    fn pipeline_state_hash_tracks_shadow_and_bias() {
        let processor = LightProcessor::new(0);
        let mut shadowed = LightProcessor::new(0);
        shadowed.has_shadow = true;

        let light = Light::default();
        let base = processor.recalculate_pipeline_state_hash(&light);
        assert_ne!(base, shadowed.recalculate_pipeline_state_hash(&light));

        let mut biased = light.clone();
        biased.bias.constant_bias *= 2.0;
        assert_ne!(base, processor.recalculate_pipeline_state_hash(&biased));

        assert_ne!(
            processor.split_pipeline_state_hash(0),
            processor.split_pipeline_state_hash(1)
        );
    }

    #[test]
    fn cube_face_rotations_look_along_world_axes() {
        for direction in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let rotation = face_rotation(direction);
            let forward = rotation * Vec3::NEG_Z;
            assert!(
                forward.abs_diff_eq(direction, 1e-5),
                "face {:?} got {:?}",
                direction,
                forward
            );
        }
    }

    #[test]
    fn spot_matrix_centers_the_cone_axis() {
        let light = Light::spot(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::IDENTITY,
            10.0,
            60_f32.to_radians(),
        );
        // A point straight ahead of the light projects to the texture center.
        let ahead = light.position + light.direction() * 5.0;
        let projected = spot_matrix(&light) * ahead.extend(1.0);
        let uv = projected.truncate() / projected.w;
        assert!((uv.x - 0.5).abs() < 1e-4);
        assert!((uv.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn raw_uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<LightParametersRaw>() % 16, 0);

        let mut params = LightShaderParameters::default();
        params.position = Vec3::new(1.0, 2.0, 3.0);
        params.num_light_matrices = 2;
        params.light_matrices[1] = Mat4::from_translation(Vec3::X);

        let raw = params.to_raw();
        assert_eq!(raw.position, [1.0, 2.0, 3.0]);
        assert_eq!(raw.num_light_matrices, 2);
        assert_eq!(raw.light_matrices[1][3][0], 1.0);
    }

    #[test]
    fn cache_evicts_orphaned_and_stale_entries() {
        let mut scene = Scene::new();
        let light_index =
            scene.add_drawable(Drawable::new_light(Light::point(Vec3::ZERO, 5.0)));

        let mut cache = LightProcessorCache::new();
        let processor = cache.checkout(light_index, 1);
        cache.checkin(processor);
        assert_eq!(cache.len(), 1);

        // Not touched for longer than the TTL.
        cache.begin_frame(&scene, 2 + UNUSED_FRAMES_TO_LIVE);
        assert!(cache.is_empty());

        let processor = cache.checkout(light_index, 10);
        cache.checkin(processor);
        let empty = Scene::new();
        cache.begin_frame(&empty, 10);
        assert!(cache.is_empty());
    }
}
