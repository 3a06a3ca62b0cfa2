use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use glam::Vec3;
use log::error;
use rayon::prelude::*;

use crate::math::hashing::combine_hash;
use crate::math::{
    BoundingBox, FloatRange, Intersection, SphericalHarmonicsL1, EPSILON, LARGE_VALUE,
};
use crate::scene::{
    CachedDrawableZone, Camera, CameraOverrideFlags, GeometryUpdateKind, GlobalIlluminationKind,
    Light, LightImportance, LightType, MaterialQuality, Scene,
};
use crate::settings::DrawableProcessorSettings;

use super::frame::FrameContext;
use super::light_accumulator::{AccumulatorContext, LightAccumulator};
use super::scene_pass::{GeometryBatch, ScenePass};

bitflags! {
    /// Per-geometry classification result for the current frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GeometryRenderFlags: u8 {
        const VISIBLE = 1 << 0;
        const LIT = 1 << 1;
        const FORWARD_LIT = 1 << 2;
    }
}

/// Light penalty for a drawable, from intensity penalty and light settings.
/// Order of penalties, from lower to higher:
/// -2:      important directional lights;
/// -1:      important point and spot lights;
///  0 .. 2: automatic lights;
///  3 .. 5: not important lights.
pub fn drawable_light_penalty(
    intensity_penalty: f32,
    importance: LightImportance,
    light_type: LightType,
) -> f32 {
    match importance {
        LightImportance::Important => {
            if light_type == LightType::Directional {
                -2.0
            } else {
                -1.0
            }
        }
        LightImportance::Auto => {
            if intensity_penalty <= 1.0 {
                intensity_penalty
            } else {
                2.0 - 1.0 / intensity_penalty
            }
        }
        LightImportance::NotImportant => {
            if intensity_penalty <= 1.0 {
                3.0 + intensity_penalty
            } else {
                5.0 - 1.0 / intensity_penalty
            }
        }
    }
}

/// Shadow test for an orthographic light: extrude the caster's light-space
/// box to the far edge of the frustum's light-space bounds.
fn is_box_shadow_in_ortho_frustum(
    bounds: &BoundingBox,
    frustum: &crate::math::Frustum,
    frustum_bounds: &BoundingBox,
) -> bool {
    let mut extruded = *bounds;
    extruded.min.z = extruded.min.z.min(frustum_bounds.min.z);
    frustum.intersects_box(&extruded) != Intersection::Outside
}

/// Shadow test for a perspective light: extrude along the ray from the light
/// origin through the box center, growing the box with distance. The merged
/// axis-aligned result is conservative.
fn is_box_shadow_in_perspective_frustum(
    bounds: &BoundingBox,
    frustum: &crate::math::Frustum,
    extrusion_distance: f32,
) -> bool {
    let center = bounds.center();
    let original_distance = center.length().clamp(EPSILON, extrusion_distance);
    let size_factor = extrusion_distance / original_distance;

    let new_center = extrusion_distance * center.normalize_or_zero();
    let new_half_size = bounds.size() * size_factor * 0.5;
    let mut extruded = BoundingBox::from_center_half_size(new_center, new_half_size);
    extruded.merge(bounds);

    frustum.intersects_box(&extruded) != Intersection::Outside
}

fn is_shadow_caster_visible(
    light_space_bounds: &BoundingBox,
    shadow_camera: &Camera,
    light_space_frustum: &crate::math::Frustum,
    light_space_frustum_bounds: &BoundingBox,
) -> bool {
    if shadow_camera.orthographic {
        is_box_shadow_in_ortho_frustum(
            light_space_bounds,
            light_space_frustum,
            light_space_frustum_bounds,
        )
    } else {
        is_box_shadow_in_perspective_frustum(
            light_space_bounds,
            light_space_frustum,
            shadow_camera.far,
        )
    }
}

struct GeometryClassification {
    /// None for "infinite" objects like skyboxes; they get a sentinel range
    /// and never contribute to the scene depth bounds.
    z_range: Option<FloatRange>,
    zone: Option<CachedDrawableZone>,
    distance: f32,
    batches: Vec<(usize, GeometryBatch)>,
    forward_lit: bool,
    need_ambient: bool,
    sh: SphericalHarmonicsL1,
    update_kind: GeometryUpdateKind,
}

enum ClassifiedDrawable {
    Geometry(GeometryClassification),
    Light,
    Skipped,
}

struct DrawableClassification {
    index: u32,
    result: ClassifiedDrawable,
}

/// Per-frame visibility and lighting bookkeeping for every drawable.
///
/// All scratch arrays are sized to the scene's drawable count and indexed by
/// drawable index. Classification runs in parallel over pure per-drawable
/// work; results are committed sequentially on the orchestrating thread, so
/// the arrays see a single writer.
pub struct DrawableProcessor {
    settings: DrawableProcessorSettings,
    material_quality: MaterialQuality,

    view_z: Vec3,
    abs_view_z: Vec3,
    view_z_offset: f32,
    has_gi: bool,

    is_drawable_updated: Vec<AtomicBool>,
    geometry_flags: Vec<GeometryRenderFlags>,
    geometry_z_ranges: Vec<FloatRange>,
    geometry_lighting: Vec<LightAccumulator>,
    distances: Vec<f32>,
    /// Persists across frames; refreshed only when a drawable moves past its
    /// zone invalidation distance.
    cached_zones: Vec<CachedDrawableZone>,

    visible_geometries: Vec<u32>,
    visible_lights: Vec<u32>,
    threaded_geometry_updates: Vec<u32>,
    non_threaded_geometry_updates: Vec<u32>,

    scene_z_range: FloatRange,
}

impl DrawableProcessor {
    pub fn new(settings: DrawableProcessorSettings) -> Self {
        Self {
            material_quality: settings.material_quality.to_quality(),
            settings,
            view_z: Vec3::ZERO,
            abs_view_z: Vec3::ZERO,
            view_z_offset: 0.0,
            has_gi: false,
            is_drawable_updated: Vec::new(),
            geometry_flags: Vec::new(),
            geometry_z_ranges: Vec::new(),
            geometry_lighting: Vec::new(),
            distances: Vec::new(),
            cached_zones: Vec::new(),
            visible_geometries: Vec::new(),
            visible_lights: Vec::new(),
            threaded_geometry_updates: Vec::new(),
            non_threaded_geometry_updates: Vec::new(),
            scene_z_range: FloatRange::default(),
        }
    }

    pub fn set_settings(&mut self, settings: DrawableProcessorSettings) {
        self.settings = settings;
    }

    /// Reset all per-frame arrays and capture the camera constants. Must run
    /// single-threaded before any parallel visibility work.
    pub fn on_update_begin(&mut self, ctx: &FrameContext<'_>) {
        let num_drawables = ctx.scene.num_drawables();

        let view = ctx.camera.view_matrix();
        // Depth grows away from the camera; the view looks down -Z.
        self.view_z = -Vec3::new(view.x_axis.z, view.y_axis.z, view.z_axis.z);
        self.abs_view_z = self.view_z.abs();
        self.view_z_offset = -view.w_axis.z;

        self.material_quality = self.settings.material_quality.to_quality();
        if ctx
            .camera
            .override_flags
            .contains(CameraOverrideFlags::LOW_MATERIAL_QUALITY)
        {
            self.material_quality = MaterialQuality::Low;
        }

        self.has_gi = ctx.scene.global_illumination().is_some();
        self.scene_z_range = FloatRange::default();

        self.is_drawable_updated.clear();
        self.is_drawable_updated
            .resize_with(num_drawables, AtomicBool::default);

        self.geometry_flags.clear();
        self.geometry_flags
            .resize(num_drawables, GeometryRenderFlags::empty());

        self.geometry_z_ranges.clear();
        self.geometry_z_ranges
            .resize(num_drawables, FloatRange::default());

        self.geometry_lighting
            .resize_with(num_drawables, LightAccumulator::default);

        self.distances.clear();
        self.distances.resize(num_drawables, 0.0);

        self.cached_zones
            .resize_with(num_drawables, CachedDrawableZone::default);

        self.visible_geometries.clear();
        self.visible_lights.clear();
        self.threaded_geometry_updates.clear();
        self.non_threaded_geometry_updates.clear();
    }

    pub fn material_quality(&self) -> MaterialQuality {
        self.material_quality
    }

    /// Classify octree-visible drawables in parallel, then commit results
    /// sequentially: scatter per-index state, feed pass intakes, collect
    /// visible lights and geometries, and union the scene depth range.
    /// Visible lights end up sorted by ascending identity so every later
    /// per-light phase is deterministic.
    pub fn process_visible_drawables(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_indices: &[u32],
        passes: &mut [&mut ScenePass],
    ) {
        let classifications: Vec<DrawableClassification> = {
            let this = &*self;
            let pass_views: Vec<&ScenePass> = passes.iter().map(|pass| &**pass).collect();
            drawable_indices
                .par_iter()
                .map(|&index| this.classify_drawable(ctx, index, &pass_views))
                .collect()
        };

        for classification in classifications {
            self.commit_classification(classification, passes);
        }

        self.visible_lights.sort_unstable();
    }

    fn classify_drawable(
        &self,
        ctx: &FrameContext<'_>,
        index: u32,
        passes: &[&ScenePass],
    ) -> DrawableClassification {
        let skipped = DrawableClassification {
            index,
            result: ClassifiedDrawable::Skipped,
        };
        let Some(drawable) = ctx.scene.drawable(index) else {
            return skipped;
        };

        self.is_drawable_updated[index as usize].store(true, Ordering::Relaxed);

        if drawable.is_geometry() {
            let bounds = &drawable.world_bounds;
            let center = bounds.center();
            let distance = (center - ctx.camera.position).length();

            if drawable.draw_distance > 0.0 && distance > drawable.draw_distance {
                return skipped;
            }

            let z_range = self.calculate_bounding_box_z_range(bounds);
            let zone = self.zone_update_for(ctx, index, center, drawable.zone_mask);

            let mut batches = Vec::new();
            let mut forward_lit = false;
            let mut need_ambient = false;

            for (source_batch_index, source) in drawable.batches.iter().enumerate() {
                let material_id = source.material.or(ctx.scene.default_material());
                let Some(material_id) = material_id else {
                    continue;
                };
                let Some(material) = ctx.scene.material(material_id) else {
                    continue;
                };
                let Some(technique) = material.find_technique(self.material_quality) else {
                    continue;
                };

                for (pass_ordinal, pass) in passes.iter().enumerate() {
                    if let Some(batch) = pass.classify(
                        index,
                        source_batch_index as u32,
                        material_id,
                        material,
                        source,
                        technique,
                        distance,
                    ) {
                        if batch.light_pass.is_some() {
                            forward_lit = true;
                            need_ambient = true;
                        } else if pass.need_ambient() {
                            need_ambient = true;
                        }
                        batches.push((pass_ordinal, batch));
                    }
                }
            }

            let mut sh = SphericalHarmonicsL1::default();
            if need_ambient {
                if self.has_gi && drawable.gi_kind == GlobalIlluminationKind::BlendLightProbes {
                    if let Some(gi) = ctx.scene.global_illumination() {
                        sh = gi.sample_ambient_sh(center);
                    }
                }
                let zone_index = zone
                    .as_ref()
                    .map(|z| z.zone)
                    .unwrap_or_else(|| self.cached_zones[index as usize].zone);
                sh.add_ambient(ctx.scene.zone(zone_index).ambient);
            }

            DrawableClassification {
                index,
                result: ClassifiedDrawable::Geometry(GeometryClassification {
                    z_range,
                    zone,
                    distance,
                    batches,
                    forward_lit,
                    need_ambient,
                    sh,
                    update_kind: drawable.update_kind,
                }),
            }
        } else if drawable.is_light() {
            let Some(light) = &drawable.light else {
                return skipped;
            };
            // Black lights and masked-out lights cannot affect anything.
            if light.effective_color() != Vec3::ZERO && drawable.light_mask != 0 {
                DrawableClassification {
                    index,
                    result: ClassifiedDrawable::Light,
                }
            } else {
                skipped
            }
        } else {
            skipped
        }
    }

    fn commit_classification(
        &mut self,
        classification: DrawableClassification,
        passes: &mut [&mut ScenePass],
    ) {
        let index = classification.index as usize;
        match classification.result {
            ClassifiedDrawable::Geometry(geometry) => {
                if let Some(zone) = geometry.zone {
                    self.cached_zones[index] = zone;
                }
                self.distances[index] = geometry.distance;

                match geometry.z_range {
                    Some(range) => {
                        self.geometry_z_ranges[index] = range;
                        self.scene_z_range.merge(range);
                    }
                    None => {
                        // Sentinel keeps skybox-like objects out of shadow
                        // focusing without special cases downstream.
                        self.geometry_z_ranges[index] =
                            FloatRange::new(LARGE_VALUE, LARGE_VALUE);
                    }
                }

                for (pass_ordinal, batch) in geometry.batches {
                    passes[pass_ordinal].add_geometry_batch(batch);
                }

                if geometry.need_ambient {
                    let accumulator = &mut self.geometry_lighting[index];
                    if geometry.forward_lit {
                        accumulator.reset_lights();
                    }
                    accumulator.sh = geometry.sh;
                }

                let mut flags = GeometryRenderFlags::VISIBLE;
                if geometry.need_ambient {
                    flags |= GeometryRenderFlags::LIT;
                }
                if geometry.forward_lit {
                    flags |= GeometryRenderFlags::FORWARD_LIT;
                }
                self.geometry_flags[index] = flags;

                self.visible_geometries.push(classification.index);
                match geometry.update_kind {
                    GeometryUpdateKind::MainThread => {
                        self.non_threaded_geometry_updates.push(classification.index)
                    }
                    GeometryUpdateKind::WorkerThread => {
                        self.threaded_geometry_updates.push(classification.index)
                    }
                    GeometryUpdateKind::None => {}
                }
            }
            ClassifiedDrawable::Light => self.visible_lights.push(classification.index),
            ClassifiedDrawable::Skipped => {}
        }
    }

    fn zone_update_for(
        &self,
        ctx: &FrameContext<'_>,
        index: u32,
        center: Vec3,
        zone_mask: u32,
    ) -> Option<CachedDrawableZone> {
        let cached = &self.cached_zones[index as usize];
        let moved_squared = (cached.cache_position - center).length_squared();
        // Non-finite means the cache was never filled.
        if !moved_squared.is_finite() || moved_squared >= cached.invalidation_distance_squared {
            Some(ctx.scene.query_zone(center, zone_mask))
        } else {
            None
        }
    }

    fn calculate_bounding_box_z_range(&self, bounds: &BoundingBox) -> Option<FloatRange> {
        let center = bounds.center();
        let edge = bounds.half_size();

        if edge.length_squared() >= LARGE_VALUE * LARGE_VALUE {
            return None;
        }

        let view_center_z = self.view_z.dot(center) + self.view_z_offset;
        let view_edge_z = self.abs_view_z.dot(edge);
        Some(FloatRange::new(
            view_center_z - view_edge_z,
            view_center_z + view_edge_z,
        ))
    }

    /// Rank one light against every geometry it lights and insert it into the
    /// bounded accumulators. Invalid light ordinals are reported and ignored.
    pub fn process_forward_lighting(
        &mut self,
        ctx: &FrameContext<'_>,
        light_ordinal: u32,
        lit_geometries: &[u32],
    ) {
        let Some(&light_index) = self.visible_lights.get(light_ordinal as usize) else {
            error!("Invalid light index {}", light_ordinal);
            return;
        };
        let Some(light) = ctx
            .scene
            .drawable(light_index)
            .and_then(|drawable| drawable.light.as_ref())
        else {
            error!("Visible light {} has no light data", light_index);
            return;
        };

        let importance = light.importance;
        let light_type = light.light_type;
        let intensity_penalty = 1.0 / light.intensity_divisor();
        let accumulator_ctx = AccumulatorContext {
            max_vertex_lights: self.settings.max_vertex_lights as usize,
            max_pixel_lights: self.settings.max_pixel_lights as usize,
            importance,
            light_index: light_ordinal,
        };

        let penalties: Vec<(u32, f32)> = lit_geometries
            .par_iter()
            .filter_map(|&geometry_index| {
                let drawable = ctx.scene.drawable(geometry_index)?;
                let distance =
                    light_distance_to(light, &drawable.world_bounds).max(EPSILON);
                let penalty =
                    drawable_light_penalty(distance * intensity_penalty, importance, light_type);
                Some((geometry_index, penalty))
            })
            .collect();

        for (geometry_index, penalty) in penalties {
            if let Some(accumulator) = self.geometry_lighting.get_mut(geometry_index as usize) {
                accumulator.accumulate(&accumulator_ctx, penalty);
            }
        }
    }

    /// Filter shadow-caster candidates against the light-space frustum of one
    /// split. Drawables already visible this frame are always included; the
    /// extrusion test only prunes casters whose shadow cannot reach the view.
    /// Freshly discovered casters are deduplicated through the one-shot
    /// update flag and appended to `queued`.
    #[allow(clippy::too_many_arguments)]
    pub fn preprocess_shadow_casters(
        &self,
        ctx: &FrameContext<'_>,
        out_casters: &mut Vec<u32>,
        candidates: &[u32],
        frustum_sub_range: FloatRange,
        light: &Light,
        shadow_camera: &Camera,
        queued: &mut Vec<u32>,
    ) {
        out_casters.clear();

        let shadow_camera_frustum = shadow_camera.frustum();
        let world_to_light = shadow_camera.view_matrix();

        let split_z_range = if light.light_type == LightType::Directional {
            self.scene_z_range.intersect(frustum_sub_range)
        } else {
            self.scene_z_range
        };
        let frustum = ctx
            .camera
            .split_frustum(split_z_range.min, split_z_range.max);
        let light_space_frustum = frustum.transformed(&world_to_light);
        let light_space_frustum_bounds = light_space_frustum.bounding_box();

        // Degenerate split frustum: nothing can cast into it.
        if light_space_frustum.vertices()[0]
            .abs_diff_eq(light_space_frustum.vertices()[4], EPSILON)
        {
            return;
        }

        for &index in candidates {
            let Some(drawable) = ctx.scene.drawable(index) else {
                continue;
            };

            // Point light splits cover one cube face each.
            if light.light_type == LightType::Point
                && shadow_camera_frustum.intersects_box(&drawable.world_bounds)
                    == Intersection::Outside
            {
                continue;
            }

            let light_space_bounds = drawable.world_bounds.transformed(&world_to_light);
            let is_drawable_visible = self.is_visible(index);
            if is_drawable_visible
                || is_shadow_caster_visible(
                    &light_space_bounds,
                    shadow_camera,
                    &light_space_frustum,
                    &light_space_frustum_bounds,
                )
            {
                if self.try_queue_update(index) {
                    queued.push(index);
                }
                out_casters.push(index);
            }
        }
    }

    /// One-shot update flag; true when this call claimed the drawable.
    pub fn try_queue_update(&self, index: u32) -> bool {
        self.is_drawable_updated
            .get(index as usize)
            .map(|flag| !flag.swap(true, Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Second parallel pass for drawables discovered only as shadow casters:
    /// zone and distance bookkeeping plus geometry update routing.
    pub fn process_queued_drawables(&mut self, ctx: &FrameContext<'_>, indices: &[u32]) {
        let updates: Vec<(u32, f32, Option<CachedDrawableZone>, GeometryUpdateKind)> = {
            let this = &*self;
            indices
                .par_iter()
                .filter_map(|&index| {
                    let drawable = ctx.scene.drawable(index)?;
                    let center = drawable.world_bounds.center();
                    let distance = (center - ctx.camera.position).length();
                    let zone = this.zone_update_for(ctx, index, center, drawable.zone_mask);
                    Some((index, distance, zone, drawable.update_kind))
                })
                .collect()
        };

        for (index, distance, zone, update_kind) in updates {
            self.distances[index as usize] = distance;
            if let Some(zone) = zone {
                self.cached_zones[index as usize] = zone;
            }
            match update_kind {
                GeometryUpdateKind::MainThread => {
                    self.non_threaded_geometry_updates.push(index)
                }
                GeometryUpdateKind::WorkerThread => self.threaded_geometry_updates.push(index),
                GeometryUpdateKind::None => {}
            }
        }
    }

    /// Run geometry updates: worker-safe drawables in parallel, main-thread
    /// ones sequentially afterwards. A drawable that turns out to require the
    /// main thread mid-pass is demoted instead of updated in place.
    pub fn update_geometries<F: Fn(u32) + Sync>(&mut self, ctx: &FrameContext<'_>, update: F) {
        let demoted: Vec<u32> = self
            .threaded_geometry_updates
            .par_iter()
            .filter_map(|&index| {
                match ctx.scene.drawable(index).map(|d| d.update_kind) {
                    Some(GeometryUpdateKind::MainThread) => Some(index),
                    Some(GeometryUpdateKind::WorkerThread) => {
                        update(index);
                        None
                    }
                    _ => None,
                }
            })
            .collect();

        for &index in self.non_threaded_geometry_updates.iter().chain(&demoted) {
            update(index);
        }
    }

    pub fn visible_geometries(&self) -> &[u32] {
        &self.visible_geometries
    }

    /// Visible lights, sorted by ascending identity.
    pub fn visible_lights(&self) -> &[u32] {
        &self.visible_lights
    }

    pub fn scene_z_range(&self) -> FloatRange {
        self.scene_z_range
    }

    pub fn geometry_flags(&self, index: u32) -> GeometryRenderFlags {
        self.geometry_flags
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_visible(&self, index: u32) -> bool {
        self.geometry_flags(index)
            .contains(GeometryRenderFlags::VISIBLE)
    }

    pub fn geometry_z_range(&self, index: u32) -> FloatRange {
        self.geometry_z_ranges
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn distance(&self, index: u32) -> f32 {
        self.distances.get(index as usize).copied().unwrap_or(0.0)
    }

    pub fn geometry_lighting(&self, index: u32) -> Option<&LightAccumulator> {
        self.geometry_lighting.get(index as usize)
    }

    pub fn cached_zone(&self, index: u32) -> Option<&CachedDrawableZone> {
        self.cached_zones.get(index as usize)
    }

    pub fn light_mask_in_zone(&self, scene: &Scene, index: u32) -> u32 {
        let Some(drawable) = scene.drawable(index) else {
            return 0;
        };
        let zone = self
            .cached_zones
            .get(index as usize)
            .map(|cached| cached.zone)
            .unwrap_or(0);
        drawable.light_mask & scene.zone(zone).light_mask
    }

    pub fn shadow_mask_in_zone(&self, scene: &Scene, index: u32) -> u32 {
        let Some(drawable) = scene.drawable(index) else {
            return 0;
        };
        let zone = self
            .cached_zones
            .get(index as usize)
            .map(|cached| cached.zone)
            .unwrap_or(0);
        drawable.shadow_mask & scene.zone(zone).shadow_mask
    }

    /// Per-drawable contribution to batch-state lookup keys: everything on
    /// the drawable that selects a different pipeline state.
    pub fn drawable_pipeline_hash(&self, scene: &Scene, index: u32) -> u32 {
        let mut hash = 0;
        if let Some(cached) = self.cached_zones.get(index as usize) {
            combine_hash(&mut hash, cached.zone);
        }
        if let Some(drawable) = scene.drawable(index) {
            combine_hash(&mut hash, drawable.gi_kind as u32);
        }
        hash
    }
}

fn light_distance_to(light: &Light, bounds: &BoundingBox) -> f32 {
    if light.light_type == LightType::Directional {
        0.0
    } else {
        (light.position - bounds.center()).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_bands_do_not_overlap() {
        let intensity_penalties = [0.0_f32, 0.01, 0.5, 1.0, 2.0, 100.0, 1.0e9];

        for &penalty in &intensity_penalties {
            let auto =
                drawable_light_penalty(penalty, LightImportance::Auto, LightType::Point);
            let not_important = drawable_light_penalty(
                penalty,
                LightImportance::NotImportant,
                LightType::Point,
            );

            assert!((0.0..2.0).contains(&auto));
            assert!((3.0..5.0).contains(&not_important));
            assert!(auto < not_important);
        }

        let important_directional =
            drawable_light_penalty(123.0, LightImportance::Important, LightType::Directional);
        let important_point =
            drawable_light_penalty(123.0, LightImportance::Important, LightType::Point);
        assert_eq!(important_directional, -2.0);
        assert_eq!(important_point, -1.0);

        // Important < Auto < NotImportant for every input.
        for &penalty in &intensity_penalties {
            let auto =
                drawable_light_penalty(penalty, LightImportance::Auto, LightType::Spot);
            assert!(important_point < auto);
        }
    }

    #[test]
    fn auto_band_saturates_smoothly() {
        let near = drawable_light_penalty(1.0, LightImportance::Auto, LightType::Point);
        let far = drawable_light_penalty(10.0, LightImportance::Auto, LightType::Point);
        let very_far = drawable_light_penalty(1000.0, LightImportance::Auto, LightType::Point);
        assert_eq!(near, 1.0);
        assert!(near < far && far < very_far && very_far < 2.0);
    }

    #[test]
    fn perspective_shadow_extrusion_grows_the_box() {
        // A box behind the frustum whose extruded shadow reaches it.
        let frustum = crate::math::Frustum::perspective(
            90_f32.to_radians(),
            1.0,
            1.0,
            0.1,
            100.0,
            &glam::Mat4::IDENTITY,
        );
        let near_box =
            BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -0.05), Vec3::splat(0.01));
        assert!(is_box_shadow_in_perspective_frustum(&near_box, &frustum, 100.0));

        let side_box =
            BoundingBox::from_center_half_size(Vec3::new(500.0, 0.0, 0.0), Vec3::splat(0.01));
        assert!(!is_box_shadow_in_perspective_frustum(&side_box, &frustum, 100.0));
    }
}
