use std::sync::Arc;

use glam::UVec2;
use rayon::prelude::*;

use crate::gfx::{PipelineState, PipelineStateDesc};
use crate::math::IntRect;
use crate::scene::{
    Camera, CameraOverrideFlags, DrawableFlags, LightImportance, LightType, MaterialQuality,
    PassRegistry, Scene,
};
use crate::settings::SceneProcessorSettings;

use super::batch_state_cache::{
    BatchStateCacheCallback, BatchStateCreateContext, BatchStateCreateKey,
};
use super::drawable_processor::DrawableProcessor;
use super::frame::{FrameContext, FrameInfo};
use super::light_processor::{LightProcessor, LightProcessorCache};
use super::scene_pass::{BatchSortMode, ScenePass};
use super::shadow_atlas::ShadowMapAllocator;
use super::shadow_pass::ShadowScenePass;

/// Default pipeline-state factory: derives a descriptor from the material
/// pass, the light state, and the global output parameters. The submission
/// layer turns the descriptor into an actual GPU object.
pub struct PipelineStateBuilder {
    next_id: u32,
    material_quality: MaterialQuality,
    output_format: wgpu::TextureFormat,
    sample_count: u32,
    shadow_format: wgpu::TextureFormat,
}

impl PipelineStateBuilder {
    pub fn new(settings: &SceneProcessorSettings) -> Self {
        Self {
            next_id: 0,
            material_quality: settings.drawable.material_quality.to_quality(),
            output_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            sample_count: settings.sample_count,
            shadow_format: settings.shadow.format(),
        }
    }

    pub fn apply_settings(&mut self, settings: &SceneProcessorSettings) {
        self.material_quality = settings.drawable.material_quality.to_quality();
        self.sample_count = settings.sample_count;
        self.shadow_format = settings.shadow.format();
    }

    pub fn set_output_format(&mut self, format: wgpu::TextureFormat) {
        self.output_format = format;
    }
}

impl BatchStateCacheCallback for PipelineStateBuilder {
    fn create_batch_pipeline_state(
        &mut self,
        key: &BatchStateCreateKey,
        ctx: &BatchStateCreateContext<'_>,
    ) -> Option<Arc<PipelineState>> {
        let material = ctx.scene.material(key.lookup.material)?;
        let technique = material.find_technique(self.material_quality)?;
        let pass = technique.pass(key.lookup.pass)?;

        let mut shader_defines = String::from(ctx.shader_defines);
        shader_defines.push_str(match key.lookup.geometry_type {
            crate::scene::GeometryType::Static => "GEOM_STATIC",
            crate::scene::GeometryType::Skinned => "GEOM_SKINNED",
            crate::scene::GeometryType::Instanced => "GEOM_INSTANCED",
            crate::scene::GeometryType::Billboard => "GEOM_BILLBOARD",
        });
        if let Some(light) = ctx.light {
            if light.has_shadow() && !ctx.shadow_pass {
                shader_defines.push_str(" SHADOW");
            }
        }

        let desc = if ctx.shadow_pass {
            let bias = ctx
                .light
                .and_then(|light| ctx.scene.drawable(light.light_index()))
                .and_then(|drawable| drawable.light.as_ref())
                .map(|light| light.bias)
                .unwrap_or_default();
            PipelineStateDesc {
                shader_defines,
                depth_compare: wgpu::CompareFunction::LessEqual,
                depth_write: true,
                blend: None,
                cull_mode: Some(wgpu::Face::Back),
                color_write: false,
                // Depth-bias units: fractions of the float-depth mantissa.
                constant_depth_bias: (bias.constant_bias * 8_388_608.0) as i32,
                slope_scaled_depth_bias: bias.slope_scaled_bias,
                output_format: self.shadow_format,
                sample_count: 1,
            }
        } else {
            PipelineStateDesc {
                shader_defines,
                depth_compare: wgpu::CompareFunction::LessEqual,
                depth_write: pass.depth_write,
                blend: pass.alpha_blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                cull_mode: Some(wgpu::Face::Back),
                color_write: true,
                constant_depth_bias: 0,
                slope_scaled_depth_bias: 0.0,
                output_format: self.output_format,
                sample_count: self.sample_count,
            }
        };

        self.next_id += 1;
        Some(Arc::new(PipelineState::new(self.next_id, desc)))
    }
}

/// Top-level per-frame driver: owns the drawable processor, the light
/// processor cache, the scene and shadow passes, and the shadow atlas, and
/// runs them through the fixed phase order with full barriers in between.
///
/// Light processors stay checked out until the next frame begins so the
/// renderer can consume this frame's splits and batches.
pub struct SceneProcessor {
    settings: SceneProcessorSettings,
    settings_hash: u32,
    frame_number: u64,

    drawable_processor: DrawableProcessor,
    light_cache: LightProcessorCache,
    light_processors: Vec<Box<LightProcessor>>,

    opaque_pass: ScenePass,
    alpha_pass: ScenePass,
    shadow_pass: ShadowScenePass,
    shadow_atlas: ShadowMapAllocator,
    state_builder: PipelineStateBuilder,

    main_light: Option<u32>,
    visible_drawables: Vec<u32>,
}

impl SceneProcessor {
    pub fn new(settings: SceneProcessorSettings, registry: &mut PassRegistry) -> Self {
        let settings = settings.validate();
        Self {
            settings_hash: settings.pipeline_state_hash(),
            frame_number: 0,
            drawable_processor: DrawableProcessor::new(settings.drawable.clone()),
            light_cache: LightProcessorCache::new(),
            light_processors: Vec::new(),
            opaque_pass: ScenePass::forward(
                registry,
                "BASE",
                "base",
                "litbase",
                "light",
                BatchSortMode::OpaqueByState,
            ),
            alpha_pass: ScenePass::forward(
                registry,
                "ALPHA",
                "alpha",
                "litalpha",
                "light",
                BatchSortMode::BackToFront,
            ),
            shadow_pass: ShadowScenePass::new(registry, "SHADOW", "shadow"),
            shadow_atlas: ShadowMapAllocator::new(settings.shadow.clone()),
            state_builder: PipelineStateBuilder::new(&settings),
            settings,
            main_light: None,
            visible_drawables: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SceneProcessorSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SceneProcessorSettings) {
        let settings = settings.validate();
        self.drawable_processor.set_settings(settings.drawable.clone());
        self.shadow_atlas.set_settings(settings.shadow.clone());
        self.state_builder.apply_settings(&settings);
        self.settings = settings;
        // The hash check at frame begin picks up state-affecting changes.
    }

    pub fn drawable_processor(&self) -> &DrawableProcessor {
        &self.drawable_processor
    }

    pub fn light_processors(&self) -> &[Box<LightProcessor>] {
        &self.light_processors
    }

    pub fn opaque_pass(&self) -> &ScenePass {
        &self.opaque_pass
    }

    pub fn alpha_pass(&self) -> &ScenePass {
        &self.alpha_pass
    }

    pub fn shadow_scene_pass(&self) -> &ShadowScenePass {
        &self.shadow_pass
    }

    /// Ordinal of the frame's main light in the visible-light list.
    pub fn main_light(&self) -> Option<u32> {
        self.main_light
    }

    pub fn invalidate_pipeline_states(&mut self) {
        self.opaque_pass.invalidate_pipeline_state_cache();
        self.alpha_pass.invalidate_pipeline_state_cache();
        self.shadow_pass.invalidate_pipeline_state_cache();
    }

    /// Adopt a new output surface format. Every cached pipeline state is keyed
    /// on it, so a change drops all of them.
    pub fn set_output_format(&mut self, format: wgpu::TextureFormat) {
        self.state_builder.set_output_format(format);
        self.invalidate_pipeline_states();
    }

    /// Run the whole per-frame pipeline: visibility, lighting, shadow-map
    /// allocation, queued updates, geometry updates, batch collection and
    /// sorting. `update_geometry` is invoked for drawables whose geometry
    /// buffers need refreshing (worker-safe updates run in parallel).
    pub fn update_frame<F: Fn(u32) + Sync>(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        viewport_rect: IntRect,
        update_geometry: F,
    ) {
        self.frame_number += 1;
        let info = FrameInfo {
            frame_number: self.frame_number,
            viewport_rect,
            num_threads: rayon::current_num_threads(),
        };
        let ctx = FrameContext::new(scene, camera, info);

        let settings_hash = self.settings.pipeline_state_hash();
        if settings_hash != self.settings_hash {
            self.settings_hash = settings_hash;
            self.invalidate_pipeline_states();
        }

        // Return last frame's processors before eviction runs.
        for processor in self.light_processors.drain(..) {
            self.light_cache.checkin(processor);
        }
        self.light_cache.begin_frame(scene, self.frame_number);

        // Phase 1: visibility classification.
        self.drawable_processor.on_update_begin(&ctx);
        self.opaque_pass.begin_frame();
        self.alpha_pass.begin_frame();

        let mut visible_drawables = std::mem::take(&mut self.visible_drawables);
        scene.query_frustum(
            &camera.frustum(),
            DrawableFlags::GEOMETRY | DrawableFlags::LIGHT,
            camera.view_mask,
            &mut visible_drawables,
        );
        {
            let mut passes = [&mut self.opaque_pass, &mut self.alpha_pass];
            self.drawable_processor
                .process_visible_drawables(&ctx, &visible_drawables, &mut passes);
        }
        self.visible_drawables = visible_drawables;

        // Phase 2: per-light processing, parallel across lights.
        let shadows_enabled = self.settings.shadow.enable_shadows
            && !camera
                .override_flags
                .contains(CameraOverrideFlags::DISABLE_SHADOWS);
        for &light_index in self.drawable_processor.visible_lights() {
            let mut processor = self.light_cache.checkout(light_index, self.frame_number);
            let has_shadow = shadows_enabled
                && scene
                    .drawable(light_index)
                    .and_then(|drawable| drawable.light.as_ref())
                    .map(|light| light.cast_shadows && light.shadow_intensity < 1.0)
                    .unwrap_or(false);
            processor.begin_update(&ctx, has_shadow);
            self.light_processors.push(processor);
        }

        {
            let drawable_processor = &self.drawable_processor;
            let shadow_settings = &self.settings.shadow;
            self.light_processors
                .par_iter_mut()
                .for_each(|processor| processor.update(&ctx, drawable_processor, shadow_settings));
        }

        // Phase 3: shadow-map ranking and allocation. Footprint descending
        // with identity ascending gives a bit-for-bit reproducible atlas
        // layout for identical scene state.
        self.shadow_atlas.reset();
        let mut allocation_order: Vec<usize> = (0..self.light_processors.len()).collect();
        allocation_order.sort_by(|&a, &b| {
            let size_a = self.light_processors[a].shadow_map_size();
            let size_b = self.light_processors[b].shadow_map_size();
            let footprint_a = size_a.x * size_a.x + size_a.y * size_a.y;
            let footprint_b = size_b.x * size_b.x + size_b.y * size_b.y;
            footprint_b.cmp(&footprint_a).then(
                self.light_processors[a]
                    .light_index()
                    .cmp(&self.light_processors[b].light_index()),
            )
        });

        for &ordinal in &allocation_order {
            let processor = &mut self.light_processors[ordinal];
            let Some(light) = scene
                .drawable(processor.light_index())
                .and_then(|drawable| drawable.light.clone())
            else {
                continue;
            };
            let size = processor.shadow_map_size();
            if processor.has_shadow() && size != UVec2::ZERO {
                let region = self.shadow_atlas.allocate(size);
                processor.set_shadow_map(region, &light);
            }
            processor.finalize_shader_parameters(&ctx, 0.0);
        }

        self.main_light = self.select_main_light(scene);

        // Phase 4: forward light accumulation.
        for ordinal in 0..self.light_processors.len() {
            self.drawable_processor.process_forward_lighting(
                &ctx,
                ordinal as u32,
                self.light_processors[ordinal].lit_geometries(),
            );
        }

        // Phase 5: shadow-only casters discovered by the light phase.
        let mut queued = Vec::new();
        for processor in &mut self.light_processors {
            queued.append(&mut processor.take_queued_updates());
        }
        self.drawable_processor.process_queued_drawables(&ctx, &queued);

        // Phase 6: geometry updates.
        self.drawable_processor.update_geometries(&ctx, update_geometry);

        // Phase 7: shadow batch collection (parallel lookups per light),
        // then sequential creation of missing pipeline states.
        let dirty_shadow_batches: Vec<(usize, usize, usize)> = {
            let shadow_pass = &self.shadow_pass;
            let drawable_processor = &self.drawable_processor;
            let per_light: Vec<Vec<(usize, usize, usize)>> = self
                .light_processors
                .par_iter_mut()
                .enumerate()
                .map(|(ordinal, processor)| {
                    shadow_pass
                        .collect_shadow_batches(&ctx, drawable_processor, processor)
                        .into_iter()
                        .map(|(split, batch)| (ordinal, split, batch))
                        .collect()
                })
                .collect();
            per_light.into_iter().flatten().collect()
        };
        self.shadow_pass.finalize_shadow_batches(
            &ctx,
            &self.drawable_processor,
            &mut self.light_processors,
            &dirty_shadow_batches,
            &mut self.state_builder,
        );

        // Phase 8: scene batch collection and sorting.
        {
            let light_views: Vec<&LightProcessor> =
                self.light_processors.iter().map(|boxed| &**boxed).collect();
            self.opaque_pass.collect_scene_batches(
                &ctx,
                &self.drawable_processor,
                self.main_light,
                &light_views,
                &mut self.state_builder,
            );
            self.alpha_pass.collect_scene_batches(
                &ctx,
                &self.drawable_processor,
                self.main_light,
                &light_views,
                &mut self.state_builder,
            );
        }

        self.opaque_pass.sort_batches();
        self.alpha_pass.sort_batches();
    }

    /// The frame's dominant light: a directional light with non-negative
    /// color, ranked by importance, then effective luminance, then lowest
    /// identity.
    fn select_main_light(&self, scene: &Scene) -> Option<u32> {
        let mut best: Option<(u32, f32, u32)> = None;
        let mut best_ordinal = None;

        for (ordinal, &light_index) in
            self.drawable_processor.visible_lights().iter().enumerate()
        {
            let Some(light) = scene
                .drawable(light_index)
                .and_then(|drawable| drawable.light.as_ref())
            else {
                continue;
            };
            if light.light_type != LightType::Directional {
                continue;
            }
            let color = light.effective_color();
            if color.min_element() < 0.0 {
                continue;
            }

            let importance_rank = match light.importance {
                LightImportance::Important => 2,
                LightImportance::Auto => 1,
                LightImportance::NotImportant => 0,
            };
            let luminance = color.x * 0.299 + color.y * 0.587 + color.z * 0.114;
            let candidate = (importance_rank, luminance, light_index);

            let better = match best {
                None => true,
                Some((rank, lum, index)) => {
                    candidate.0 > rank
                        || (candidate.0 == rank && candidate.1 > lum)
                        || (candidate.0 == rank && candidate.1 == lum && candidate.2 < index)
                }
            };
            if better {
                best = Some(candidate);
                best_ordinal = Some(ordinal as u32);
            }
        }

        best_ordinal
    }
}
