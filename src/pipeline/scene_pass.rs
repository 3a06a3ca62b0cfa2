use rayon::prelude::*;

use crate::scene::{
    GeometryId, GeometryType, Material, MaterialId, PassId, PassRegistry, Scene, SourceBatch,
    Technique,
};

use super::batch::{
    BatchGroup, PipelineBatch, PipelineBatchBackToFront, PipelineBatchByState,
};
use super::batch_state_cache::{
    BatchStateCache, BatchStateCacheCallback, BatchStateCreateContext, BatchStateCreateKey,
    BatchStateLookupKey,
};
use super::drawable_processor::DrawableProcessor;
use super::frame::FrameContext;
use super::light_processor::LightProcessor;

/// One (drawable, source batch) tuple accepted by a scene pass, with the
/// material passes it resolved to. Produced during visibility classification,
/// consumed by batch collection.
#[derive(Debug, Clone, Copy)]
pub struct GeometryBatch {
    pub drawable_index: u32,
    pub source_batch_index: u32,
    pub material: MaterialId,
    pub geometry: GeometryId,
    pub geometry_type: GeometryType,
    pub render_order: u8,
    pub distance: f32,
    pub unlit_base_pass: PassId,
    pub lit_base_pass: Option<PassId>,
    pub light_pass: Option<PassId>,
}

/// Per-category sort strategy; the collection core is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSortMode {
    /// State-change minimization: pipeline identity, material, geometry,
    /// front to back.
    OpaqueByState,
    /// Strict depth order for blending correctness.
    BackToFront,
}

fn normalize_shader_define(define: &str) -> String {
    if define.is_empty() || define.ends_with(' ') {
        define.to_owned()
    } else {
        format!("{} ", define)
    }
}

/// Collects per-drawable geometry batches into unlit-base, lit-base, and
/// per-light batch lists, each backed by its own pipeline-state cache.
///
/// Lookup runs in the parallel collection phase; creation-on-miss is resolved
/// sequentially afterwards through the cache callback.
pub struct ScenePass {
    need_ambient: bool,
    sort_mode: BatchSortMode,
    unlit_base_pass: PassId,
    lit_base_pass: Option<PassId>,
    light_pass: Option<PassId>,
    unlit_base_tag: String,
    lit_base_tag: String,
    light_tag: String,

    unlit_intake: Vec<GeometryBatch>,
    lit_intake: Vec<GeometryBatch>,

    unlit_base_cache: BatchStateCache,
    lit_base_cache: BatchStateCache,
    light_cache: BatchStateCache,

    unlit_base_batches: Vec<PipelineBatch>,
    lit_base_batches: Vec<PipelineBatch>,
    light_batches: Vec<PipelineBatch>,

    sorted_unlit_base: Vec<PipelineBatchByState>,
    sorted_lit_base: Vec<PipelineBatchByState>,
    sorted_light: Vec<PipelineBatchByState>,
    sorted_back_to_front: Vec<PipelineBatchBackToFront>,
}

impl ScenePass {
    /// Forward-lit pass: unlit base, lit base, and additive light passes.
    pub fn forward(
        registry: &mut PassRegistry,
        tag: &str,
        unlit_base: &str,
        lit_base: &str,
        light: &str,
        sort_mode: BatchSortMode,
    ) -> Self {
        Self {
            need_ambient: true,
            sort_mode,
            unlit_base_pass: registry.get_or_register(unlit_base),
            lit_base_pass: Some(registry.get_or_register(lit_base)),
            light_pass: Some(registry.get_or_register(light)),
            unlit_base_tag: normalize_shader_define(&format!("{0} {0}_UNLIT", tag)),
            lit_base_tag: normalize_shader_define(&format!("{0} {0}_LITBASE", tag)),
            light_tag: normalize_shader_define(&format!("{0} {0}_LIGHT", tag)),
            unlit_intake: Vec::new(),
            lit_intake: Vec::new(),
            unlit_base_cache: BatchStateCache::new(),
            lit_base_cache: BatchStateCache::new(),
            light_cache: BatchStateCache::new(),
            unlit_base_batches: Vec::new(),
            lit_base_batches: Vec::new(),
            light_batches: Vec::new(),
            sorted_unlit_base: Vec::new(),
            sorted_lit_base: Vec::new(),
            sorted_light: Vec::new(),
            sorted_back_to_front: Vec::new(),
        }
    }

    /// Pass without lighting; everything goes through the unlit base path.
    pub fn unlit(
        registry: &mut PassRegistry,
        tag: &str,
        pass: &str,
        sort_mode: BatchSortMode,
    ) -> Self {
        Self {
            need_ambient: false,
            sort_mode,
            unlit_base_pass: registry.get_or_register(pass),
            lit_base_pass: None,
            light_pass: None,
            unlit_base_tag: normalize_shader_define(tag),
            lit_base_tag: String::new(),
            light_tag: String::new(),
            unlit_intake: Vec::new(),
            lit_intake: Vec::new(),
            unlit_base_cache: BatchStateCache::new(),
            lit_base_cache: BatchStateCache::new(),
            light_cache: BatchStateCache::new(),
            unlit_base_batches: Vec::new(),
            lit_base_batches: Vec::new(),
            light_batches: Vec::new(),
            sorted_unlit_base: Vec::new(),
            sorted_lit_base: Vec::new(),
            sorted_light: Vec::new(),
            sorted_back_to_front: Vec::new(),
        }
    }

    pub fn need_ambient(&self) -> bool {
        self.need_ambient
    }

    pub fn begin_frame(&mut self) {
        self.unlit_intake.clear();
        self.lit_intake.clear();
        self.unlit_base_batches.clear();
        self.lit_base_batches.clear();
        self.light_batches.clear();
        self.sorted_unlit_base.clear();
        self.sorted_lit_base.clear();
        self.sorted_light.clear();
        self.sorted_back_to_front.clear();
    }

    pub fn invalidate_pipeline_state_cache(&mut self) {
        self.unlit_base_cache.invalidate();
        self.lit_base_cache.invalidate();
        self.light_cache.invalidate();
    }

    /// Resolve the technique's passes against this scene pass. Thread-safe.
    ///
    /// A technique without the unlit base pass is rejected entirely. The lit
    /// base pass is used only together with a light pass; otherwise the unlit
    /// base pass serves both rendering paths.
    #[allow(clippy::too_many_arguments)]
    pub fn classify(
        &self,
        drawable_index: u32,
        source_batch_index: u32,
        material_id: MaterialId,
        material: &Material,
        source: &SourceBatch,
        technique: &Technique,
        distance: f32,
    ) -> Option<GeometryBatch> {
        technique.pass(self.unlit_base_pass)?;

        let light_pass = self
            .light_pass
            .filter(|&id| technique.pass(id).is_some());
        let lit_base_pass = light_pass
            .and(self.lit_base_pass)
            .filter(|&id| technique.pass(id).is_some());

        Some(GeometryBatch {
            drawable_index,
            source_batch_index,
            material: material_id,
            geometry: source.geometry,
            geometry_type: source.geometry_type,
            render_order: material.render_order,
            distance,
            unlit_base_pass: self.unlit_base_pass,
            lit_base_pass,
            light_pass,
        })
    }

    /// Commit one classified batch. Sequential phase only.
    pub fn add_geometry_batch(&mut self, batch: GeometryBatch) {
        if batch.light_pass.is_some() {
            self.lit_intake.push(batch);
        } else {
            self.unlit_intake.push(batch);
        }
    }

    /// Turn the intake lists into pipeline batches. Cache lookups run in
    /// parallel; misses are resolved sequentially through the callback. The
    /// primary pixel light equal to the frame's main light folds into the
    /// lit-base batch; remaining pixel lights emit additive light batches.
    pub fn collect_scene_batches(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        main_light: Option<u32>,
        lights: &[&LightProcessor],
        callback: &mut dyn BatchStateCacheCallback,
    ) {
        self.collect_unlit_batches(ctx, drawable_processor, callback);
        self.collect_lit_batches(ctx, drawable_processor, main_light, lights, callback);
    }

    fn collect_unlit_batches(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        callback: &mut dyn BatchStateCacheCallback,
    ) {
        let results: Vec<(PipelineBatch, bool)> = {
            let cache = &self.unlit_base_cache;
            self.unlit_intake
                .par_iter()
                .map(|intake| {
                    build_pipeline_batch(
                        intake,
                        intake.unlit_base_pass,
                        None,
                        0,
                        cache,
                        drawable_processor,
                        ctx.scene,
                    )
                })
                .collect()
        };

        let mut dirty = Vec::new();
        self.unlit_base_batches.clear();
        for (batch, is_dirty) in results {
            if is_dirty {
                dirty.push(self.unlit_base_batches.len());
            }
            self.unlit_base_batches.push(batch);
        }

        for index in dirty {
            let key = self.create_key_for(ctx, drawable_processor, &self.unlit_base_batches[index], 0);
            let create_ctx = BatchStateCreateContext {
                scene: ctx.scene,
                camera: ctx.camera,
                shader_defines: &self.unlit_base_tag,
                light: None,
                shadow_pass: false,
            };
            let state =
                self.unlit_base_cache
                    .get_or_create_pipeline_state(&key, &create_ctx, callback);
            self.unlit_base_batches[index].pipeline_state = state;
        }
    }

    fn collect_lit_batches(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        main_light: Option<u32>,
        lights: &[&LightProcessor],
        callback: &mut dyn BatchStateCacheCallback,
    ) {
        type LitResult = (PipelineBatch, bool, Vec<(PipelineBatch, bool)>);
        let results: Vec<LitResult> = {
            let lit_base_cache = &self.lit_base_cache;
            let light_cache = &self.light_cache;
            self.lit_intake
                .par_iter()
                .map(|intake| {
                    let pixel_lights = drawable_processor
                        .geometry_lighting(intake.drawable_index)
                        .map(|accumulator| accumulator.pixel_lights())
                        .unwrap_or(&[]);

                    let has_lit_base = match main_light {
                        Some(main) => pixel_lights.first().map(|&(_, i)| i) == Some(main),
                        None => false,
                    };
                    let base_light = if has_lit_base { main_light } else { None };
                    let base_light_hash = base_light
                        .and_then(|ordinal| lights.get(ordinal as usize))
                        .map(|light| light.pipeline_state_hash())
                        .unwrap_or(0);

                    let base_pass = intake.lit_base_pass.unwrap_or(intake.unlit_base_pass);
                    let base = build_pipeline_batch(
                        intake,
                        base_pass,
                        base_light,
                        base_light_hash,
                        lit_base_cache,
                        drawable_processor,
                        ctx.scene,
                    );

                    let mut light_batches = Vec::new();
                    if let Some(light_pass) = intake.light_pass {
                        let skip = if has_lit_base { 1 } else { 0 };
                        for &(_, ordinal) in pixel_lights.iter().skip(skip) {
                            let Some(light) = lights.get(ordinal as usize) else {
                                continue;
                            };
                            light_batches.push(build_pipeline_batch(
                                intake,
                                light_pass,
                                Some(ordinal),
                                light.pipeline_state_hash(),
                                light_cache,
                                drawable_processor,
                                ctx.scene,
                            ));
                        }
                    }

                    (base.0, base.1, light_batches)
                })
                .collect()
        };

        let mut base_dirty = Vec::new();
        let mut light_dirty = Vec::new();
        self.lit_base_batches.clear();
        self.light_batches.clear();
        for (base, base_is_dirty, light_batches) in results {
            if base_is_dirty {
                base_dirty.push(self.lit_base_batches.len());
            }
            self.lit_base_batches.push(base);
            for (batch, is_dirty) in light_batches {
                if is_dirty {
                    light_dirty.push(self.light_batches.len());
                }
                self.light_batches.push(batch);
            }
        }

        for index in base_dirty {
            let batch_light = self.lit_base_batches[index].light_index;
            let light = batch_light.and_then(|ordinal| lights.get(ordinal as usize).copied());
            let light_hash = light.map(|l| l.pipeline_state_hash()).unwrap_or(0);
            let key =
                self.create_key_for(ctx, drawable_processor, &self.lit_base_batches[index], light_hash);
            let create_ctx = BatchStateCreateContext {
                scene: ctx.scene,
                camera: ctx.camera,
                shader_defines: &self.lit_base_tag,
                light,
                shadow_pass: false,
            };
            let state =
                self.lit_base_cache
                    .get_or_create_pipeline_state(&key, &create_ctx, callback);
            self.lit_base_batches[index].pipeline_state = state;
        }

        for index in light_dirty {
            let Some(ordinal) = self.light_batches[index].light_index else {
                continue;
            };
            let Some(light) = lights.get(ordinal as usize).copied() else {
                continue;
            };
            let key = self.create_key_for(
                ctx,
                drawable_processor,
                &self.light_batches[index],
                light.pipeline_state_hash(),
            );
            let create_ctx = BatchStateCreateContext {
                scene: ctx.scene,
                camera: ctx.camera,
                shader_defines: &self.light_tag,
                light: Some(light),
                shadow_pass: false,
            };
            let state = self
                .light_cache
                .get_or_create_pipeline_state(&key, &create_ctx, callback);
            self.light_batches[index].pipeline_state = state;
        }
    }

    fn create_key_for(
        &self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        batch: &PipelineBatch,
        pixel_light_hash: u32,
    ) -> BatchStateCreateKey {
        let (geometry_hash, material_hash, pass_hash) =
            content_hashes(ctx.scene, drawable_processor, batch);
        BatchStateCreateKey {
            lookup: BatchStateLookupKey {
                drawable_hash: drawable_processor
                    .drawable_pipeline_hash(ctx.scene, batch.drawable_index),
                pixel_light_hash,
                geometry_type: batch.geometry_type,
                geometry: batch.geometry,
                material: batch.material,
                pass: batch.pass,
            },
            drawable_index: batch.drawable_index,
            source_batch_index: batch.source_batch_index,
            light_ordinal: batch.light_index,
            geometry_hash,
            material_hash,
            pass_hash,
        }
    }

    pub fn sort_batches(&mut self) {
        match self.sort_mode {
            BatchSortMode::OpaqueByState => {
                self.sorted_unlit_base = by_state_entries(&self.unlit_base_batches);
                self.sorted_lit_base = by_state_entries(&self.lit_base_batches);
                self.sorted_light = by_state_entries(&self.light_batches);
                PipelineBatchByState::sort(&mut self.sorted_unlit_base);
                PipelineBatchByState::sort(&mut self.sorted_lit_base);
                PipelineBatchByState::sort(&mut self.sorted_light);
                self.sorted_back_to_front.clear();
            }
            BatchSortMode::BackToFront => {
                self.sorted_back_to_front.clear();
                for (group, batches) in [
                    (BatchGroup::UnlitBase, &self.unlit_base_batches),
                    (BatchGroup::LitBase, &self.lit_base_batches),
                    (BatchGroup::Light, &self.light_batches),
                ] {
                    for (index, batch) in batches.iter().enumerate() {
                        self.sorted_back_to_front.push(PipelineBatchBackToFront::new(
                            batch,
                            group,
                            index as u32,
                        ));
                    }
                }
                PipelineBatchBackToFront::sort(&mut self.sorted_back_to_front);
                self.sorted_unlit_base.clear();
                self.sorted_lit_base.clear();
                self.sorted_light.clear();
            }
        }
    }

    pub fn batch(&self, group: BatchGroup, index: u32) -> &PipelineBatch {
        match group {
            BatchGroup::UnlitBase => &self.unlit_base_batches[index as usize],
            BatchGroup::LitBase => &self.lit_base_batches[index as usize],
            BatchGroup::Light => &self.light_batches[index as usize],
        }
    }

    pub fn unlit_base_batches(&self) -> &[PipelineBatch] {
        &self.unlit_base_batches
    }

    pub fn lit_base_batches(&self) -> &[PipelineBatch] {
        &self.lit_base_batches
    }

    pub fn light_batches(&self) -> &[PipelineBatch] {
        &self.light_batches
    }

    pub fn sorted_unlit_base_batches(&self) -> &[PipelineBatchByState] {
        &self.sorted_unlit_base
    }

    pub fn sorted_lit_base_batches(&self) -> &[PipelineBatchByState] {
        &self.sorted_lit_base
    }

    pub fn sorted_light_batches(&self) -> &[PipelineBatchByState] {
        &self.sorted_light
    }

    pub fn sorted_alpha_batches(&self) -> &[PipelineBatchBackToFront] {
        &self.sorted_back_to_front
    }
}

fn by_state_entries(batches: &[PipelineBatch]) -> Vec<PipelineBatchByState> {
    batches
        .iter()
        .enumerate()
        .map(|(index, batch)| PipelineBatchByState::new(batch, index as u32))
        .collect()
}

pub(crate) fn content_hashes(
    scene: &Scene,
    drawable_processor: &DrawableProcessor,
    batch: &PipelineBatch,
) -> (u32, u32, u32) {
    let geometry_hash = scene
        .geometry(batch.geometry)
        .map(|geometry| geometry.state_hash())
        .unwrap_or(0);
    let (material_hash, pass_hash) = scene
        .material(batch.material)
        .map(|material| {
            let pass_hash = material
                .find_technique(drawable_processor.material_quality())
                .and_then(|technique| technique.pass(batch.pass))
                .map(|pass| pass.state_hash())
                .unwrap_or(0);
            (material.state_hash(), pass_hash)
        })
        .unwrap_or((0, 0));
    (geometry_hash, material_hash, pass_hash)
}

fn build_pipeline_batch(
    intake: &GeometryBatch,
    pass: PassId,
    light_ordinal: Option<u32>,
    pixel_light_hash: u32,
    cache: &BatchStateCache,
    drawable_processor: &DrawableProcessor,
    scene: &Scene,
) -> (PipelineBatch, bool) {
    let key = BatchStateLookupKey {
        drawable_hash: drawable_processor.drawable_pipeline_hash(scene, intake.drawable_index),
        pixel_light_hash,
        geometry_type: intake.geometry_type,
        geometry: intake.geometry,
        material: intake.material,
        pass,
    };
    let pipeline_state = cache.get_pipeline_state(&key);
    let dirty = pipeline_state.is_none();

    (
        PipelineBatch {
            light_index: light_ordinal,
            drawable_index: intake.drawable_index,
            source_batch_index: intake.source_batch_index,
            geometry_type: intake.geometry_type,
            geometry: intake.geometry,
            material: intake.material,
            pass,
            render_order: intake.render_order,
            distance: intake.distance,
            pipeline_state,
        },
        dirty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Pass;

    fn registry_and_pass() -> (PassRegistry, ScenePass) {
        let mut registry = PassRegistry::new();
        let pass = ScenePass::forward(
            &mut registry,
            "BASE",
            "base",
            "litbase",
            "light",
            BatchSortMode::OpaqueByState,
        );
        (registry, pass)
    }

    fn source() -> SourceBatch {
        SourceBatch {
            geometry: GeometryId(0),
            material: Some(MaterialId(0)),
            geometry_type: GeometryType::Static,
        }
    }

    #[test]
    fn technique_without_unlit_base_is_rejected() {
        let (registry, scene_pass) = registry_and_pass();
        let light = registry.find("light").unwrap();

        let technique = Technique::new().with_pass(light, Pass::opaque());
        let material = Material::new(technique.clone());
        assert!(scene_pass
            .classify(0, 0, MaterialId(0), &material, &source(), &technique, 1.0)
            .is_none());
    }

    #[test]
    fn lit_base_requires_a_light_pass() {
        let (registry, scene_pass) = registry_and_pass();
        let base = registry.find("base").unwrap();
        let litbase = registry.find("litbase").unwrap();
        let light = registry.find("light").unwrap();

        // Lit base present but no light pass: unlit path serves both.
        let technique = Technique::new()
            .with_pass(base, Pass::opaque())
            .with_pass(litbase, Pass::opaque());
        let material = Material::new(technique.clone());
        let batch = scene_pass
            .classify(0, 0, MaterialId(0), &material, &source(), &technique, 1.0)
            .unwrap();
        assert!(batch.light_pass.is_none());
        assert!(batch.lit_base_pass.is_none());

        let full = Technique::new()
            .with_pass(base, Pass::opaque())
            .with_pass(litbase, Pass::opaque())
            .with_pass(light, Pass::opaque());
        let material = Material::new(full.clone());
        let batch = scene_pass
            .classify(0, 0, MaterialId(0), &material, &source(), &full, 1.0)
            .unwrap();
        assert_eq!(batch.lit_base_pass, Some(litbase));
        assert_eq!(batch.light_pass, Some(light));
    }

    #[test]
    fn intake_splits_lit_and_unlit_batches() {
        let (registry, mut scene_pass) = registry_and_pass();
        let base = registry.find("base").unwrap();
        let light = registry.find("light").unwrap();

        let unlit_technique = Technique::new().with_pass(base, Pass::opaque());
        let lit_technique = Technique::new()
            .with_pass(base, Pass::opaque())
            .with_pass(light, Pass::opaque());
        let material = Material::new(unlit_technique.clone());

        let unlit = scene_pass
            .classify(0, 0, MaterialId(0), &material, &source(), &unlit_technique, 1.0)
            .unwrap();
        let lit = scene_pass
            .classify(1, 0, MaterialId(0), &material, &source(), &lit_technique, 1.0)
            .unwrap();
        scene_pass.add_geometry_batch(unlit);
        scene_pass.add_geometry_batch(lit);

        assert_eq!(scene_pass.unlit_intake.len(), 1);
        assert_eq!(scene_pass.lit_intake.len(), 1);
    }
}
