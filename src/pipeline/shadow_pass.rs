use crate::scene::{PassId, PassRegistry};

use super::batch::{PipelineBatch, PipelineBatchByState};
use super::batch_state_cache::{
    BatchStateCache, BatchStateCacheCallback, BatchStateCreateContext, BatchStateCreateKey,
    BatchStateLookupKey,
};
use super::drawable_processor::DrawableProcessor;
use super::frame::FrameContext;
use super::light_processor::LightProcessor;
use super::scene_pass::content_hashes;
use super::shadow_split::ShadowSplit;

/// Dirty shadow batch location: (split index, batch index within the split).
pub type ShadowBatchRef = (usize, usize);

/// Collects shadow-caster batches into the shadow splits of each light,
/// sharing one pipeline-state cache across all lights and splits.
///
/// Collection is thread-safe (cache lookups only) and runs per light from
/// the parallel phase; dirty batches are resolved sequentially afterwards.
pub struct ShadowScenePass {
    shadow_pass: PassId,
    tag: String,
    cache: BatchStateCache,
}

impl ShadowScenePass {
    pub fn new(registry: &mut PassRegistry, tag: &str, pass: &str) -> Self {
        Self {
            shadow_pass: registry.get_or_register(pass),
            tag: if tag.is_empty() || tag.ends_with(' ') {
                tag.to_owned()
            } else {
                format!("{} ", tag)
            },
            cache: BatchStateCache::new(),
        }
    }

    pub fn invalidate_pipeline_state_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Build shadow batches for every split of one light. Casters failing
    /// the zone shadow mask are skipped, as are casters beyond their
    /// effective max shadow distance (the lesser of shadow distance and draw
    /// distance, when both are set).
    pub fn collect_shadow_batches(
        &self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        light_processor: &mut LightProcessor,
    ) -> Vec<ShadowBatchRef> {
        let mut dirty = Vec::new();
        let Some(light_drawable) = ctx.scene.drawable(light_processor.light_index()) else {
            return dirty;
        };
        let light_mask = light_drawable.light_mask;
        let quality = drawable_processor.material_quality();

        for split_index in 0..light_processor.num_splits() {
            let num_casters = light_processor.split(split_index).shadow_casters.len();
            for caster_ordinal in 0..num_casters {
                let drawable_index =
                    light_processor.split(split_index).shadow_casters[caster_ordinal];
                let Some(drawable) = ctx.scene.drawable(drawable_index) else {
                    continue;
                };

                // Zone-aware shadow mask; skip when the masked result is zero.
                if (drawable_processor.shadow_mask_in_zone(ctx.scene, drawable_index)
                    & light_mask)
                    == 0
                {
                    continue;
                }

                let mut max_shadow_distance = drawable.shadow_distance;
                let draw_distance = drawable.draw_distance;
                if draw_distance > 0.0
                    && (max_shadow_distance <= 0.0 || draw_distance < max_shadow_distance)
                {
                    max_shadow_distance = draw_distance;
                }
                if max_shadow_distance > 0.0
                    && drawable_processor.distance(drawable_index) > max_shadow_distance
                {
                    continue;
                }

                for (source_batch_index, source) in drawable.batches.iter().enumerate() {
                    let Some(material_id) = source.material.or(ctx.scene.default_material())
                    else {
                        continue;
                    };
                    let Some(material) = ctx.scene.material(material_id) else {
                        continue;
                    };
                    let Some(technique) = material.find_technique(quality) else {
                        continue;
                    };
                    if technique.pass(self.shadow_pass).is_none() {
                        continue;
                    }

                    let key = BatchStateLookupKey {
                        drawable_hash: drawable_processor
                            .drawable_pipeline_hash(ctx.scene, drawable_index),
                        pixel_light_hash: light_processor.split_pipeline_state_hash(split_index),
                        geometry_type: source.geometry_type,
                        geometry: source.geometry,
                        material: material_id,
                        pass: self.shadow_pass,
                    };
                    let pipeline_state = self.cache.get_pipeline_state(&key);
                    let is_dirty = pipeline_state.is_none();

                    let batch = PipelineBatch {
                        light_index: None,
                        drawable_index,
                        source_batch_index: source_batch_index as u32,
                        geometry_type: source.geometry_type,
                        geometry: source.geometry,
                        material: material_id,
                        pass: self.shadow_pass,
                        render_order: material.render_order,
                        distance: drawable_processor.distance(drawable_index),
                        pipeline_state,
                    };

                    let split = light_processor.split_mut(split_index);
                    if is_dirty {
                        dirty.push((split_index, split.shadow_batches.len()));
                    }
                    split.shadow_batches.push(batch);
                }
            }
        }

        dirty
    }

    /// Sequential creation-on-miss for every dirty shadow batch collected
    /// this frame. `dirty` entries are (light ordinal, split, batch).
    pub fn finalize_shadow_batches(
        &mut self,
        ctx: &FrameContext<'_>,
        drawable_processor: &DrawableProcessor,
        lights: &mut [Box<LightProcessor>],
        dirty: &[(usize, usize, usize)],
        callback: &mut dyn BatchStateCacheCallback,
    ) {
        for &(light_ordinal, split_index, batch_index) in dirty {
            let Some(light_processor) = lights.get_mut(light_ordinal) else {
                continue;
            };

            let split_hash = light_processor.split_pipeline_state_hash(split_index);
            let key = {
                let batch = &light_processor.split(split_index).shadow_batches[batch_index];
                let (geometry_hash, material_hash, pass_hash) =
                    content_hashes(ctx.scene, drawable_processor, batch);
                BatchStateCreateKey {
                    lookup: BatchStateLookupKey {
                        drawable_hash: drawable_processor
                            .drawable_pipeline_hash(ctx.scene, batch.drawable_index),
                        pixel_light_hash: split_hash,
                        geometry_type: batch.geometry_type,
                        geometry: batch.geometry,
                        material: batch.material,
                        pass: batch.pass,
                    },
                    drawable_index: batch.drawable_index,
                    source_batch_index: batch.source_batch_index,
                    light_ordinal: None,
                    geometry_hash,
                    material_hash,
                    pass_hash,
                }
            };

            let state = {
                let create_ctx = BatchStateCreateContext {
                    scene: ctx.scene,
                    camera: ctx.camera,
                    shader_defines: &self.tag,
                    light: Some(&**light_processor),
                    shadow_pass: true,
                };
                self.cache
                    .get_or_create_pipeline_state(&key, &create_ctx, callback)
            };
            light_processor.split_mut(split_index).shadow_batches[batch_index].pipeline_state =
                state;
        }
    }

    /// Submission order for one split, sorted by pipeline state.
    pub fn sorted_shadow_batches(&self, split: &ShadowSplit) -> Vec<PipelineBatchByState> {
        let mut entries: Vec<PipelineBatchByState> = split
            .shadow_batches
            .iter()
            .enumerate()
            .map(|(index, batch)| PipelineBatchByState::new(batch, index as u32))
            .collect();
        PipelineBatchByState::sort(&mut entries);
        entries
    }
}
