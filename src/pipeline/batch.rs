use std::cmp::Ordering;
use std::sync::Arc;

use crate::gfx::PipelineState;
use crate::scene::{GeometryId, GeometryType, MaterialId, PassId};

/// One draw operation: a drawable's source geometry combined with a material
/// pass and resolved pipeline state. A batch without a pipeline state is
/// carried through sorting but must be skipped at submission.
#[derive(Debug, Clone)]
pub struct PipelineBatch {
    /// Ordinal of the per-pixel light in the visible-light list, if this is a
    /// lit-base or additive light batch.
    pub light_index: Option<u32>,
    pub drawable_index: u32,
    pub source_batch_index: u32,
    pub geometry_type: GeometryType,
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub pass: PassId,
    pub render_order: u8,
    /// View distance of the owning drawable, for depth sorting.
    pub distance: f32,
    pub pipeline_state: Option<Arc<PipelineState>>,
}

/// Which batch list of a scene pass a sorted entry points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchGroup {
    UnlitBase,
    LitBase,
    Light,
}

/// Sort entry for opaque batches: render order, then shader, then pipeline
/// state identity, then material/geometry, then front to back. Minimizes GPU
/// state changes while keeping the order fully deterministic.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBatchByState {
    pipeline_state_key: u64,
    material_geometry_key: u64,
    distance: f32,
    pub index: u32,
}

impl PipelineBatchByState {
    pub fn new(batch: &PipelineBatch, index: u32) -> Self {
        let mut pipeline_state_key = 0u64;
        if let Some(state) = &batch.pipeline_state {
            // 8 bits render order, 32 bits shader variation, 24 bits state id.
            pipeline_state_key |= (batch.render_order as u64) << 56;
            pipeline_state_key |= (state.shader_hash() as u64) << 24;
            let id = state.id();
            pipeline_state_key |= ((id & 0xff_ffff) ^ (id >> 24)) as u64;
        }

        let material_geometry_key =
            ((batch.material.0 as u64) << 32) | batch.geometry.0 as u64;

        Self {
            pipeline_state_key,
            material_geometry_key,
            distance: batch.distance,
            index,
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        self.pipeline_state_key
            .cmp(&other.pipeline_state_key)
            .then(self.material_geometry_key.cmp(&other.material_geometry_key))
            .then(self.distance.total_cmp(&other.distance))
            .then(self.index.cmp(&other.index))
    }

    pub fn sort(entries: &mut [PipelineBatchByState]) {
        entries.sort_unstable_by(PipelineBatchByState::cmp);
    }
}

/// Sort entry for transparent batches: render order, then strictly back to
/// front. Blending correctness wins over state-change efficiency.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBatchBackToFront {
    render_order: u8,
    distance: f32,
    pub group: BatchGroup,
    pub index: u32,
}

impl PipelineBatchBackToFront {
    pub fn new(batch: &PipelineBatch, group: BatchGroup, index: u32) -> Self {
        Self {
            render_order: batch.render_order,
            distance: batch.distance,
            group,
            index,
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        self.render_order
            .cmp(&other.render_order)
            .then(other.distance.total_cmp(&self.distance))
            .then(self.index.cmp(&other.index))
    }

    pub fn sort(entries: &mut [PipelineBatchBackToFront]) {
        entries.sort_unstable_by(PipelineBatchBackToFront::cmp);
    }
}
