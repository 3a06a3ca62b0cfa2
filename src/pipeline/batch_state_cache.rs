use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gfx::PipelineState;
use crate::math::hashing::combine_hash;
use crate::scene::{Camera, GeometryId, GeometryType, MaterialId, PassId, Scene};

use super::light_processor::LightProcessor;

/// Key used to look up cached pipeline states.
///
/// Pipeline state creation may depend only on values that contribute to this
/// key: hashes and identities, never live object state, because lookup runs
/// concurrently from worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchStateLookupKey {
    pub drawable_hash: u32,
    pub pixel_light_hash: u32,
    pub geometry_type: GeometryType,
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub pass: PassId,
}

impl BatchStateLookupKey {
    pub fn to_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.drawable_hash);
        combine_hash(&mut hash, self.pixel_light_hash);
        combine_hash(&mut hash, self.geometry_type.as_u32());
        combine_hash(&mut hash, self.geometry.0);
        combine_hash(&mut hash, self.material.0);
        combine_hash(&mut hash, self.pass.index() as u32);
        hash
    }
}

/// Key used to create pipeline states on a cache miss. Carries the lookup key
/// plus the object references and current content hashes the creation
/// callback needs. Main-thread only.
#[derive(Debug, Clone, Copy)]
pub struct BatchStateCreateKey {
    pub lookup: BatchStateLookupKey,
    pub drawable_index: u32,
    pub source_batch_index: u32,
    /// Ordinal of the per-pixel light in the visible-light list.
    pub light_ordinal: Option<u32>,
    /// Content hashes at the time of the request, used to detect stale
    /// cache entries without a full rebuild.
    pub geometry_hash: u32,
    pub material_hash: u32,
    pub pass_hash: u32,
}

/// External context available to the creation callback.
pub struct BatchStateCreateContext<'a> {
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub shader_defines: &'a str,
    pub light: Option<&'a LightProcessor>,
    pub shadow_pass: bool,
}

pub trait BatchStateCacheCallback {
    /// Create the pipeline state for the key, or None on failure. Failures
    /// are cached as negative results so they are not retried every frame.
    fn create_batch_pipeline_state(
        &mut self,
        key: &BatchStateCreateKey,
        ctx: &BatchStateCreateContext<'_>,
    ) -> Option<Arc<PipelineState>>;
}

struct CachedBatchState {
    geometry_hash: u32,
    material_hash: u32,
    pass_hash: u32,
    /// None is a cached creation failure; it stays until `invalidate`.
    state: Option<Arc<PipelineState>>,
    /// Readers must observe invalidation from any thread without locking.
    /// Acquire pairs with the release store after (re)creation; it orders
    /// only the validity check, not the state's internal fields, which are
    /// written once at creation and never mutated after being published.
    invalidated: AtomicBool,
}

/// Pipeline-state cache with a thread-safe read path and a single-threaded
/// creation path. Callers run lookups from the parallel batch-collection
/// phase and serialize all `get_or_create` calls afterwards; the split is a
/// call-path convention, not a lock.
#[derive(Default)]
pub struct BatchStateCache {
    cache: HashMap<BatchStateLookupKey, CachedBatchState>,
}

impl BatchStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached state. Called when global rendering state changes.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Thread-safe read-only lookup. Never creates. A non-null result is
    /// valid at the moment of return.
    pub fn get_pipeline_state(&self, key: &BatchStateLookupKey) -> Option<Arc<PipelineState>> {
        let entry = self.cache.get(key)?;
        if entry.invalidated.load(Ordering::Acquire) {
            return None;
        }
        entry.state.clone()
    }

    /// Return the cached state or create it through the callback. Not thread
    /// safe. Stale entries (content hashes drifted since caching) and
    /// invalidated entries are recreated; cached failures are returned as-is.
    pub fn get_or_create_pipeline_state(
        &mut self,
        key: &BatchStateCreateKey,
        ctx: &BatchStateCreateContext<'_>,
        callback: &mut dyn BatchStateCacheCallback,
    ) -> Option<Arc<PipelineState>> {
        if let Some(entry) = self.cache.get(&key.lookup) {
            let stale = entry.geometry_hash != key.geometry_hash
                || entry.material_hash != key.material_hash
                || entry.pass_hash != key.pass_hash;
            if !stale && !entry.invalidated.load(Ordering::Acquire) {
                return entry.state.clone();
            }
        }

        let state = callback.create_batch_pipeline_state(key, ctx);
        let entry = CachedBatchState {
            geometry_hash: key.geometry_hash,
            material_hash: key.material_hash,
            pass_hash: key.pass_hash,
            state: state.clone(),
            invalidated: AtomicBool::new(false),
        };
        self.cache.insert(key.lookup, entry);
        state
    }
}
