pub mod batch;
pub mod batch_state_cache;
pub mod drawable_processor;
pub mod frame;
pub mod light_accumulator;
pub mod light_processor;
pub mod render_buffers;
pub mod scene_pass;
pub mod scene_processor;
pub mod shadow_atlas;
pub mod shadow_pass;
pub mod shadow_split;

pub use batch::{BatchGroup, PipelineBatch, PipelineBatchBackToFront, PipelineBatchByState};
pub use batch_state_cache::{
    BatchStateCache, BatchStateCacheCallback, BatchStateCreateContext, BatchStateCreateKey,
    BatchStateLookupKey,
};
pub use drawable_processor::{drawable_light_penalty, DrawableProcessor, GeometryRenderFlags};
pub use frame::{FrameContext, FrameInfo};
pub use light_accumulator::{AccumulatorContext, LightAccumulator};
pub use light_processor::{
    LightParametersRaw, LightProcessor, LightProcessorCache, LightShaderParameters,
    SPLIT_FRAMES_TO_LIVE, UNUSED_FRAMES_TO_LIVE,
};
pub use render_buffers::{
    OutputParams, RenderBufferManager, RenderBufferRef, RenderDevice, ViewportParams,
    ViewportRenderBufferFlags, MAX_RENDER_TARGETS,
};
pub use scene_pass::{BatchSortMode, GeometryBatch, ScenePass};
pub use scene_processor::{PipelineStateBuilder, SceneProcessor};
pub use shadow_atlas::ShadowMapAllocator;
pub use shadow_pass::ShadowScenePass;
pub use shadow_split::{ShadowSplit, CUBE_SHADOW_MAP_PADDING};
