pub mod gfx;
pub mod math;
pub mod pipeline;
pub mod scene;
pub mod settings;

pub use pipeline::{
    BatchStateCache, BatchStateCacheCallback, BatchStateCreateContext, BatchStateCreateKey,
    BatchStateLookupKey, DrawableProcessor, FrameContext, FrameInfo, LightAccumulator,
    LightProcessor, LightProcessorCache, PipelineBatch, RenderBufferManager, ScenePass,
    SceneProcessor, ShadowMapAllocator, ShadowScenePass, ShadowSplit,
};
pub use settings::{DrawableProcessorSettings, SceneProcessorSettings, ShadowMapSettings};
