use std::hash::{Hash, Hasher};

use crate::math::hashing::hash_u64;

/// Fixed-function and shader-selection state for one draw call. Plain data;
/// the submission layer turns it into an actual GPU pipeline object.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStateDesc {
    pub shader_defines: String,
    pub depth_compare: wgpu::CompareFunction,
    pub depth_write: bool,
    pub blend: Option<wgpu::BlendState>,
    pub cull_mode: Option<wgpu::Face>,
    pub color_write: bool,
    pub constant_depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub output_format: wgpu::TextureFormat,
    pub sample_count: u32,
}

impl Default for PipelineStateDesc {
    fn default() -> Self {
        Self {
            shader_defines: String::new(),
            depth_compare: wgpu::CompareFunction::LessEqual,
            depth_write: true,
            blend: None,
            cull_mode: Some(wgpu::Face::Back),
            color_write: true,
            constant_depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            output_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            sample_count: 1,
        }
    }
}

impl PipelineStateDesc {
    pub fn state_hash(&self) -> u32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.shader_defines.hash(&mut hasher);
        self.depth_compare.hash(&mut hasher);
        self.depth_write.hash(&mut hasher);
        self.blend.hash(&mut hasher);
        self.cull_mode.hash(&mut hasher);
        self.color_write.hash(&mut hasher);
        self.constant_depth_bias.hash(&mut hasher);
        self.slope_scaled_depth_bias.to_bits().hash(&mut hasher);
        self.output_format.hash(&mut hasher);
        self.sample_count.hash(&mut hasher);
        hash_u64(hasher.finish())
    }
}

/// Cached, immutable pipeline state. Identity (`id`) is unique per created
/// state and is what batch sorting keys on; the contents are written once at
/// creation and never mutated after being published.
#[derive(Debug)]
pub struct PipelineState {
    id: u32,
    shader_hash: u32,
    desc: PipelineStateDesc,
}

impl PipelineState {
    pub fn new(id: u32, desc: PipelineStateDesc) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        desc.shader_defines.hash(&mut hasher);
        let shader_hash = hash_u64(hasher.finish());
        Self {
            id,
            shader_hash,
            desc,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn shader_hash(&self) -> u32 {
        self.shader_hash
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_hash_tracks_content() {
        let a = PipelineStateDesc::default();
        let mut b = PipelineStateDesc::default();
        assert_eq!(a.state_hash(), b.state_hash());

        b.depth_write = false;
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn shader_hash_depends_only_on_defines() {
        let mut a = PipelineStateDesc::default();
        a.shader_defines = "BASE".into();
        let mut b = a.clone();
        b.depth_write = !b.depth_write;

        let state_a = PipelineState::new(0, a);
        let state_b = PipelineState::new(1, b);
        assert_eq!(state_a.shader_hash(), state_b.shader_hash());
    }
}
