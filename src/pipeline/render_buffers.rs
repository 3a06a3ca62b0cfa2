use bitflags::bitflags;
use glam::UVec2;
use log::error;

use crate::gfx::TextureHandle;
use crate::math::IntRect;

pub const MAX_RENDER_TARGETS: usize = 4;

bitflags! {
    /// Capabilities the render pipeline requests from the viewport buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ViewportRenderBufferFlags: u16 {
        const INHERIT_COLOR_FORMAT = 1 << 0;
        const INHERIT_MULTI_SAMPLE_LEVEL = 1 << 1;
        const IS_READABLE_COLOR = 1 << 2;
        const IS_READABLE_DEPTH = 1 << 3;
        const HAS_STENCIL = 1 << 4;
        const SUPPORT_SIMULTANEOUS_READ_AND_WRITE = 1 << 5;
        const USABLE_WITH_MULTIPLE_RENDER_TARGETS = 1 << 6;
    }
}

/// Requested parameters of the viewport-sized buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportParams {
    pub format: wgpu::TextureFormat,
    pub multi_sample: u32,
    pub size: UVec2,
}

impl Default for ViewportParams {
    fn default() -> Self {
        Self {
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            multi_sample: 1,
            size: UVec2::ZERO,
        }
    }
}

/// Parameters of the output render surface for the current frame. A `None`
/// texture is the backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputParams {
    pub texture: Option<TextureHandle>,
    pub format: wgpu::TextureFormat,
    pub multi_sample: u32,
    pub size: UVec2,
    pub has_stencil: bool,
    pub readable_depth: bool,
}

/// Narrow GPU boundary used by the buffer manager; the submission layer (or
/// a test mock) implements it.
pub trait RenderDevice {
    fn create_texture(
        &mut self,
        label: &str,
        size: UVec2,
        format: wgpu::TextureFormat,
        multi_sample: u32,
    ) -> TextureHandle;
    /// Bind targets; `None` entries are backbuffer surfaces.
    fn bind_targets(
        &mut self,
        depth_stencil: Option<TextureHandle>,
        colors: &[Option<TextureHandle>],
        viewport: IntRect,
    );
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>, stencil: Option<u32>);
    /// Copy a texture into the destination; `None` is the backbuffer.
    fn copy_texture(&mut self, source: TextureHandle, destination: Option<TextureHandle>);
}

/// Logical buffer reference resolved by the manager at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBufferRef {
    OutputColor,
    OutputDepth,
    SubstituteColor(usize),
    SubstituteDepth,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedBuffer {
    texture: Option<TextureHandle>,
    size: UVec2,
    multi_sample: u32,
}

/// Allocates and rotates the viewport-sized render targets: the output
/// surface, up to two substitute color buffers (ping-pong for simultaneous
/// read+write), and a substitute depth buffer.
///
/// Substitutes are realized lazily on first need and kept until the viewport
/// parameters change, at which point every cached buffer (and all pipeline
/// states keyed on the output format) must be rebuilt.
pub struct RenderBufferManager {
    flags: ViewportRenderBufferFlags,
    params: ViewportParams,
    previous_params: Option<ViewportParams>,
    output: Option<OutputParams>,
    viewport_rect: IntRect,

    substitute_color: [Option<TextureHandle>; 2],
    substitute_depth: Option<TextureHandle>,

    color_is_substitute: bool,
    depth_is_substitute: bool,
    /// Ping-pong index of the writeable substitute color buffer.
    write_index: usize,
    has_secondary: bool,
}

impl Default for RenderBufferManager {
    fn default() -> Self {
        Self::new(ViewportRenderBufferFlags::empty())
    }
}

impl RenderBufferManager {
    pub fn new(flags: ViewportRenderBufferFlags) -> Self {
        Self {
            flags,
            params: ViewportParams::default(),
            previous_params: None,
            output: None,
            viewport_rect: IntRect::default(),
            substitute_color: [None, None],
            substitute_depth: None,
            color_is_substitute: false,
            depth_is_substitute: false,
            write_index: 0,
            has_secondary: false,
        }
    }

    pub fn set_flags(&mut self, flags: ViewportRenderBufferFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> ViewportRenderBufferFlags {
        self.flags
    }

    /// Re-evaluate buffer requirements for the frame's output surface.
    /// Returns true when cached buffers were dropped and re-realized, which
    /// also invalidates every pipeline state keyed on the output format.
    pub fn begin_frame(
        &mut self,
        device: &mut dyn RenderDevice,
        output: OutputParams,
        viewport_rect: IntRect,
    ) -> bool {
        self.output = Some(output);
        self.viewport_rect = viewport_rect;

        if self.flags.contains(ViewportRenderBufferFlags::INHERIT_COLOR_FORMAT) {
            self.params.format = output.format;
        }
        if self
            .flags
            .contains(ViewportRenderBufferFlags::INHERIT_MULTI_SAMPLE_LEVEL)
        {
            self.params.multi_sample = output.multi_sample;
        }
        self.params.size = output.size;

        let mut invalidated = false;
        if self.previous_params != Some(self.params) {
            self.previous_params = Some(self.params);
            self.substitute_color = [None, None];
            self.substitute_depth = None;
            invalidated = true;
        }

        let full_rect = viewport_rect.is_empty()
            || viewport_rect == IntRect::from_size(output.size);
        let is_simple_texture_output = output.texture.is_some() && full_rect;

        let need_readable_color = self.flags.contains(ViewportRenderBufferFlags::IS_READABLE_COLOR);
        let need_readable_depth = self.flags.contains(ViewportRenderBufferFlags::IS_READABLE_DEPTH);
        let need_stencil = self.flags.contains(ViewportRenderBufferFlags::HAS_STENCIL);
        let need_read_write = self
            .flags
            .contains(ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE);
        let need_mrt = self
            .flags
            .contains(ViewportRenderBufferFlags::USABLE_WITH_MULTIPLE_RENDER_TARGETS);

        let format_matching = output.format == self.params.format;
        let multi_sample_matching = output.multi_sample == self.params.multi_sample;

        let need_substitute_primary = !format_matching
            || !multi_sample_matching
            || ((need_readable_color || need_readable_depth || need_read_write)
                && !is_simple_texture_output)
            || (need_mrt && !is_simple_texture_output);
        let need_secondary = need_read_write;
        let need_substitute_depth = !multi_sample_matching
            || (need_readable_depth && (!output.readable_depth || !is_simple_texture_output))
            || (need_stencil && !output.has_stencil);

        if need_substitute_primary && self.substitute_color[0].is_none() {
            self.substitute_color[0] = Some(device.create_texture(
                "ViewportColor0",
                self.params.size,
                self.params.format,
                self.params.multi_sample,
            ));
        }
        if need_secondary && self.substitute_color[1].is_none() {
            self.substitute_color[1] = Some(device.create_texture(
                "ViewportColor1",
                self.params.size,
                self.params.format,
                self.params.multi_sample,
            ));
        }
        if need_substitute_depth && self.substitute_depth.is_none() {
            self.substitute_depth = Some(device.create_texture(
                "ViewportDepth",
                self.params.size,
                wgpu::TextureFormat::Depth24PlusStencil8,
                self.params.multi_sample,
            ));
        }

        self.color_is_substitute = need_substitute_primary || need_secondary;
        self.depth_is_substitute = need_substitute_depth;
        self.has_secondary = need_secondary;
        self.write_index = 0;

        invalidated
    }

    /// Swap the ping-pong color buffers so the last written image becomes
    /// readable while rendering continues into the other buffer. Requires the
    /// SUPPORT_SIMULTANEOUS_READ_AND_WRITE capability to have been declared.
    pub fn prepare_for_color_read_write(&mut self) {
        if !self
            .flags
            .contains(ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE)
        {
            error!(
                "Cannot prepare for color read/write without the \
                 SUPPORT_SIMULTANEOUS_READ_AND_WRITE flag"
            );
            debug_assert!(false, "missing SUPPORT_SIMULTANEOUS_READ_AND_WRITE");
            return;
        }
        self.write_index = 1 - self.write_index;
    }

    pub fn writeable_color_buffer(&self) -> RenderBufferRef {
        if self.color_is_substitute {
            RenderBufferRef::SubstituteColor(self.write_index)
        } else {
            RenderBufferRef::OutputColor
        }
    }

    /// The readable side of the ping-pong pair, once a swap has happened.
    pub fn readable_color_texture(&self) -> Option<TextureHandle> {
        if self.has_secondary {
            self.substitute_color[1 - self.write_index]
        } else {
            None
        }
    }

    pub fn depth_stencil_buffer(&self) -> RenderBufferRef {
        if self.depth_is_substitute {
            RenderBufferRef::SubstituteDepth
        } else {
            RenderBufferRef::OutputDepth
        }
    }

    fn resolve(&self, buffer: RenderBufferRef) -> Option<ResolvedBuffer> {
        let output = self.output?;
        match buffer {
            RenderBufferRef::OutputColor => Some(ResolvedBuffer {
                texture: output.texture,
                size: output.size,
                multi_sample: output.multi_sample,
            }),
            RenderBufferRef::OutputDepth => Some(ResolvedBuffer {
                texture: None,
                size: output.size,
                multi_sample: output.multi_sample,
            }),
            RenderBufferRef::SubstituteColor(index) => {
                let texture = *self.substitute_color.get(index)?;
                texture.map(|texture| ResolvedBuffer {
                    texture: Some(texture),
                    size: self.params.size,
                    multi_sample: self.params.multi_sample,
                })
            }
            RenderBufferRef::SubstituteDepth => {
                self.substitute_depth.map(|texture| ResolvedBuffer {
                    texture: Some(texture),
                    size: self.params.size,
                    multi_sample: self.params.multi_sample,
                })
            }
        }
    }

    /// Bind a depth-stencil buffer and color buffers for drawing. Invalid
    /// requests are reported and ignored; a bad bind must not abort the
    /// frame.
    pub fn set_render_targets(
        &self,
        device: &mut dyn RenderDevice,
        depth_stencil: Option<RenderBufferRef>,
        colors: &[RenderBufferRef],
    ) {
        let Some(depth_stencil) = depth_stencil else {
            error!("Depth-stencil buffer is missing");
            return;
        };
        let Some(depth) = self.resolve(depth_stencil) else {
            error!("Depth-stencil buffer is not realized");
            return;
        };

        if colors.len() > MAX_RENDER_TARGETS {
            error!(
                "Cannot set more than {} color render buffers",
                MAX_RENDER_TARGETS
            );
            return;
        }

        let mut color_textures = Vec::with_capacity(colors.len());
        for (index, &color) in colors.iter().enumerate() {
            let Some(resolved) = self.resolve(color) else {
                error!("Color render buffer #{} is not realized", index);
                return;
            };
            if resolved.size != depth.size || resolved.multi_sample != depth.multi_sample {
                error!(
                    "Depth-stencil is incompatible with color render buffer #{}",
                    index
                );
                return;
            }
            if resolved.texture.is_none() && index != 0 {
                error!("Backbuffer color can be bound only to slot #0");
                return;
            }
            color_textures.push(resolved.texture);
        }

        device.bind_targets(depth.texture, &color_textures, self.viewport_rect);
    }

    /// Bind the frame's writeable color output plus its depth-stencil.
    pub fn set_output_render_targets(&self, device: &mut dyn RenderDevice) {
        self.set_render_targets(
            device,
            Some(self.depth_stencil_buffer()),
            &[self.writeable_color_buffer()],
        );
    }

    pub fn clear_output(
        &self,
        device: &mut dyn RenderDevice,
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    ) {
        self.set_output_render_targets(device);
        device.clear(Some(color), Some(depth), Some(stencil));
    }

    /// Copy the substitute color result to the output surface at frame end.
    pub fn finish_frame(&self, device: &mut dyn RenderDevice) {
        if !self.color_is_substitute {
            return;
        }
        let Some(source) = self.substitute_color[self.write_index] else {
            return;
        };
        let destination = self.output.and_then(|output| output.texture);
        device.copy_texture(source, destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockDevice {
        next_texture: u64,
        created: Vec<String>,
        binds: Vec<(Option<TextureHandle>, Vec<Option<TextureHandle>>)>,
        clears: u32,
        copies: Vec<(TextureHandle, Option<TextureHandle>)>,
    }

    impl RenderDevice for MockDevice {
        fn create_texture(
            &mut self,
            label: &str,
            _size: UVec2,
            _format: wgpu::TextureFormat,
            _multi_sample: u32,
        ) -> TextureHandle {
            self.created.push(label.to_owned());
            self.next_texture += 1;
            TextureHandle::new(self.next_texture)
        }

        fn bind_targets(
            &mut self,
            depth_stencil: Option<TextureHandle>,
            colors: &[Option<TextureHandle>],
            _viewport: IntRect,
        ) {
            self.binds.push((depth_stencil, colors.to_vec()));
        }

        fn clear(&mut self, _color: Option<[f32; 4]>, _depth: Option<f32>, _stencil: Option<u32>) {
            self.clears += 1;
        }

        fn copy_texture(&mut self, source: TextureHandle, destination: Option<TextureHandle>) {
            self.copies.push((source, destination));
        }
    }

    fn backbuffer_output() -> OutputParams {
        OutputParams {
            texture: None,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            multi_sample: 1,
            size: UVec2::new(1280, 720),
            has_stencil: true,
            readable_depth: false,
        }
    }

    #[test]
    fn matching_output_needs_no_substitutes() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(
            ViewportRenderBufferFlags::INHERIT_COLOR_FORMAT
                | ViewportRenderBufferFlags::INHERIT_MULTI_SAMPLE_LEVEL,
        );

        manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());
        assert!(device.created.is_empty());
        assert_eq!(manager.writeable_color_buffer(), RenderBufferRef::OutputColor);
        assert_eq!(manager.depth_stencil_buffer(), RenderBufferRef::OutputDepth);
    }

    #[test]
    fn read_write_support_realizes_ping_pong_buffers() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(
            ViewportRenderBufferFlags::INHERIT_COLOR_FORMAT
                | ViewportRenderBufferFlags::INHERIT_MULTI_SAMPLE_LEVEL
                | ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE,
        );

        manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());
        assert_eq!(device.created.len(), 2);

        let write_before = manager.writeable_color_buffer();
        let read_before = manager.readable_color_texture();
        manager.prepare_for_color_read_write();
        assert_ne!(manager.writeable_color_buffer(), write_before);
        assert_ne!(manager.readable_color_texture(), read_before);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn read_write_without_flag_is_a_no_op() {
        let mut manager = RenderBufferManager::new(ViewportRenderBufferFlags::empty());
        let before = manager.writeable_color_buffer();
        manager.prepare_for_color_read_write();
        assert_eq!(manager.writeable_color_buffer(), before);
    }

    #[test]
    fn incompatible_color_buffer_is_rejected() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(
            ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE,
        );
        // Viewport params keep the default format, output differs, so the
        // substitute has different parameters than the output depth.
        let output = OutputParams {
            multi_sample: 4,
            ..backbuffer_output()
        };
        manager.begin_frame(&mut device, output, IntRect::default());

        manager.set_render_targets(
            &mut device,
            Some(RenderBufferRef::OutputDepth),
            &[RenderBufferRef::SubstituteColor(0)],
        );
        assert!(device.binds.is_empty());
    }

    #[test]
    fn missing_depth_stencil_is_rejected() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(ViewportRenderBufferFlags::empty());
        manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());

        manager.set_render_targets(&mut device, None, &[RenderBufferRef::OutputColor]);
        assert!(device.binds.is_empty());

        manager.set_output_render_targets(&mut device);
        assert_eq!(device.binds.len(), 1);
    }

    #[test]
    fn changed_viewport_params_invalidate_buffers() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(
            ViewportRenderBufferFlags::INHERIT_COLOR_FORMAT
                | ViewportRenderBufferFlags::INHERIT_MULTI_SAMPLE_LEVEL
                | ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE,
        );

        let first = manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());
        assert!(first);
        let again = manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());
        assert!(!again);

        let resized = OutputParams {
            size: UVec2::new(1920, 1080),
            ..backbuffer_output()
        };
        let changed = manager.begin_frame(&mut device, resized, IntRect::default());
        assert!(changed);
        // Buffers were re-realized at the new size.
        assert_eq!(device.created.len(), 4);
    }

    #[test]
    fn substitute_result_is_copied_to_output() {
        let mut device = MockDevice::default();
        let mut manager = RenderBufferManager::new(
            ViewportRenderBufferFlags::INHERIT_COLOR_FORMAT
                | ViewportRenderBufferFlags::INHERIT_MULTI_SAMPLE_LEVEL
                | ViewportRenderBufferFlags::SUPPORT_SIMULTANEOUS_READ_AND_WRITE,
        );
        manager.begin_frame(&mut device, backbuffer_output(), IntRect::default());

        manager.finish_frame(&mut device);
        assert_eq!(device.copies.len(), 1);
        assert_eq!(device.copies[0].1, None);
    }
}
