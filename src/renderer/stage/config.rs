use bitflags::bitflags;

use crate::gpu::{BlendMode, StencilFunction, StencilOperation};
use crate::renderer::link::PipelineLink;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageFlags: u16 {
        const MULTISAMPLE   = 1 << 0;
        const STENCIL_TEST  = 1 << 1;
        const DEPTH_TEST    = 1 << 2;
        const FACE_CULLING  = 1 << 3;
        /// The stage owns a framebuffer.
        const FRAMEBUFFER   = 1 << 4;
        const CLEAR_COLOR   = 1 << 5;
        const CLEAR_DEPTH   = 1 << 6;
        const CLEAR_STENCIL = 1 << 7;
    }
}

impl Default for StageFlags {
    fn default() -> Self {
        StageFlags::DEPTH_TEST
            | StageFlags::FACE_CULLING
            | StageFlags::FRAMEBUFFER
            | StageFlags::CLEAR_COLOR
            | StageFlags::CLEAR_DEPTH
            | StageFlags::CLEAR_STENCIL
    }
}

/// The four relative references of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageLinks {
    /// Framebuffer whose color attachments are sampled.
    pub color: PipelineLink,
    /// Framebuffer whose depth/stencil surface is attached while drawing.
    pub depth_stencil: PipelineLink,
    /// Framebuffer whose depth array is sampled (shadow maps).
    pub depth_array: PipelineLink,
    /// Where the stage draws. A framebuffer-less stage drawing to itself
    /// draws to the screen.
    pub draw: PipelineLink,
}

/// Normalized viewport rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel rectangle on a `target_width` x `target_height` target.
    pub fn to_pixels(&self, target_width: u32, target_height: u32) -> [f32; 4] {
        let (w, h) = (target_width as f32, target_height as f32);
        [self.x * w, self.y * h, self.width * w, self.height * h]
    }
}

/// Construction-time description of a stage. Built with the `with_*`
/// methods and applied through the renderer, which reconciles the owned
/// framebuffer with the flags.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub flags: StageFlags,
    pub stencil_function: StencilFunction,
    pub stencil_reference: u32,
    pub stencil_operation: StencilOperation,
    pub blend: BlendMode,
    pub links: StageLinks,
    pub viewport: Viewport,
    /// Registry name of the program this stage draws with.
    pub program: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            flags: StageFlags::default(),
            stencil_function: StencilFunction::Always,
            stencil_reference: 0,
            stencil_operation: StencilOperation::Keep,
            blend: BlendMode::Replace,
            links: StageLinks::default(),
            viewport: Viewport::default(),
            program: None,
        }
    }
}

impl StageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, flag: StageFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn with_flag(mut self, flag: StageFlags, enabled: bool) -> Self {
        self.flags.set(flag, enabled);
        self
    }

    pub fn with_multisample(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::MULTISAMPLE, enabled)
    }

    /// Enables the stencil test against `reference`.
    pub fn with_stencil_test(mut self, function: StencilFunction, reference: u32) -> Self {
        self.stencil_function = function;
        self.stencil_reference = reference;
        self.with_flag(StageFlags::STENCIL_TEST, true)
    }

    pub fn with_stencil_operation(mut self, operation: StencilOperation) -> Self {
        self.stencil_operation = operation;
        self
    }

    pub fn with_depth_test(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::DEPTH_TEST, enabled)
    }

    pub fn with_face_culling(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::FACE_CULLING, enabled)
    }

    pub fn with_framebuffer(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::FRAMEBUFFER, enabled)
    }

    pub fn with_clear_color(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::CLEAR_COLOR, enabled)
    }

    pub fn with_clear_depth(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::CLEAR_DEPTH, enabled)
    }

    pub fn with_clear_stencil(self, enabled: bool) -> Self {
        self.with_flag(StageFlags::CLEAR_STENCIL, enabled)
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_color_link(mut self, link: PipelineLink) -> Self {
        self.links.color = link;
        self
    }

    pub fn with_depth_stencil_link(mut self, link: PipelineLink) -> Self {
        self.links.depth_stencil = link;
        self
    }

    pub fn with_depth_array_link(mut self, link: PipelineLink) -> Self {
        self.links.depth_array = link;
        self
    }

    pub fn with_draw_link(mut self, link: PipelineLink) -> Self {
        self.links.draw = link;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_program(mut self, name: impl Into<String>) -> Self {
        self.program = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_stage() {
        let config = StageConfig::default();
        assert!(config.has(StageFlags::DEPTH_TEST));
        assert!(config.has(StageFlags::FRAMEBUFFER));
        assert!(config.has(StageFlags::CLEAR_STENCIL));
        assert!(!config.has(StageFlags::MULTISAMPLE));
        assert!(!config.has(StageFlags::STENCIL_TEST));
        assert_eq!(config.links.draw, PipelineLink::Current);
        assert_eq!(config.stencil_function, StencilFunction::Always);
    }

    #[test]
    fn builder_toggles_flags() {
        let config = StageConfig::new()
            .with_framebuffer(false)
            .with_stencil_test(StencilFunction::Equal, 3)
            .with_color_link(PipelineLink::Previous);
        assert!(!config.has(StageFlags::FRAMEBUFFER));
        assert!(config.has(StageFlags::STENCIL_TEST));
        assert_eq!(config.stencil_reference, 3);
        assert_eq!(config.links.color, PipelineLink::Previous);
    }

    #[test]
    fn viewport_scales_to_target() {
        let viewport = Viewport::new(0.5, 0.0, 0.5, 1.0);
        assert_eq!(viewport.to_pixels(800, 600), [400.0, 0.0, 400.0, 600.0]);
    }
}
