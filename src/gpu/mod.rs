//! Capability interface between the stage pipeline and a graphics API.
//!
//! The pipeline never talks to a device directly. It allocates resources and
//! records a frame through [`GraphicsBackend`]:
//!
//! ```text
//! begin_frame
//!   begin_stage(pass)  draw* end_stage  [resolve_framebuffer]
//!   ...
//! end_frame | abort_frame
//! ```
//!
//! Every [`StagePass`] carries the complete fixed-function state of the
//! stage, so a backend never has to remember what a previous stage left
//! behind.

pub mod headless;
pub mod wgpu_backend;

pub use headless::{GpuCommand, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;

use glam::Mat4;

use crate::asset::TextureData;
use crate::error::{RenderError, Result};
use crate::renderer::lights::LightKind;
use crate::renderer::uniforms::{CameraUniform, PARAMETER_SLOTS};
use crate::renderer::vertex::Vertex;

/// Upper bound on color attachments per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: u32 = 8;
/// Texture slots available to a single draw.
pub const MAX_TEXTURE_UNITS: usize = 8;

macro_rules! gpu_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

gpu_id!(
    /// Opaque framebuffer name issued by a backend.
    FramebufferId,
    /// Vertex + index + bone block of one drawable.
    GeometryId,
    /// Compiled shader program.
    ProgramId,
    /// Sampled 2D texture.
    TextureId,
);

/// Shape of a framebuffer. Attachment order is plain colors first, then
/// alpha colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferDescriptor {
    pub width: u32,
    pub height: u32,
    /// High-precision color attachments.
    pub plain_color_count: u32,
    /// 8-bit RGBA attachments.
    pub alpha_color_count: u32,
    /// Layers of the depth array texture, 0 for none.
    pub depth_array_layers: u32,
    pub depth_stencil: bool,
    /// 1 for single-sample framebuffers.
    pub sample_count: u32,
}

impl FramebufferDescriptor {
    pub fn color_count(&self) -> u32 {
        self.plain_color_count + self.alpha_color_count
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    /// Checks the request itself. Runs before anything is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::ZeroSizedFramebuffer {
                width: self.width,
                height: self.height,
            });
        }
        if self.depth_array_layers > 0 && self.depth_stencil {
            return Err(RenderError::ConflictingDepthAttachments {
                layers: self.depth_array_layers,
            });
        }
        Ok(())
    }

    /// Completeness as a device would judge it.
    pub fn check_complete(&self, max_color_attachments: u32) -> Result<()> {
        let reason = if self.color_count() == 0
            && !self.depth_stencil
            && self.depth_array_layers == 0
        {
            "no attachments".to_string()
        } else if self.color_count() > max_color_attachments {
            format!(
                "{} color attachments exceed the limit of {}",
                self.color_count(),
                max_color_attachments
            )
        } else if self.depth_array_layers > 0 && self.is_multisampled() {
            "depth arrays cannot be multisampled".to_string()
        } else {
            return Ok(());
        };
        Err(RenderError::IncompleteFramebuffer { reason })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilFunction {
    Never,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
}

/// Operation applied to the stencil value when both tests pass. Failing
/// fragments always keep the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Replace,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub function: StencilFunction,
    pub operation: StencilOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Replace,
    Additive,
}

/// Fixed-function state a stage sets explicitly before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub depth_write: bool,
    /// `None` disables the stencil test.
    pub stencil: Option<StencilState>,
    pub face_culling: bool,
    pub multisample: bool,
    pub blend: BlendMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOps {
    /// Clear color, `None` keeps existing contents.
    pub color: Option<[f32; 4]>,
    pub depth: bool,
    pub stencil: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Screen,
    Framebuffer(FramebufferId),
}

/// Depth (and stencil) surface attached while a stage draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthAttachment {
    None,
    /// The default depth/stencil buffer of the screen.
    Screen,
    /// Combined depth/stencil surface of a framebuffer.
    Surface(FramebufferId),
    /// Depth array of a framebuffer; each draw names its layer.
    Layers(FramebufferId),
}

/// Everything the backend needs to open a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePass {
    pub label: String,
    pub target: RenderTarget,
    pub depth: DepthAttachment,
    pub clear: ClearOps,
    pub state: RasterState,
    pub stencil_reference: u32,
    /// Pixel rectangle `[x, y, width, height]`.
    pub viewport: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBinding {
    /// Slot left to the backend's fallback texture.
    Unbound,
    Texture(TextureId),
    FramebufferColor {
        framebuffer: FramebufferId,
        attachment: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub geometry: GeometryId,
    pub topology: Topology,
    pub model: Mat4,
    pub params: [[f32; 4]; PARAMETER_SLOTS],
    /// Bound to texture slots in order, at most [`MAX_TEXTURE_UNITS`].
    pub textures: Vec<TextureBinding>,
    pub depth_array: Option<FramebufferId>,
    /// Overrides the pass reference for this draw.
    pub stencil_reference: Option<u32>,
    /// Depth-array layer written when the pass uses [`DepthAttachment::Layers`].
    pub layer: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgramDescriptor<'a> {
    pub name: &'a str,
    pub source: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryData<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub bones: &'a [Mat4],
}

pub trait GraphicsBackend {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId>;
    /// Replaces every attachment of `id`, keeping the id.
    fn recreate_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDescriptor)
        -> Result<()>;
    fn destroy_framebuffer(&mut self, id: FramebufferId);
    /// Blits the multisampled attachments into their single-sample twins.
    fn resolve_framebuffer(&mut self, id: FramebufferId) -> Result<()>;

    fn compile_program(&mut self, desc: &ProgramDescriptor<'_>) -> Result<ProgramId>;

    fn create_geometry(&mut self, data: &GeometryData<'_>) -> Result<GeometryId>;
    fn reload_geometry(&mut self, id: GeometryId, data: &GeometryData<'_>) -> Result<()>;
    fn destroy_geometry(&mut self, id: GeometryId);

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId>;
    fn destroy_texture(&mut self, id: TextureId);

    /// Partial write into the light table of `kind`.
    fn write_light_slots(&mut self, kind: LightKind, offset: u64, bytes: &[u8]);
    fn write_camera(&mut self, camera: &CameraUniform);
    fn resize_screen(&mut self, width: u32, height: u32) -> Result<()>;

    fn begin_frame(&mut self) -> Result<()>;
    fn begin_stage(&mut self, pass: StagePass) -> Result<()>;
    fn draw(&mut self, call: DrawCall) -> Result<()>;
    fn end_stage(&mut self) -> Result<()>;
    fn end_frame(&mut self) -> Result<()>;
    /// Drops whatever the current frame recorded.
    fn abort_frame(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FramebufferDescriptor {
        FramebufferDescriptor {
            width: 64,
            height: 64,
            plain_color_count: 0,
            alpha_color_count: 1,
            depth_array_layers: 0,
            depth_stencil: true,
            sample_count: 1,
        }
    }

    #[test]
    fn layers_and_depth_stencil_conflict() {
        let desc = FramebufferDescriptor {
            depth_array_layers: 2,
            ..descriptor()
        };
        assert_eq!(
            desc.validate(),
            Err(RenderError::ConflictingDepthAttachments { layers: 2 })
        );
    }

    #[test]
    fn empty_framebuffer_is_incomplete() {
        let desc = FramebufferDescriptor {
            alpha_color_count: 0,
            depth_stencil: false,
            ..descriptor()
        };
        assert!(desc.validate().is_ok());
        assert!(matches!(
            desc.check_complete(MAX_COLOR_ATTACHMENTS),
            Err(RenderError::IncompleteFramebuffer { .. })
        ));
    }

    #[test]
    fn color_limit_is_enforced() {
        let desc = FramebufferDescriptor {
            plain_color_count: 6,
            alpha_color_count: 3,
            ..descriptor()
        };
        assert!(desc.check_complete(MAX_COLOR_ATTACHMENTS).is_err());
        assert!(descriptor().check_complete(MAX_COLOR_ATTACHMENTS).is_ok());
    }
}
