use crate::error::Result;
use crate::gpu::{FramebufferDescriptor, FramebufferId, GraphicsBackend};

/// Render target owned by exactly one stage.
///
/// Other stages only ever see it through a resolved link. The GPU side is
/// released with [`Framebuffer::destroy`]; dropping the value alone leaks
/// the backend resources, so owners route removal through the renderer.
#[derive(Debug, PartialEq)]
pub struct Framebuffer {
    id: FramebufferId,
    desc: FramebufferDescriptor,
}

impl Framebuffer {
    /// Validates `desc` and allocates it. A rejected request never reaches
    /// the backend.
    pub fn create(backend: &mut dyn GraphicsBackend, desc: FramebufferDescriptor) -> Result<Self> {
        desc.validate()?;
        let id = backend.create_framebuffer(&desc)?;
        log::info!(
            "Created framebuffer {:?}: {}x{}, {} plain + {} alpha colors, {} depth layers, depth/stencil {}, {}x samples",
            id,
            desc.width,
            desc.height,
            desc.plain_color_count,
            desc.alpha_color_count,
            desc.depth_array_layers,
            desc.depth_stencil,
            desc.sample_count
        );
        Ok(Self { id, desc })
    }

    /// Recreates every attachment at the new size. The id is unchanged.
    pub fn resize(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> Result<()> {
        if width == self.desc.width && height == self.desc.height {
            return Ok(());
        }
        self.reshape(
            backend,
            FramebufferDescriptor {
                width,
                height,
                ..self.desc
            },
        )
    }

    /// Recreates the attachments with a new shape under the same id.
    pub fn reshape(&mut self, backend: &mut dyn GraphicsBackend, desc: FramebufferDescriptor) -> Result<()> {
        desc.validate()?;
        backend.recreate_framebuffer(self.id, &desc)?;
        log::debug!("Recreated framebuffer {:?} as {:?}", self.id, desc);
        self.desc = desc;
        Ok(())
    }

    /// Copies multisampled contents into the sampled twin. No-op for
    /// single-sample framebuffers.
    pub fn resolve(&self, backend: &mut dyn GraphicsBackend) -> Result<bool> {
        if !self.desc.is_multisampled() {
            return Ok(false);
        }
        backend.resolve_framebuffer(self.id)?;
        Ok(true)
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        log::debug!("Destroying framebuffer {:?}", self.id);
        backend.destroy_framebuffer(self.id);
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn descriptor(&self) -> &FramebufferDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn color_count(&self) -> u32 {
        self.desc.color_count()
    }

    pub fn depth_array_layers(&self) -> u32 {
        self.desc.depth_array_layers
    }

    pub fn has_depth_array(&self) -> bool {
        self.desc.depth_array_layers > 0
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.desc.depth_stencil
    }

    pub fn is_multisampled(&self) -> bool {
        self.desc.is_multisampled()
    }
}
