mod config;
mod execute;

pub use config::{StageConfig, StageFlags, StageLinks, Viewport};

use std::collections::BTreeMap;

use crate::asset::Handle;
use crate::error::{RenderError, Result};
use crate::gpu::{FramebufferDescriptor, GraphicsBackend};
use crate::renderer::framebuffer::Framebuffer;
use crate::renderer::shader::ShaderProgram;
use crate::renderer::uniforms::PARAMETER_SLOTS;

pub type StageHandle = Handle<RenderStage>;

/// What a stage draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Scene geometry shaded with each material's forward program.
    ForwardGeometry,
    /// Scene geometry written to the G-buffer, stamping each drawable's
    /// lighting-program stencil value.
    DeferredGeometry,
    /// Full-screen lighting pass over a G-buffer.
    Surface,
    /// Full-screen post-processing pass.
    Quad,
    /// Depth-only pass, one array layer per directional light.
    ShadowMap,
    /// World-space bounding box of every drawable as lines.
    BoundingBoxes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageClass {
    Geometry,
    Lighting,
    Post,
}

impl StageKind {
    pub fn class(self) -> StageClass {
        match self {
            StageKind::ForwardGeometry | StageKind::DeferredGeometry | StageKind::ShadowMap => {
                StageClass::Geometry
            }
            StageKind::Surface => StageClass::Lighting,
            StageKind::Quad | StageKind::BoundingBoxes => StageClass::Post,
        }
    }

    /// Program used when the config names none.
    pub fn default_program(self) -> Option<&'static str> {
        match self {
            StageKind::ShadowMap => Some("shadowmap_directional"),
            StageKind::BoundingBoxes => Some("bounding_box"),
            StageKind::Quad => Some("post_passthrough"),
            _ => None,
        }
    }

    /// Geometry stages take their programs from materials instead.
    pub fn needs_program(self) -> bool {
        !matches!(
            self,
            StageKind::ForwardGeometry | StageKind::DeferredGeometry
        )
    }

    /// Framebuffer this kind owns when framebuffer ownership is enabled.
    /// `None` when there is nothing to allocate (no directional lights for
    /// a shadow stage).
    pub fn framebuffer_descriptor(
        self,
        config: &StageConfig,
        env: &StageEnvironment,
    ) -> Option<FramebufferDescriptor> {
        let sample_count = if config.has(StageFlags::MULTISAMPLE) {
            env.sample_count
        } else {
            1
        };
        let screen = |plain: u32, alpha: u32| FramebufferDescriptor {
            width: env.width,
            height: env.height,
            plain_color_count: plain,
            alpha_color_count: alpha,
            depth_array_layers: 0,
            depth_stencil: true,
            sample_count,
        };
        match self {
            StageKind::ForwardGeometry | StageKind::Surface => Some(screen(1, 0)),
            // position + normal, then diffuse, specular, emissive
            StageKind::DeferredGeometry => Some(screen(2, 3)),
            StageKind::Quad | StageKind::BoundingBoxes => Some(screen(0, 1)),
            StageKind::ShadowMap => (env.directional_lights > 0).then(|| FramebufferDescriptor {
                width: env.shadow_map_size,
                height: env.shadow_map_size,
                plain_color_count: 0,
                alpha_color_count: 0,
                depth_array_layers: env.directional_lights,
                depth_stencil: false,
                sample_count: 1,
            }),
        }
    }
}

/// Renderer-wide values a stage's framebuffer shape depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEnvironment {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub shadow_map_size: u32,
    pub directional_lights: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Uninitialized,
    Initialized,
    Deinitialized,
}

/// One step of the pipeline.
#[derive(Debug)]
pub struct RenderStage {
    name: String,
    kind: StageKind,
    config: StageConfig,
    program: Option<Handle<ShaderProgram>>,
    framebuffer: Option<Framebuffer>,
    parameters: BTreeMap<String, Vec<f32>>,
    parameter_block: [[f32; 4]; PARAMETER_SLOTS],
    status: StageStatus,
}

impl RenderStage {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: StageKind,
        config: StageConfig,
        program: Option<Handle<ShaderProgram>>,
    ) -> Result<Self> {
        let name = name.into();
        if kind.needs_program() && program.is_none() {
            return Err(RenderError::MissingShaderProgram { stage: name });
        }
        Ok(Self {
            name,
            kind,
            config,
            program,
            framebuffer: None,
            parameters: BTreeMap::new(),
            parameter_block: [[0.0; 4]; PARAMETER_SLOTS],
            status: StageStatus::Uninitialized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn program(&self) -> Option<Handle<ShaderProgram>> {
        self.program
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn parameter(&self, name: &str) -> Option<&[f32]> {
        self.parameters.get(name).map(Vec::as_slice)
    }

    pub(crate) fn initialize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        env: &StageEnvironment,
    ) -> Result<()> {
        if self.status != StageStatus::Uninitialized {
            return Err(RenderError::Protocol("stage initialized twice"));
        }
        self.sync_framebuffer(backend, env)?;
        self.status = StageStatus::Initialized;
        log::info!(
            "Render stage '{}' ({:?}) initialized, framebuffer {:?}",
            self.name,
            self.kind,
            self.framebuffer.as_ref().map(Framebuffer::id)
        );
        Ok(())
    }

    /// Replaces the config and brings the owned framebuffer in line with it.
    pub(crate) fn reconfigure(
        &mut self,
        config: StageConfig,
        backend: &mut dyn GraphicsBackend,
        env: &StageEnvironment,
    ) -> Result<()> {
        self.config = config;
        if self.status == StageStatus::Initialized {
            self.sync_framebuffer(backend, env)?;
        }
        Ok(())
    }

    pub(crate) fn set_program(&mut self, program: Handle<ShaderProgram>) {
        self.program = Some(program);
        self.parameters.clear();
        self.parameter_block = [[0.0; 4]; PARAMETER_SLOTS];
    }

    /// Stores a named parameter after checking the program declares it.
    pub(crate) fn set_parameter(
        &mut self,
        program: &ShaderProgram,
        name: &str,
        values: &[f32],
    ) -> Result<()> {
        let mut parameters = self.parameters.clone();
        parameters.insert(name.to_string(), values.to_vec());
        self.parameter_block = program.pack(
            parameters
                .iter()
                .map(|(name, values)| (name.as_str(), values.as_slice())),
        )?;
        self.parameters = parameters;
        Ok(())
    }

    /// Allocates, reshapes or releases the owned framebuffer so it matches
    /// the flags and `env`.
    pub(crate) fn sync_framebuffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        env: &StageEnvironment,
    ) -> Result<()> {
        let wanted = if self.config.has(StageFlags::FRAMEBUFFER) {
            self.kind.framebuffer_descriptor(&self.config, env)
        } else {
            None
        };

        match (self.framebuffer.take(), wanted) {
            (None, None) => {}
            (Some(framebuffer), None) => framebuffer.destroy(backend),
            (None, Some(desc)) => {
                self.framebuffer = Some(Framebuffer::create(backend, desc)?);
            }
            (Some(mut framebuffer), Some(desc)) => {
                let result = if *framebuffer.descriptor() == desc {
                    Ok(())
                } else {
                    framebuffer.reshape(backend, desc)
                };
                self.framebuffer = Some(framebuffer);
                result?;
            }
        }
        Ok(())
    }

    pub(crate) fn deinitialize(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(framebuffer) = self.framebuffer.take() {
            framebuffer.destroy(backend);
        }
        if self.status == StageStatus::Initialized {
            log::debug!("Render stage '{}' deinitialized", self.name);
        }
        self.status = StageStatus::Deinitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    fn env(directional_lights: u32) -> StageEnvironment {
        StageEnvironment {
            width: 800,
            height: 600,
            sample_count: 4,
            shadow_map_size: 1024,
            directional_lights,
        }
    }

    #[test]
    fn deferred_geometry_owns_five_attachments() {
        let desc = StageKind::DeferredGeometry
            .framebuffer_descriptor(&StageConfig::default(), &env(0))
            .expect("descriptor");
        assert_eq!(desc.color_count(), 5);
        assert!(desc.depth_stencil);
        assert_eq!(desc.sample_count, 1);
    }

    #[test]
    fn shadow_layers_follow_directional_lights() {
        assert!(StageKind::ShadowMap
            .framebuffer_descriptor(&StageConfig::default(), &env(0))
            .is_none());
        let desc = StageKind::ShadowMap
            .framebuffer_descriptor(&StageConfig::default().with_multisample(true), &env(3))
            .expect("descriptor");
        assert_eq!(desc.depth_array_layers, 3);
        assert_eq!((desc.width, desc.sample_count), (1024, 1));
    }

    #[test]
    fn toggling_framebuffer_flag_allocates_and_releases() {
        let mut backend = HeadlessBackend::new();
        let mut stage = RenderStage::new(
            "geometry",
            StageKind::ForwardGeometry,
            StageConfig::default(),
            None,
        )
        .expect("stage");
        stage.initialize(&mut backend, &env(0)).expect("init");
        assert!(stage.framebuffer().is_some());

        let config = stage.config().clone().with_framebuffer(false);
        stage.reconfigure(config, &mut backend, &env(0)).expect("reconfigure");
        assert!(stage.framebuffer().is_none());
        assert_eq!(backend.live_framebuffers(), 0);
    }

    #[test]
    fn enabling_multisample_reshapes_in_place() {
        let mut backend = HeadlessBackend::new();
        let mut stage = RenderStage::new(
            "geometry",
            StageKind::ForwardGeometry,
            StageConfig::default(),
            None,
        )
        .expect("stage");
        stage.initialize(&mut backend, &env(0)).expect("init");
        let id = stage.framebuffer().map(Framebuffer::id);

        let config = stage.config().clone().with_multisample(true);
        stage.reconfigure(config, &mut backend, &env(0)).expect("reconfigure");
        assert_eq!(stage.framebuffer().map(Framebuffer::id), id);
        assert!(stage.framebuffer().is_some_and(Framebuffer::is_multisampled));
    }

    #[test]
    fn full_screen_kinds_need_a_program() {
        let err = RenderStage::new("lighting", StageKind::Surface, StageConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingShaderProgram { .. }));
    }
}
