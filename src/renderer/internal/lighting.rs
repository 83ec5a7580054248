use crate::asset::Handle;
use crate::error::Result;
use crate::gpu::{BlendMode, GraphicsBackend, StencilFunction};
use crate::renderer::link::PipelineLink;
use crate::renderer::renderer::Renderer;
use crate::renderer::shader::{stencil_value, ShaderProgram};
use crate::renderer::stage::{StageConfig, StageHandle, StageKind};

impl<B: GraphicsBackend> Renderer<B> {
    /// Stages in front of the lighting block: the geometry pass, preceded
    /// by the shadow pass when shadow mapping is on.
    pub(crate) fn geometry_prefix_len(&self) -> usize {
        if self.settings.shadow_mapping {
            2
        } else {
            1
        }
    }

    /// Queues a lighting stage for `program` unless one exists or is
    /// already queued. Only deferred renderers light in separate stages.
    pub(crate) fn request_lighting_stage(&mut self, program: Handle<ShaderProgram>) -> Result<()> {
        if !self.settings.is_deferred()
            || self.lighting_programs.contains(&program)
            || self.pending_lighting.contains(&program)
        {
            return Ok(());
        }
        self.pending_lighting.push(program);
        self.inject_pending_lighting()
    }

    /// Injects queued lighting stages once the geometry prefix exists.
    ///
    /// A program whose injection fails leaves the queue without being
    /// marked as seen, so the next update of a material using it tries
    /// again. Programs queued behind it wait for the next flush.
    pub(crate) fn inject_pending_lighting(&mut self) -> Result<()> {
        if self.pending_lighting.is_empty() {
            return Ok(());
        }
        if self.pipeline.len() < self.geometry_prefix_len() {
            log::debug!(
                "{} lighting stage(s) wait for the geometry stages",
                self.pending_lighting.len()
            );
            return Ok(());
        }
        while !self.pending_lighting.is_empty() {
            let program = self.pending_lighting.remove(0);
            self.inject_lighting_stage(program)?;
        }
        Ok(())
    }

    /// Inserts a Surface stage for `program` directly behind the geometry
    /// prefix. The newest lighting stage heads the block: it owns the
    /// accumulation framebuffer and is the only one clearing it.
    fn inject_lighting_stage(&mut self, program: Handle<ShaderProgram>) -> Result<StageHandle> {
        let prefix = self.geometry_prefix_len();
        let program_name = self.programs.fetch(program)?.name().to_string();
        let stencil = stencil_value(program)?;

        let (gbuffer, accumulation, depth_array) = if self.settings.shadow_mapping {
            (PipelineLink::Second, PipelineLink::Third, PipelineLink::First)
        } else {
            (PipelineLink::First, PipelineLink::Second, PipelineLink::Current)
        };
        let config = StageConfig::new()
            .with_stencil_test(StencilFunction::Equal, stencil)
            .with_depth_test(false)
            .with_face_culling(false)
            .with_blend(BlendMode::Additive)
            .with_clear_color(true)
            .with_clear_depth(false)
            .with_clear_stencil(false)
            .with_color_link(gbuffer)
            .with_depth_stencil_link(gbuffer)
            .with_depth_array_link(depth_array)
            .with_draw_link(accumulation);

        // Park the prefix at the tail so the new stage lands right behind it,
        // then bring prefix and new stage back to the front together.
        for _ in 0..prefix {
            self.pipeline.rotate_left();
        }
        let name = format!("lighting:{program_name}");
        let handle =
            match self.create_stage_with_program(&name, StageKind::Surface, config, Some(program)) {
                Ok(handle) => handle,
                Err(err) => {
                    for _ in 0..prefix {
                        self.pipeline.rotate_right();
                    }
                    return Err(err);
                }
            };
        for _ in 0..=prefix {
            self.pipeline.rotate_right();
        }
        self.lighting_programs.insert(program);
        self.lighting_stages += 1;

        if self.lighting_stages > 1 {
            if let Some(previous_head) = self.pipeline.get(prefix + 1) {
                self.reconfigure_stage(previous_head, |config| {
                    config.with_clear_color(false).with_framebuffer(false)
                })?;
            }
        }
        if let Some(downstream) = self.pipeline.get(prefix + self.lighting_stages) {
            self.reconfigure_stage(downstream, |config| {
                config.with_color_link(PipelineLink::Previous)
            })?;
        }

        log::info!(
            "Injected lighting stage '{}' (stencil {}) at index {}; pipeline {:?}",
            name,
            stencil,
            prefix,
            self.stage_names()
        );
        Ok(handle)
    }
}
