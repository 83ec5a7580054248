use crate::asset::Registry;
use crate::error::{RenderError, Result};
use crate::gpu::{DrawCall, GraphicsBackend};
use crate::renderer::framebuffer::Framebuffer;
use crate::renderer::geometry::GeometryStore;
use crate::renderer::lights::LightTables;
use crate::renderer::link::PipelineLink;
use crate::renderer::materials::MaterialBindings;
use crate::renderer::pipeline::Pipeline;
use crate::renderer::shader::ShaderProgram;
use crate::renderer::stage::{RenderStage, StageFlags};
use crate::renderer::stats::FrameStats;
use crate::scene::Drawable;

/// Everything a stage may touch while it executes. Built fresh for every
/// stage by the renderer; nothing here outlives the frame.
pub(crate) struct FrameContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub pipeline: &'a Pipeline,
    pub stages: &'a Registry<RenderStage>,
    pub programs: &'a Registry<ShaderProgram>,
    pub drawables: &'a [Drawable],
    pub geometry: &'a GeometryStore,
    pub materials: &'a MaterialBindings,
    pub lights: &'a LightTables,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub stats: &'a mut FrameStats,
}

impl<'a> FrameContext<'a> {
    /// Framebuffer named by `link` from the stage at `current`, `None` for
    /// the screen.
    pub fn linked(&self, link: PipelineLink, current: usize) -> Result<Option<&'a Framebuffer>> {
        let index = self.pipeline.resolve(link, current)?;
        stage_output(self.pipeline, self.stages, index)
    }

    pub fn draw(&mut self, call: DrawCall) -> Result<()> {
        self.backend.draw(call)?;
        self.stats.draw_calls += 1;
        Ok(())
    }
}

/// Where the stage at `index` draws: its own framebuffer, or whatever its
/// draw-output link leads to. A stage without a framebuffer whose output is
/// itself draws to the screen.
pub(crate) fn stage_output<'a>(
    pipeline: &Pipeline,
    stages: &'a Registry<RenderStage>,
    index: usize,
) -> Result<Option<&'a Framebuffer>> {
    let mut index = index;
    for _ in 0..=pipeline.len() {
        let stage = stages.fetch(pipeline.stage_at(index)?)?;
        if stage.config().has(StageFlags::FRAMEBUFFER) {
            if let Some(framebuffer) = stage.framebuffer() {
                return Ok(Some(framebuffer));
            }
        }
        let next = pipeline.resolve(stage.config().links.draw, index)?;
        if next == index {
            return Ok(None);
        }
        index = next;
    }

    let stage = stages.fetch(pipeline.stage_at(index)?)?;
    Err(RenderError::LinkCycle {
        stage: stage.name().to_string(),
    })
}
