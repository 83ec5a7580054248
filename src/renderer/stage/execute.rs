use glam::Mat4;

use super::{RenderStage, StageFlags, StageKind};
use crate::error::{RenderError, Result};
use crate::gpu::{
    ClearOps, DepthAttachment, DrawCall, FramebufferId, RasterState, RenderTarget, StagePass,
    StencilState, TextureBinding, Topology, MAX_TEXTURE_UNITS,
};
use crate::renderer::context::FrameContext;
use crate::renderer::framebuffer::Framebuffer;
use crate::renderer::shader::ShaderProgram;

impl RenderStage {
    /// Runs the stage as pipeline entry `index`. Returns `false` when the
    /// stage had nothing to draw into and was skipped.
    pub(crate) fn on_frame(&self, index: usize, ctx: &mut FrameContext<'_>) -> Result<bool> {
        if self.kind == StageKind::ShadowMap && self.framebuffer.is_none() {
            log::debug!("Render stage '{}' skipped: no shadow layers", self.name);
            return Ok(false);
        }

        let links = self.config.links;
        let output = ctx.linked(links.draw, index)?;
        let color_input = ctx.linked(links.color, index)?;
        let depth_input = ctx.linked(links.depth_stencil, index)?;
        let depth_array = ctx
            .linked(links.depth_array, index)?
            .filter(|fb| fb.has_depth_array())
            .map(Framebuffer::id);

        let pass = self.stage_pass(output, depth_input, ctx);
        ctx.backend.begin_stage(pass)?;
        match self.kind {
            StageKind::ForwardGeometry => self.draw_scene(ctx, depth_array, false)?,
            StageKind::DeferredGeometry => self.draw_scene(ctx, depth_array, true)?,
            StageKind::Surface | StageKind::Quad => {
                self.draw_quad(ctx, color_input, depth_array)?
            }
            StageKind::ShadowMap => self.draw_shadow_layers(ctx)?,
            StageKind::BoundingBoxes => self.draw_bounding_boxes(ctx)?,
        }
        ctx.backend.end_stage()?;

        if self.config.has(StageFlags::MULTISAMPLE) {
            if let Some(framebuffer) = &self.framebuffer {
                if framebuffer.resolve(ctx.backend)? {
                    ctx.stats.resolves += 1;
                }
            }
        }
        ctx.stats.stages_executed += 1;
        Ok(true)
    }

    fn stage_pass(
        &self,
        output: Option<&Framebuffer>,
        depth_input: Option<&Framebuffer>,
        ctx: &FrameContext<'_>,
    ) -> StagePass {
        let target = output.map_or(RenderTarget::Screen, |fb| RenderTarget::Framebuffer(fb.id()));
        let depth = match depth_input {
            Some(fb) if fb.has_depth_stencil() => DepthAttachment::Surface(fb.id()),
            Some(fb) if fb.has_depth_array() => DepthAttachment::Layers(fb.id()),
            Some(_) => DepthAttachment::None,
            None if output.is_none() => DepthAttachment::Screen,
            None => DepthAttachment::None,
        };
        let (width, height) = output.map_or((ctx.width, ctx.height), |fb| (fb.width(), fb.height()));

        let flags = self.config.flags;
        StagePass {
            label: self.name.clone(),
            target,
            depth,
            clear: ClearOps {
                color: flags
                    .contains(StageFlags::CLEAR_COLOR)
                    .then_some(ctx.clear_color),
                depth: flags.contains(StageFlags::CLEAR_DEPTH),
                stencil: flags.contains(StageFlags::CLEAR_STENCIL),
            },
            state: RasterState {
                depth_test: flags.contains(StageFlags::DEPTH_TEST),
                depth_write: flags.contains(StageFlags::DEPTH_TEST),
                stencil: flags.contains(StageFlags::STENCIL_TEST).then_some(StencilState {
                    function: self.config.stencil_function,
                    operation: self.config.stencil_operation,
                }),
                face_culling: flags.contains(StageFlags::FACE_CULLING),
                multisample: flags.contains(StageFlags::MULTISAMPLE),
                blend: self.config.blend,
            },
            stencil_reference: self.config.stencil_reference,
            viewport: self.config.viewport.to_pixels(width, height),
        }
    }

    fn own_program<'a>(&self, ctx: &FrameContext<'a>) -> Result<&'a ShaderProgram> {
        let handle = self
            .program
            .ok_or_else(|| RenderError::MissingShaderProgram {
                stage: self.name.clone(),
            })?;
        let programs = ctx.programs;
        programs.fetch(handle)
    }

    /// Every drawable with its material's forward or G-buffer program.
    fn draw_scene(
        &self,
        ctx: &mut FrameContext<'_>,
        depth_array: Option<FramebufferId>,
        deferred: bool,
    ) -> Result<()> {
        let (geometry, materials, programs) = (ctx.geometry, ctx.materials, ctx.programs);
        for drawable in ctx.drawables {
            let buffers = geometry
                .mesh(drawable.entity)
                .ok_or(RenderError::UnknownHandle {
                    kind: "geometry",
                    index: drawable.entity.id() as usize,
                })?;
            let binding = materials.get(drawable.material)?;
            let (program, params, stencil_reference) = if deferred {
                (
                    binding.geometry_program,
                    binding.geometry_params,
                    Some(binding.stencil_value),
                )
            } else {
                (binding.forward_program, binding.forward_params, None)
            };
            let program = programs.fetch(program)?.id();
            let textures = binding.texture_bindings();

            ctx.draw(DrawCall {
                program,
                geometry: buffers.id,
                topology: Topology::Triangles,
                model: drawable.world,
                params,
                textures,
                depth_array,
                stencil_reference,
                layer: 0,
            })?;
        }
        Ok(())
    }

    /// The shared quad, sampling every color attachment of the color input.
    fn draw_quad(
        &self,
        ctx: &mut FrameContext<'_>,
        color_input: Option<&Framebuffer>,
        depth_array: Option<FramebufferId>,
    ) -> Result<()> {
        let program = self.own_program(ctx)?.id();
        let quad = ctx
            .geometry
            .screen_quad()
            .ok_or(RenderError::UnknownHandle {
                kind: "screen quad",
                index: 0,
            })?;
        let textures: Vec<TextureBinding> = color_input
            .map(|fb| {
                (0..fb.color_count().min(MAX_TEXTURE_UNITS as u32))
                    .map(|attachment| TextureBinding::FramebufferColor {
                        framebuffer: fb.id(),
                        attachment,
                    })
                    .collect()
            })
            .unwrap_or_default();

        ctx.draw(DrawCall {
            program,
            geometry: quad.id,
            topology: Topology::Triangles,
            model: Mat4::IDENTITY,
            params: self.parameter_block,
            textures,
            depth_array,
            stencil_reference: None,
            layer: 0,
        })
    }

    /// Every drawable once per directional light, into that light's layer.
    fn draw_shadow_layers(&self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let program = self.own_program(ctx)?.id();
        let layers = self
            .framebuffer
            .as_ref()
            .map_or(0, Framebuffer::depth_array_layers);

        let geometry = ctx.geometry;
        for layer in 0..layers {
            let Some(view_proj) = ctx.lights.directional_view_proj(layer as usize) else {
                continue;
            };
            for drawable in ctx.drawables {
                let Some(buffers) = geometry.mesh(drawable.entity) else {
                    continue;
                };
                ctx.draw(DrawCall {
                    program,
                    geometry: buffers.id,
                    topology: Topology::Triangles,
                    model: drawable.world,
                    params: view_proj.to_cols_array_2d(),
                    textures: Vec::new(),
                    depth_array: None,
                    stencil_reference: None,
                    layer,
                })?;
            }
        }
        Ok(())
    }

    /// Wireframe boxes, already in world space.
    fn draw_bounding_boxes(&self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let program = self.own_program(ctx)?.id();
        let geometry = ctx.geometry;
        for drawable in ctx.drawables {
            let Some((wire, _)) = geometry.wireframe(drawable.entity) else {
                continue;
            };
            ctx.draw(DrawCall {
                program,
                geometry: wire.id,
                topology: Topology::Lines,
                model: Mat4::IDENTITY,
                params: self.parameter_block,
                textures: Vec::new(),
                depth_array: None,
                stencil_reference: None,
                layer: 0,
            })?;
        }
        Ok(())
    }
}
