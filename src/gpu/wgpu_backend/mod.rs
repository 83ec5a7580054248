//! [`GraphicsBackend`] on a real `wgpu` device.
//!
//! Stage passes and draws are recorded while the pipeline runs and encoded
//! into a single command buffer at `end_frame`, once the per-draw object
//! records of the whole frame are known.

mod bindings;
mod context;
mod pipeline_builder;
mod resources;

use std::borrow::Cow;
use std::collections::HashMap;

use bindings::{DynamicObjectsBuffer, FrameBuffers, Layouts, DEPTH_ARRAY_BINDING};
use context::GpuContext;
use pipeline_builder::{blend_state, depth_stencil_state, topology, PipelineBuilder, PipelineKey};
use resources::{
    FramebufferTextures, GeometryGpu, ScreenTarget, DEPTH_ARRAY_FORMAT, DEPTH_STENCIL_FORMAT,
    SCREEN_FORMAT,
};

use super::{
    DepthAttachment, DrawCall, FramebufferDescriptor, FramebufferId, GeometryData, GeometryId,
    GraphicsBackend, ProgramDescriptor, ProgramId, RenderTarget, StagePass, TextureBinding,
    TextureId, MAX_COLOR_ATTACHMENTS, MAX_TEXTURE_UNITS,
};
use crate::asset::TextureData;
use crate::error::{RenderError, Result};
use crate::renderer::lights::LightKind;
use crate::renderer::uniforms::{CameraUniform, ObjectData};
use crate::renderer::vertex::Vertex;

/// Bindings shared by every program: camera, light tables, object records,
/// texture slots and bones. Prepended to each program source.
const COMMON_WGSL: &str = include_str!("../../../shader/common.wgsl");

struct Program {
    name: String,
    module: wgpu::ShaderModule,
}

/// Texture group contents: one binding per slot plus the depth array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextureSetKey {
    textures: [TextureBinding; MAX_TEXTURE_UNITS],
    depth_array: Option<FramebufferId>,
}

impl TextureSetKey {
    fn new(call: &DrawCall) -> Self {
        let mut textures = [TextureBinding::Unbound; MAX_TEXTURE_UNITS];
        for (slot, binding) in textures.iter_mut().zip(&call.textures) {
            *slot = *binding;
        }
        Self {
            textures,
            depth_array: call.depth_array,
        }
    }
}

struct RecordedDraw {
    call: DrawCall,
    pipeline: PipelineKey,
    textures: TextureSetKey,
}

enum FrameOp {
    Stage {
        pass: StagePass,
        draws: Vec<RecordedDraw>,
    },
    Resolve(FramebufferId),
}

#[derive(Default)]
struct FrameRecording {
    ops: Vec<FrameOp>,
    open_stage: bool,
}

pub struct WgpuBackend {
    context: GpuContext,
    layouts: Layouts,
    frame_buffers: FrameBuffers,
    objects: DynamicObjectsBuffer,
    screen: ScreenTarget,
    sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    fallback_texture: wgpu::TextureView,
    fallback_depth_array: wgpu::TextureView,
    next_id: u32,
    framebuffers: HashMap<FramebufferId, FramebufferTextures>,
    programs: HashMap<ProgramId, Program>,
    geometries: HashMap<GeometryId, GeometryGpu>,
    textures: HashMap<TextureId, wgpu::TextureView>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_sets: HashMap<TextureSetKey, wgpu::BindGroup>,
    frame: Option<FrameRecording>,
}

impl WgpuBackend {
    /// Opens a device on the best available adapter, blocking until it is
    /// ready.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let context = GpuContext::new_blocking()?;
        let device = &context.device;

        let layouts = Layouts::new(device);
        let frame_buffers = FrameBuffers::new(device, &layouts.frame);
        let objects = DynamicObjectsBuffer::new(device, &layouts.objects);
        let screen = ScreenTarget::new(device, width, height);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("StageSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let fallback_texture =
            resources::upload_texture(device, &context.queue, &TextureData::solid([255; 4]));
        // cleared to the far plane so unlinked shadow lookups read as lit
        let fallback_depth = resources::depth_array(device, "Fallback", 1, 1, 1);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FallbackClear"),
        });
        for view in &fallback_depth.layer_views {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("FallbackClear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        context.queue.submit(std::iter::once(encoder.finish()));
        let fallback_depth_array = fallback_depth.array_view;

        log::info!("wgpu backend ready, screen {}x{}", screen.width, screen.height);
        Ok(Self {
            layouts,
            frame_buffers,
            objects,
            screen,
            sampler,
            shadow_sampler,
            fallback_texture,
            fallback_depth_array,
            next_id: 1,
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            texture_sets: HashMap::new(),
            frame: None,
            context,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    /// Offscreen texture the final stage draws into.
    pub fn screen_texture(&self) -> &wgpu::Texture {
        &self.screen.texture
    }

    pub fn screen_format(&self) -> wgpu::TextureFormat {
        SCREEN_FORMAT
    }

    fn issue(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn recording(&mut self) -> Result<&mut FrameRecording> {
        self.frame
            .as_mut()
            .ok_or(RenderError::Protocol("no frame in progress"))
    }

    fn framebuffer(&self, id: FramebufferId) -> Result<&FramebufferTextures> {
        self.framebuffers.get(&id).ok_or(RenderError::UnknownHandle {
            kind: "framebuffer",
            index: id.0 as usize,
        })
    }

    /// Color formats, depth format and sample count of a pass.
    fn pass_targets(
        &self,
        pass: &StagePass,
    ) -> Result<(Vec<wgpu::TextureFormat>, Option<wgpu::TextureFormat>, u32)> {
        let (colors, sample_count) = match pass.target {
            RenderTarget::Screen => (vec![SCREEN_FORMAT], 1),
            RenderTarget::Framebuffer(id) => {
                let fb = self.framebuffer(id)?;
                (fb.color_formats(), fb.desc.sample_count)
            }
        };
        let depth = match pass.depth {
            DepthAttachment::None => None,
            DepthAttachment::Screen => Some(DEPTH_STENCIL_FORMAT),
            DepthAttachment::Surface(id) => {
                let fb = self.framebuffer(id)?;
                if fb.depth_stencil.is_none() {
                    return Err(RenderError::IncompleteFramebuffer {
                        reason: format!("framebuffer {} has no depth/stencil surface", id.0),
                    });
                }
                if fb.desc.sample_count != sample_count {
                    return Err(RenderError::IncompleteFramebuffer {
                        reason: format!(
                            "depth/stencil of framebuffer {} has {} samples, target has {}",
                            id.0, fb.desc.sample_count, sample_count
                        ),
                    });
                }
                Some(DEPTH_STENCIL_FORMAT)
            }
            DepthAttachment::Layers(_) => Some(DEPTH_ARRAY_FORMAT),
        };
        Ok((colors, depth, sample_count))
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self.programs.get(&key.program).ok_or(RenderError::UnknownHandle {
            kind: "program",
            index: key.program.0 as usize,
        })?;
        let pipeline = PipelineBuilder::new(
            &self.context.device,
            &self.layouts.pipeline,
            &program.module,
        )
        .with_label(&program.name)
        .with_vertex_buffer(Vertex::layout())
        .with_color_targets(&key.color_formats, blend_state(key.state.blend))
        .with_depth_stencil(depth_stencil_state(&key.state, key.depth_format))
        .with_multisample(key.sample_count)
        .with_culling(key.state.face_culling)
        .with_topology(topology(key.topology))
        .build();
        log::debug!(
            "Created pipeline for '{}' ({} targets, {} samples)",
            program.name,
            key.color_formats.len(),
            key.sample_count
        );
        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    fn ensure_texture_set(&mut self, key: &TextureSetKey) -> Result<()> {
        if self.texture_sets.contains_key(key) {
            return Ok(());
        }
        let mut views = Vec::with_capacity(MAX_TEXTURE_UNITS);
        for binding in &key.textures {
            let view = match *binding {
                TextureBinding::Unbound => &self.fallback_texture,
                TextureBinding::Texture(id) => {
                    self.textures.get(&id).ok_or(RenderError::UnknownHandle {
                        kind: "texture",
                        index: id.0 as usize,
                    })?
                }
                TextureBinding::FramebufferColor {
                    framebuffer,
                    attachment,
                } => self
                    .framebuffer(framebuffer)?
                    .colors
                    .get(attachment as usize)
                    .map(|color| color.sampled_view())
                    .ok_or(RenderError::HandleOutOfBounds {
                        kind: "color attachment",
                        index: attachment as usize,
                        capacity: MAX_COLOR_ATTACHMENTS as usize,
                    })?,
            };
            views.push(view);
        }
        let depth_array = match key.depth_array {
            Some(id) => self
                .framebuffer(id)?
                .depth_array
                .as_ref()
                .map_or(&self.fallback_depth_array, |array| &array.array_view),
            None => &self.fallback_depth_array,
        };

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.extend([
            wgpu::BindGroupEntry {
                binding: MAX_TEXTURE_UNITS as u32,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: DEPTH_ARRAY_BINDING,
                resource: wgpu::BindingResource::TextureView(depth_array),
            },
            wgpu::BindGroupEntry {
                binding: DEPTH_ARRAY_BINDING + 1,
                resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
            },
        ]);
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("TexturesBindGroup"),
                layout: &self.layouts.textures,
                entries: &entries,
            });
        self.texture_sets.insert(key.clone(), bind_group);
        Ok(())
    }

    /// Bind groups reference texture views; any change to a texture or
    /// framebuffer drops them all.
    fn invalidate_texture_sets(&mut self) {
        self.texture_sets.clear();
    }

    fn encode(&self, ops: &[FrameOp], encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        let mut instance = 0u32;
        for op in ops {
            match op {
                FrameOp::Stage { pass, draws } => {
                    if let DepthAttachment::Layers(id) = pass.depth {
                        self.encode_layers(encoder, pass, id, draws, &mut instance)?;
                    } else {
                        self.encode_stage(encoder, pass, draws, &mut instance)?;
                    }
                }
                FrameOp::Resolve(id) => self.encode_resolve(encoder, *id)?,
            }
        }
        Ok(())
    }

    fn color_attachments(
        &self,
        pass: &StagePass,
    ) -> Result<Vec<Option<wgpu::RenderPassColorAttachment<'_>>>> {
        let load = match pass.clear.color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let ops = wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        };
        let views: Vec<&wgpu::TextureView> = match pass.target {
            RenderTarget::Screen => vec![&self.screen.view],
            RenderTarget::Framebuffer(id) => self
                .framebuffer(id)?
                .colors
                .iter()
                .map(|color| &color.view)
                .collect(),
        };
        Ok(views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops,
                })
            })
            .collect())
    }

    fn encode_stage(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &StagePass,
        draws: &[RecordedDraw],
        instance: &mut u32,
    ) -> Result<()> {
        let color_attachments = self.color_attachments(pass)?;
        let depth_view = match pass.depth {
            DepthAttachment::None | DepthAttachment::Layers(_) => None,
            DepthAttachment::Screen => Some(&self.screen.depth_stencil),
            DepthAttachment::Surface(id) => self.framebuffer(id)?.depth_stencil.as_ref(),
        };
        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear.depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: if pass.clear.stencil {
                        wgpu::LoadOp::Clear(0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.label.as_str()),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.encode_draws(&mut render_pass, pass, draws.iter(), instance)
    }

    /// One pass per depth layer; each draw lands in the layer it names.
    fn encode_layers(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &StagePass,
        id: FramebufferId,
        draws: &[RecordedDraw],
        instance: &mut u32,
    ) -> Result<()> {
        let array = self
            .framebuffer(id)?
            .depth_array
            .as_ref()
            .ok_or(RenderError::IncompleteFramebuffer {
                reason: format!("framebuffer {} has no depth array", id.0),
            })?;
        for (layer, view) in array.layer_views.iter().enumerate() {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label.as_str()),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let layer_draws = draws.iter().filter(|draw| draw.call.layer as usize == layer);
            self.encode_draws(&mut render_pass, pass, layer_draws, instance)?;
        }
        Ok(())
    }

    fn encode_draws<'d>(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        pass: &StagePass,
        draws: impl Iterator<Item = &'d RecordedDraw>,
        instance: &mut u32,
    ) -> Result<()> {
        let [x, y, width, height] = pass.viewport;
        render_pass.set_viewport(x, y, width, height, 0.0, 1.0);
        render_pass.set_bind_group(0, &self.frame_buffers.bind_group, &[]);
        render_pass.set_bind_group(1, &self.objects.bind_group, &[]);

        for draw in draws {
            let index = *instance;
            *instance += 1;
            let geometry = self
                .geometries
                .get(&draw.call.geometry)
                .ok_or(RenderError::UnknownHandle {
                    kind: "geometry",
                    index: draw.call.geometry.0 as usize,
                })?;
            if geometry.index_count == 0 {
                continue;
            }
            let (Some(pipeline), Some(textures)) = (
                self.pipelines.get(&draw.pipeline),
                self.texture_sets.get(&draw.textures),
            ) else {
                return Err(RenderError::Protocol("draw encoded before it was prepared"));
            };

            render_pass.set_pipeline(pipeline);
            render_pass.set_stencil_reference(
                draw.call.stencil_reference.unwrap_or(pass.stencil_reference),
            );
            render_pass.set_bind_group(2, textures, &[]);
            render_pass.set_bind_group(3, &geometry.bones_bind_group, &[]);
            render_pass.set_vertex_buffer(0, geometry.vertices.slice(..));
            render_pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..geometry.index_count, 0, index..index + 1);
        }
        Ok(())
    }

    fn encode_resolve(&self, encoder: &mut wgpu::CommandEncoder, id: FramebufferId) -> Result<()> {
        let fb = self.framebuffer(id)?;
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = fb
            .colors
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &color.view,
                    depth_slice: None,
                    resolve_target: color.resolved.as_ref(),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Resolve"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId> {
        desc.validate()?;
        desc.check_complete(MAX_COLOR_ATTACHMENTS)?;
        let id = FramebufferId(self.issue());
        let textures =
            FramebufferTextures::new(&self.context.device, desc, &format!("Framebuffer{}", id.0));
        self.framebuffers.insert(id, textures);
        Ok(id)
    }

    fn recreate_framebuffer(
        &mut self,
        id: FramebufferId,
        desc: &FramebufferDescriptor,
    ) -> Result<()> {
        self.framebuffer(id)?;
        desc.validate()?;
        desc.check_complete(MAX_COLOR_ATTACHMENTS)?;
        let textures =
            FramebufferTextures::new(&self.context.device, desc, &format!("Framebuffer{}", id.0));
        self.framebuffers.insert(id, textures);
        self.invalidate_texture_sets();
        Ok(())
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.framebuffers.remove(&id).is_some() {
            self.invalidate_texture_sets();
        }
    }

    fn resolve_framebuffer(&mut self, id: FramebufferId) -> Result<()> {
        if !self.framebuffer(id)?.desc.is_multisampled() {
            return Err(RenderError::Protocol("resolve of a single-sample framebuffer"));
        }
        let recording = self.recording()?;
        if recording.open_stage {
            return Err(RenderError::Protocol("resolve inside a stage"));
        }
        recording.ops.push(FrameOp::Resolve(id));
        Ok(())
    }

    fn compile_program(&mut self, desc: &ProgramDescriptor<'_>) -> Result<ProgramId> {
        if desc.source.trim().is_empty() {
            return Err(RenderError::Backend(format!(
                "program '{}' has no source",
                desc.name
            )));
        }
        let source = format!("{COMMON_WGSL}\n{}", desc.source);
        let module = self
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.name),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            });
        let id = ProgramId(self.issue());
        self.programs.insert(
            id,
            Program {
                name: desc.name.to_string(),
                module,
            },
        );
        Ok(id)
    }

    fn create_geometry(&mut self, data: &GeometryData<'_>) -> Result<GeometryId> {
        let id = GeometryId(self.issue());
        let geometry = GeometryGpu::new(&self.context.device, &self.layouts.bones, data);
        self.geometries.insert(id, geometry);
        Ok(id)
    }

    fn reload_geometry(&mut self, id: GeometryId, data: &GeometryData<'_>) -> Result<()> {
        let geometry = self.geometries.get_mut(&id).ok_or(RenderError::UnknownHandle {
            kind: "geometry",
            index: id.0 as usize,
        })?;
        geometry.reload(
            &self.context.device,
            &self.context.queue,
            &self.layouts.bones,
            data,
        );
        Ok(())
    }

    fn destroy_geometry(&mut self, id: GeometryId) {
        self.geometries.remove(&id);
    }

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId> {
        data.validate()?;
        let id = TextureId(self.issue());
        let view = resources::upload_texture(&self.context.device, &self.context.queue, data);
        self.textures.insert(id, view);
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.invalidate_texture_sets();
        }
    }

    fn write_light_slots(&mut self, kind: LightKind, offset: u64, bytes: &[u8]) {
        self.context
            .queue
            .write_buffer(self.frame_buffers.lights(kind), offset, bytes);
    }

    fn write_camera(&mut self, camera: &CameraUniform) {
        self.context
            .queue
            .write_buffer(&self.frame_buffers.camera, 0, bytemuck::bytes_of(camera));
    }

    fn resize_screen(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSizedFramebuffer { width, height });
        }
        if (width, height) != (self.screen.width, self.screen.height) {
            self.screen = ScreenTarget::new(&self.context.device, width, height);
        }
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        if self.frame.is_some() {
            return Err(RenderError::Protocol("frame already in progress"));
        }
        self.frame = Some(FrameRecording::default());
        Ok(())
    }

    fn begin_stage(&mut self, pass: StagePass) -> Result<()> {
        let recording = self.recording()?;
        if recording.open_stage {
            return Err(RenderError::Protocol("stage opened inside a stage"));
        }
        recording.open_stage = true;
        recording.ops.push(FrameOp::Stage {
            pass,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<()> {
        if !self.programs.contains_key(&call.program) {
            return Err(RenderError::UnknownHandle {
                kind: "program",
                index: call.program.0 as usize,
            });
        }
        if !self.geometries.contains_key(&call.geometry) {
            return Err(RenderError::UnknownHandle {
                kind: "geometry",
                index: call.geometry.0 as usize,
            });
        }
        let recording = self
            .frame
            .as_ref()
            .ok_or(RenderError::Protocol("no frame in progress"))?;
        let pass = match recording.ops.last() {
            Some(FrameOp::Stage { pass, .. }) if recording.open_stage => pass.clone(),
            _ => return Err(RenderError::Protocol("draw outside of a stage")),
        };

        let (color_formats, depth_format, sample_count) = self.pass_targets(&pass)?;
        let pipeline = PipelineKey {
            program: call.program,
            topology: call.topology,
            color_formats,
            depth_format,
            sample_count,
            state: pass.state,
        };
        let textures = TextureSetKey::new(&call);
        if let Some(FrameOp::Stage { draws, .. }) = self.recording()?.ops.last_mut() {
            draws.push(RecordedDraw {
                call,
                pipeline,
                textures,
            });
        }
        Ok(())
    }

    fn end_stage(&mut self) -> Result<()> {
        let recording = self.recording()?;
        if !recording.open_stage {
            return Err(RenderError::Protocol("end_stage without an open stage"));
        }
        recording.open_stage = false;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let recording = self
            .frame
            .take()
            .ok_or(RenderError::Protocol("end_frame outside of a frame"))?;
        if recording.open_stage {
            return Err(RenderError::Protocol("end_frame with an open stage"));
        }

        let mut objects = Vec::new();
        for op in &recording.ops {
            if let FrameOp::Stage { draws, .. } = op {
                for draw in draws {
                    self.ensure_pipeline(&draw.pipeline)?;
                    self.ensure_texture_set(&draw.textures)?;
                }
            }
        }
        // instance ids follow encoding order: stages in order, layered
        // stages grouped by layer
        for op in &recording.ops {
            let FrameOp::Stage { pass, draws } = op else {
                continue;
            };
            if let DepthAttachment::Layers(id) = pass.depth {
                let layers = self
                    .framebuffer(id)?
                    .depth_array
                    .as_ref()
                    .map_or(0, |array| array.layer_views.len());
                for layer in 0..layers {
                    objects.extend(
                        draws
                            .iter()
                            .filter(|draw| draw.call.layer as usize == layer)
                            .map(|draw| ObjectData::new(draw.call.model, draw.call.params)),
                    );
                }
            } else {
                objects.extend(
                    draws
                        .iter()
                        .map(|draw| ObjectData::new(draw.call.model, draw.call.params)),
                );
            }
        }
        self.objects.upload(
            &self.context.device,
            &self.context.queue,
            &self.layouts.objects,
            &objects,
        );

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Encoder"),
                });
        self.encode(&recording.ops, &mut encoder)?;
        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn abort_frame(&mut self) {
        if self.frame.take().is_some() {
            log::warn!("Frame aborted, recorded passes discarded");
        }
    }
}
