// renderer/renderer.rs
use std::collections::BTreeSet;

use hecs::Entity;

use crate::asset::{Handle, Registry};
use crate::error::{report, RenderError, Result};
use crate::gpu::{
    FramebufferDescriptor, GraphicsBackend, ProgramDescriptor, StencilFunction, StencilOperation,
};
use crate::renderer::context::{stage_output, FrameContext};
use crate::renderer::framebuffer::Framebuffer;
use crate::renderer::geometry::GeometryStore;
use crate::renderer::invalidation::Invalidations;
use crate::renderer::lights::LightTables;
use crate::renderer::link::PipelineLink;
use crate::renderer::materials::MaterialBindings;
use crate::renderer::pipeline::Pipeline;
use crate::renderer::shader::ShaderProgram;
use crate::renderer::stage::{
    RenderStage, StageClass, StageConfig, StageEnvironment, StageHandle, StageKind,
};
use crate::renderer::stats::FrameStats;
use crate::scene::{Material, Scene};
use crate::settings::RenderSettings;

/// Built-in programs: name, WGSL source and the uniforms of their
/// parameter block, in slot order.
const DEFAULT_PROGRAMS: &[(&str, &str, &[&str])] = &[
    (
        "forward",
        include_str!("../../shader/forward.wgsl"),
        &["diffuseColor", "specularColor", "specularShininess", "emissiveColor"],
    ),
    (
        "gbuffer",
        include_str!("../../shader/gbuffer.wgsl"),
        &["diffuseColor", "specularColor", "specularShininess", "emissiveColor"],
    ),
    (
        "deferred_blinn_phong",
        include_str!("../../shader/deferred_blinn_phong.wgsl"),
        &[],
    ),
    (
        "pbr_forward",
        include_str!("../../shader/pbr_forward.wgsl"),
        &["albedo", "metallic", "roughness", "normalStrength"],
    ),
    (
        "pbr_gbuffer",
        include_str!("../../shader/pbr_gbuffer.wgsl"),
        &["albedo", "metallic", "roughness", "normalStrength"],
    ),
    ("deferred_pbr", include_str!("../../shader/deferred_pbr.wgsl"), &[]),
    (
        "post_passthrough",
        include_str!("../../shader/post_passthrough.wgsl"),
        &[],
    ),
    ("post_gamma", include_str!("../../shader/post_gamma.wgsl"), &["gamma"]),
    ("post_hdr", include_str!("../../shader/post_hdr.wgsl"), &["exposure"]),
    ("post_fxaa", include_str!("../../shader/post_fxaa.wgsl"), &["spanMax"]),
    (
        "shadowmap_directional",
        include_str!("../../shader/shadowmap_directional.wgsl"),
        &[],
    ),
    (
        "bounding_box",
        include_str!("../../shader/bounding_box.wgsl"),
        &["lineColor"],
    ),
];

const DEFAULT_GAMMA: f32 = 2.2;

/// Owns the stage pipeline and every GPU-side resource the scene needs, and
/// drives one frame at a time through a [`GraphicsBackend`].
pub struct Renderer<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) settings: RenderSettings,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) programs: Registry<ShaderProgram>,
    pub(crate) stages: Registry<RenderStage>,
    pub(crate) pipeline: Pipeline,
    pub(crate) lights: LightTables,
    pub(crate) geometry: GeometryStore,
    pub(crate) materials: MaterialBindings,
    /// Lighting programs that already have a stage.
    pub(crate) lighting_programs: BTreeSet<Handle<ShaderProgram>>,
    pub(crate) pending_lighting: Vec<Handle<ShaderProgram>>,
    pub(crate) lighting_stages: usize,
    pub(crate) invalidations: Invalidations,
    pub(crate) stats: FrameStats,
    last_stats: FrameStats,
    frame: u64,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, settings: RenderSettings) -> Result<Self> {
        let settings = settings.validate();
        let (width, height) = (settings.resolution.width, settings.resolution.height);
        backend
            .resize_screen(width, height)
            .map_err(report("Renderer::new"))?;

        let mut renderer = Self {
            backend,
            settings,
            width,
            height,
            programs: Registry::new("shader program"),
            stages: Registry::new("render stage"),
            pipeline: Pipeline::new(),
            lights: LightTables::new(),
            geometry: GeometryStore::new(),
            materials: MaterialBindings::new(),
            lighting_programs: BTreeSet::new(),
            pending_lighting: Vec::new(),
            lighting_stages: 0,
            invalidations: Invalidations::new(),
            stats: FrameStats::default(),
            last_stats: FrameStats::default(),
            frame: 0,
        };
        renderer
            .install_defaults()
            .map_err(report("Renderer::new"))?;

        log::info!(
            "Renderer created: {}x{}, {:?} mode, {} samples, shadows {}",
            width,
            height,
            renderer.settings.mode,
            renderer.settings.sample_count,
            if renderer.settings.shadow_mapping { "on" } else { "off" }
        );
        Ok(renderer)
    }

    fn install_defaults(&mut self) -> Result<()> {
        for (name, source, uniforms) in DEFAULT_PROGRAMS {
            self.register_program(name, source, uniforms)?;
        }
        self.geometry.quad(&mut self.backend)?;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn lights(&self) -> &LightTables {
        &self.lights
    }

    pub fn geometry(&self) -> &GeometryStore {
        &self.geometry
    }

    pub fn lighting_stage_count(&self) -> usize {
        self.lighting_stages
    }

    /// Counters of the last frame that completed.
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    // ------------------------------------------------------------------
    // Shader programs
    // ------------------------------------------------------------------

    pub fn add_shader_program(
        &mut self,
        name: &str,
        source: &str,
        uniforms: &[&str],
    ) -> Result<Handle<ShaderProgram>> {
        self.register_program(name, source, uniforms)
            .map_err(report("Renderer::add_shader_program"))
    }

    fn register_program(
        &mut self,
        name: &str,
        source: &str,
        uniforms: &[&str],
    ) -> Result<Handle<ShaderProgram>> {
        let id = self
            .backend
            .compile_program(&ProgramDescriptor { name, source })?;
        let program = ShaderProgram::new(
            name,
            id,
            uniforms.iter().map(|uniform| uniform.to_string()).collect(),
        )?;
        log::debug!("Shader program '{}' compiled as {:?}", name, id);
        Ok(self.programs.insert(name, program))
    }

    pub fn shader_program(&self, name: &str) -> Result<Handle<ShaderProgram>> {
        self.programs.handle_of(name)
    }

    pub fn program(&self, handle: Handle<ShaderProgram>) -> Result<&ShaderProgram> {
        self.programs.fetch(handle)
    }

    // ------------------------------------------------------------------
    // Framebuffers
    // ------------------------------------------------------------------

    /// Framebuffer owned by the caller. The request is checked before
    /// anything is allocated.
    #[allow(clippy::too_many_arguments)]
    pub fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        plain_colors: u32,
        alpha_colors: u32,
        depth_array_layers: u32,
        depth_stencil: bool,
        multisample: bool,
    ) -> Result<Framebuffer> {
        let desc = FramebufferDescriptor {
            width,
            height,
            plain_color_count: plain_colors,
            alpha_color_count: alpha_colors,
            depth_array_layers,
            depth_stencil,
            sample_count: if multisample {
                self.settings.sample_count
            } else {
                1
            },
        };
        Framebuffer::create(&mut self.backend, desc).map_err(report("Renderer::create_framebuffer"))
    }

    /// Recreates the attachments of a caller-owned framebuffer at a new
    /// size. The id is unchanged.
    pub fn resize_framebuffer(
        &mut self,
        framebuffer: &mut Framebuffer,
        width: u32,
        height: u32,
    ) -> Result<()> {
        framebuffer
            .resize(&mut self.backend, width, height)
            .map_err(report("Renderer::resize_framebuffer"))
    }

    pub fn destroy_framebuffer(&mut self, framebuffer: Framebuffer) {
        framebuffer.destroy(&mut self.backend);
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    pub fn stage(&self, handle: StageHandle) -> Result<&RenderStage> {
        self.stages.fetch(handle)
    }

    pub fn stage_by_name(&self, name: &str) -> Result<StageHandle> {
        self.stages.handle_of(name)
    }

    pub fn stage_at(&self, index: usize) -> Result<&RenderStage> {
        self.stages.fetch(self.pipeline.stage_at(index)?)
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.pipeline
            .stages()
            .iter()
            .filter_map(|handle| self.stages.get(*handle).map(RenderStage::name))
            .collect()
    }

    /// Creates and initializes a stage and appends it to the pipeline.
    /// Full-screen kinds use the program named in `config`, or their
    /// built-in default.
    pub fn create_stage(
        &mut self,
        name: &str,
        kind: StageKind,
        config: StageConfig,
    ) -> Result<StageHandle> {
        self.build_stage(name, kind, config)
            .map_err(report("Renderer::create_stage"))
    }

    fn build_stage(
        &mut self,
        name: &str,
        kind: StageKind,
        config: StageConfig,
    ) -> Result<StageHandle> {
        let program = match config.program.as_deref().or(kind.default_program()) {
            Some(program) => Some(self.programs.handle_of(program)?),
            None => None,
        };
        self.create_stage_with_program(name, kind, config, program)
    }

    pub(crate) fn create_stage_with_program(
        &mut self,
        name: &str,
        kind: StageKind,
        config: StageConfig,
        program: Option<Handle<ShaderProgram>>,
    ) -> Result<StageHandle> {
        let env = self.environment();
        let mut stage = RenderStage::new(name, kind, config, program)?;
        stage.initialize(&mut self.backend, &env)?;
        let handle = self.stages.insert(name, stage);
        self.pipeline.push(handle);
        Ok(handle)
    }

    /// Applies `edit` to the stage config and reallocates the owned
    /// framebuffer if its shape changed.
    pub fn configure_stage(
        &mut self,
        handle: StageHandle,
        edit: impl FnOnce(StageConfig) -> StageConfig,
    ) -> Result<()> {
        self.reconfigure_stage(handle, edit)
            .map_err(report("Renderer::configure_stage"))
    }

    pub(crate) fn reconfigure_stage(
        &mut self,
        handle: StageHandle,
        edit: impl FnOnce(StageConfig) -> StageConfig,
    ) -> Result<()> {
        let env = self.environment();
        let stage = self.stages.fetch_mut(handle)?;
        let config = edit(stage.config().clone());
        stage.reconfigure(config, &mut self.backend, &env)
    }

    pub fn set_stage_framebuffer_enabled(&mut self, handle: StageHandle, enabled: bool) -> Result<()> {
        self.configure_stage(handle, |config| config.with_framebuffer(enabled))
    }

    pub fn set_stage_multisample_enabled(&mut self, handle: StageHandle, enabled: bool) -> Result<()> {
        self.configure_stage(handle, |config| config.with_multisample(enabled))
    }

    /// Rebinds a stage to another program. Stored parameters are dropped.
    pub fn set_stage_shader_program(&mut self, handle: StageHandle, program: &str) -> Result<()> {
        self.rebind_stage_program(handle, program)
            .map_err(report("Renderer::set_stage_shader_program"))
    }

    fn rebind_stage_program(&mut self, handle: StageHandle, program: &str) -> Result<()> {
        let program = self.programs.handle_of(program)?;
        self.stages.fetch_mut(handle)?.set_program(program);
        Ok(())
    }

    pub fn set_stage_parameter(
        &mut self,
        handle: StageHandle,
        name: &str,
        values: &[f32],
    ) -> Result<()> {
        self.store_stage_parameter(handle, name, values)
            .map_err(report("Renderer::set_stage_parameter"))
    }

    fn store_stage_parameter(
        &mut self,
        handle: StageHandle,
        name: &str,
        values: &[f32],
    ) -> Result<()> {
        let stage = self.stages.fetch_mut(handle)?;
        let program = stage
            .program()
            .ok_or_else(|| RenderError::MissingShaderProgram {
                stage: stage.name().to_string(),
            })
            .and_then(|program| self.programs.fetch(program))?;
        stage.set_parameter(program, name, values)
    }

    /// Resizes the screen and every stage framebuffer sized after it.
    /// Framebuffer ids survive the resize.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        self.apply_resolution(width, height)
            .map_err(report("Renderer::set_resolution"))?;
        log::info!("Resolution changed to {}x{}", width, height);
        Ok(())
    }

    fn apply_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSizedFramebuffer { width, height });
        }
        self.backend.resize_screen(width, height)?;
        self.width = width;
        self.height = height;
        self.settings.resolution.width = width;
        self.settings.resolution.height = height;
        self.sync_stage_framebuffers(|_| true)
    }

    pub(crate) fn environment(&self) -> StageEnvironment {
        StageEnvironment {
            width: self.width,
            height: self.height,
            sample_count: self.settings.sample_count,
            shadow_map_size: self.settings.shadow_map_size,
            directional_lights: self.lights.directional_count() as u32,
        }
    }

    pub(crate) fn sync_stage_framebuffers(
        &mut self,
        filter: impl Fn(&RenderStage) -> bool,
    ) -> Result<()> {
        let env = self.environment();
        for (_, stage) in self.stages.iter_mut() {
            if filter(stage) {
                stage.sync_framebuffer(&mut self.backend, &env)?;
            }
        }
        Ok(())
    }

    /// Shadow stage (when enabled), the geometry stage of the configured
    /// mode, and a gamma-correcting quad to the screen.
    pub fn build_default_pipeline(&mut self) -> Result<()> {
        self.assemble_default_pipeline()
            .map_err(report("Renderer::build_default_pipeline"))?;
        log::info!("Default pipeline: {:?}", self.stage_names());
        Ok(())
    }

    fn assemble_default_pipeline(&mut self) -> Result<()> {
        if !self.pipeline.is_empty() {
            return Err(RenderError::Protocol("pipeline already built"));
        }
        let shadows = self.settings.shadow_mapping;
        if shadows {
            self.build_stage(
                "shadow",
                StageKind::ShadowMap,
                StageConfig::new()
                    .with_face_culling(false)
                    .with_clear_color(false),
            )?;
        }

        if self.settings.is_deferred() {
            self.build_stage(
                "gbuffer",
                StageKind::DeferredGeometry,
                StageConfig::new()
                    .with_stencil_test(StencilFunction::Always, 0)
                    .with_stencil_operation(StencilOperation::Replace),
            )?;
        } else {
            let depth_array = if shadows {
                PipelineLink::First
            } else {
                PipelineLink::Current
            };
            self.build_stage(
                "forward",
                StageKind::ForwardGeometry,
                StageConfig::new()
                    .with_multisample(self.settings.sample_count > 1)
                    .with_depth_array_link(depth_array),
            )?;
        }

        let present = self.build_stage(
            "present",
            StageKind::Quad,
            StageConfig::new()
                .with_program("post_gamma")
                .with_framebuffer(false)
                .with_depth_test(false)
                .with_face_culling(false)
                .with_clear_depth(false)
                .with_clear_stencil(false)
                .with_color_link(PipelineLink::Previous),
        )?;
        self.store_stage_parameter(present, "gamma", &[DEFAULT_GAMMA])?;

        self.inject_pending_lighting()
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Flushes pending scene changes and runs every stage in order. Any
    /// failure aborts the whole frame.
    pub fn render_frame(&mut self, scene: &mut Scene) -> Result<FrameStats> {
        self.frame += 1;
        self.stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };

        let result = self
            .apply_invalidations(scene)
            .and_then(|()| self.execute(scene));
        match result {
            Ok(()) => {
                self.last_stats = self.stats;
                log::debug!("Frame {} done: {:?}", self.frame, self.stats);
                Ok(self.stats)
            }
            Err(err) => {
                self.backend.abort_frame();
                self.pipeline.set_current(None);
                self.stats = FrameStats::default();
                Err(report("Renderer::render_frame")(err))
            }
        }
    }

    fn execute(&mut self, scene: &Scene) -> Result<()> {
        self.validate_pipeline()?;
        let drawables = scene.drawables()?;
        self.backend
            .write_camera(&scene.camera().uniform(self.width, self.height));

        self.backend.begin_frame()?;
        for index in 0..self.pipeline.len() {
            self.pipeline.set_current(Some(index));
            let stage = self.stages.fetch(self.pipeline.stage_at(index)?)?;
            let mut ctx = FrameContext {
                backend: &mut self.backend,
                pipeline: &self.pipeline,
                stages: &self.stages,
                programs: &self.programs,
                drawables: &drawables,
                geometry: &self.geometry,
                materials: &self.materials,
                lights: &self.lights,
                width: self.width,
                height: self.height,
                clear_color: self.settings.clear_color,
                stats: &mut self.stats,
            };
            stage.on_frame(index, &mut ctx).map_err(|err| {
                log::debug!("Render stage '{}' at index {} failed", stage.name(), index);
                err
            })?;
        }
        self.pipeline.set_current(None);
        self.backend.end_frame()
    }

    /// Checks the structural invariants a frame relies on.
    pub fn validate_pipeline(&self) -> Result<()> {
        let len = self.pipeline.len();
        if len == 0 {
            return Err(RenderError::EmptyPipeline);
        }
        if stage_output(&self.pipeline, &self.stages, len - 1)?.is_some() {
            return Err(RenderError::FinalStageNotOnScreen {
                stage: self.stage_at(len - 1)?.name().to_string(),
            });
        }

        if self.settings.is_deferred() {
            let mut prefix_ended = false;
            for index in 0..len {
                let stage = self.stage_at(index)?;
                let geometry = stage.kind().class() == StageClass::Geometry;
                if geometry && prefix_ended {
                    return Err(RenderError::GeometryPrefixBroken {
                        stage: stage.name().to_string(),
                        index,
                    });
                }
                prefix_ended |= !geometry;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scene updates
    // ------------------------------------------------------------------

    /// Creates or reloads the geometry buffers of a drawable.
    pub fn update_mesh(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        self.upload_mesh(scene, object)
            .map_err(report("Renderer::update_mesh"))
    }

    pub(crate) fn upload_mesh(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        let mesh = scene.mesh(object).ok_or(RenderError::UnknownHandle {
            kind: "mesh",
            index: object.id() as usize,
        })?;
        let upload = self
            .geometry
            .upload_mesh(&mut self.backend, object, &mesh.mesh)?;
        self.stats.geometry_uploads += 1;
        log::debug!("Mesh {:?}: {:?}", object, upload);
        Ok(())
    }

    /// Writes the light's record into its slot and uploads that slot.
    pub fn update_light(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        self.upload_light(scene, object)
            .map_err(report("Renderer::update_light"))
    }

    pub(crate) fn upload_light(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        let light = scene.light(object).ok_or(RenderError::UnknownHandle {
            kind: "light",
            index: object.id() as usize,
        })?;
        let world = scene.world_matrix(object)?;
        self.lights
            .update(object, &light, &world, &mut self.backend)?;
        self.stats.light_slot_uploads += 1;
        Ok(())
    }

    /// Rebuilds the material's binding. A lighting program seen for the
    /// first time gets its own lighting stage in deferred mode.
    pub fn update_material(&mut self, scene: &Scene, material: Handle<Material>) -> Result<()> {
        self.rebuild_material(scene, material)
            .map_err(report("Renderer::update_material"))
    }

    pub(crate) fn rebuild_material(
        &mut self,
        scene: &Scene,
        material: Handle<Material>,
    ) -> Result<()> {
        let lighting_program = self
            .materials
            .rebuild(material, scene.material(material)?, &self.programs)?
            .lighting_program;
        self.stats.material_updates += 1;
        self.request_lighting_stage(lighting_program)
    }

    /// Uploads the texture the material binds to `unit`.
    pub fn update_material_texture(
        &mut self,
        scene: &Scene,
        material: Handle<Material>,
        unit: u32,
    ) -> Result<()> {
        self.upload_material_texture(scene, material, unit)
            .map_err(report("Renderer::update_material_texture"))
    }

    pub(crate) fn upload_material_texture(
        &mut self,
        scene: &Scene,
        material: Handle<Material>,
        unit: u32,
    ) -> Result<()> {
        let texture = *scene
            .material(material)?
            .textures
            .get(&unit)
            .ok_or(RenderError::HandleOutOfBounds {
                kind: "material texture unit",
                index: unit as usize,
                capacity: crate::gpu::MAX_TEXTURE_UNITS,
            })?;
        let id = self.backend.create_texture(scene.texture(texture)?)?;
        match self.materials.set_texture(material, unit, id) {
            Ok(Some(previous)) => self.backend.destroy_texture(previous),
            Ok(None) => {}
            Err(err) => {
                self.backend.destroy_texture(id);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Recomputes the world-space bounding box of a drawable and reloads
    /// its wireframe.
    pub fn update_bounding_volume(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        self.refresh_bounding_volume(scene, object)
            .map_err(report("Renderer::update_bounding_volume"))
    }

    pub(crate) fn refresh_bounding_volume(&mut self, scene: &Scene, object: Entity) -> Result<()> {
        let bounds = {
            let mesh = scene.mesh(object).ok_or(RenderError::UnknownHandle {
                kind: "mesh",
                index: object.id() as usize,
            })?;
            mesh.mesh.bounds()
        };
        let world = scene.world_matrix(object)?;
        self.geometry
            .upload_wireframe(&mut self.backend, object, bounds.transformed(&world))?;
        self.stats.bounding_volume_updates += 1;
        Ok(())
    }
}

impl<B: GraphicsBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        for (_, stage) in self.stages.iter_mut() {
            stage.deinitialize(&mut self.backend);
        }
        self.geometry.release_all(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, HeadlessBackend};
    use crate::settings::RenderMode;

    fn settings(mode: RenderMode) -> RenderSettings {
        RenderSettings {
            mode,
            sample_count: 1,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn default_programs_are_registered() {
        let renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        for (name, _, uniforms) in DEFAULT_PROGRAMS {
            let handle = renderer.shader_program(name).expect("program");
            assert_eq!(renderer.program(handle).expect("program").uniforms().len(), uniforms.len());
        }
        assert!(renderer.geometry().screen_quad().is_some());
    }

    #[test]
    fn empty_pipeline_aborts_frame() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        let mut scene = Scene::new();
        assert_eq!(
            renderer.render_frame(&mut scene),
            Err(RenderError::EmptyPipeline)
        );
        assert_eq!(
            renderer.backend().count(|c| matches!(c, GpuCommand::BeginFrame)),
            0
        );
    }

    #[test]
    fn default_forward_pipeline_ends_on_screen() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        renderer.build_default_pipeline().expect("pipeline");
        assert_eq!(renderer.stage_names(), vec!["forward", "present"]);
        renderer.validate_pipeline().expect("valid");
        assert!(renderer.build_default_pipeline().is_err());
    }

    #[test]
    fn stage_parameters_must_be_declared() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        let stage = renderer
            .create_stage(
                "tonemap",
                StageKind::Quad,
                StageConfig::new().with_program("post_hdr"),
            )
            .expect("stage");
        renderer
            .set_stage_parameter(stage, "exposure", &[1.5])
            .expect("declared");
        assert!(matches!(
            renderer.set_stage_parameter(stage, "gamma", &[2.2]),
            Err(RenderError::MissingUniform { .. })
        ));
        assert_eq!(
            renderer.stage(stage).expect("stage").parameter("exposure"),
            Some(&[1.5][..])
        );
    }

    #[test]
    fn disabling_framebuffer_releases_it() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Deferred))
            .expect("renderer");
        renderer.build_default_pipeline().expect("pipeline");
        assert_eq!(renderer.backend().live_framebuffers(), 1);
        let stage = renderer.stage_by_name("gbuffer").expect("stage");
        renderer
            .set_stage_framebuffer_enabled(stage, false)
            .expect("disable");
        assert_eq!(renderer.backend().live_framebuffers(), 0);
    }

    #[test]
    fn caller_owned_framebuffer_resizes_in_place() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        let mut framebuffer = renderer
            .create_framebuffer(320, 240, 1, 1, 0, true, false)
            .expect("framebuffer");
        let id = framebuffer.id();

        renderer
            .resize_framebuffer(&mut framebuffer, 800, 600)
            .expect("resize");
        assert_eq!(framebuffer.id(), id);
        assert_eq!(
            renderer.backend().framebuffer(id).map(|desc| (desc.width, desc.height)),
            Some((800, 600))
        );
        assert!(renderer.resize_framebuffer(&mut framebuffer, 0, 600).is_err());
        assert_eq!(framebuffer.width(), 800);

        renderer.destroy_framebuffer(framebuffer);
        assert_eq!(renderer.backend().live_framebuffers(), 0);
    }

    #[test]
    fn unknown_program_leaves_stage_binding_alone() {
        let mut renderer = Renderer::new(HeadlessBackend::new(), settings(RenderMode::Forward))
            .expect("renderer");
        let stage = renderer
            .create_stage(
                "present",
                StageKind::Quad,
                StageConfig::new()
                    .with_program("post_gamma")
                    .with_framebuffer(false),
            )
            .expect("stage");
        let gamma = renderer.shader_program("post_gamma").expect("program");

        assert!(matches!(
            renderer.set_stage_shader_program(stage, "post_bloom"),
            Err(RenderError::NameNotFound { .. })
        ));
        assert_eq!(renderer.stage(stage).expect("stage").program(), Some(gamma));

        renderer
            .set_stage_shader_program(stage, "post_fxaa")
            .expect("rebind");
        let fxaa = renderer.shader_program("post_fxaa").expect("program");
        assert_eq!(renderer.stage(stage).expect("stage").program(), Some(fxaa));
    }
}
