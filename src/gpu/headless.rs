use std::collections::{HashMap, HashSet};

use super::{
    DrawCall, FramebufferDescriptor, FramebufferId, GeometryData, GeometryId, GraphicsBackend,
    ProgramDescriptor, ProgramId, StagePass, TextureId, MAX_COLOR_ATTACHMENTS,
};
use crate::asset::TextureData;
use crate::error::{RenderError, Result};
use crate::renderer::lights::LightKind;
use crate::renderer::uniforms::CameraUniform;

/// One call received by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateFramebuffer {
        id: FramebufferId,
        desc: FramebufferDescriptor,
    },
    RecreateFramebuffer {
        id: FramebufferId,
        desc: FramebufferDescriptor,
    },
    DestroyFramebuffer(FramebufferId),
    ResolveFramebuffer(FramebufferId),
    CompileProgram {
        id: ProgramId,
        name: String,
    },
    CreateGeometry {
        id: GeometryId,
        index_count: u32,
        bone_count: usize,
    },
    ReloadGeometry {
        id: GeometryId,
        index_count: u32,
        bone_count: usize,
    },
    DestroyGeometry(GeometryId),
    CreateTexture {
        id: TextureId,
        width: u32,
        height: u32,
    },
    DestroyTexture(TextureId),
    WriteLightSlots {
        kind: LightKind,
        offset: u64,
        bytes: Vec<u8>,
    },
    WriteCamera(CameraUniform),
    ResizeScreen {
        width: u32,
        height: u32,
    },
    BeginFrame,
    BeginStage(StagePass),
    Draw(DrawCall),
    EndStage,
    EndFrame,
    AbortFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Frame,
    Stage,
}

/// Backend without a device. Issues ids, checks the frame protocol and
/// records every call so pipeline behaviour can be asserted in tests.
pub struct HeadlessBackend {
    next_id: u32,
    commands: Vec<GpuCommand>,
    framebuffers: HashMap<FramebufferId, FramebufferDescriptor>,
    geometries: HashSet<GeometryId>,
    programs: HashSet<ProgramId>,
    phase: Phase,
    reject_framebuffers: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            commands: Vec::new(),
            framebuffers: HashMap::new(),
            geometries: HashSet::new(),
            programs: HashSet::new(),
            phase: Phase::Idle,
            reject_framebuffers: false,
        }
    }

    /// Makes every following framebuffer creation fail as incomplete.
    pub fn set_reject_framebuffers(&mut self, reject: bool) {
        self.reject_framebuffers = reject;
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Option<&FramebufferDescriptor> {
        self.framebuffers.get(&id)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_geometries(&self) -> usize {
        self.geometries.len()
    }

    /// Stage passes recorded so far, in order.
    pub fn stage_passes(&self) -> Vec<&StagePass> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::BeginStage(pass) => Some(pass),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Draw(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }

    fn issue(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_framebuffer(&self, desc: &FramebufferDescriptor) -> Result<()> {
        desc.validate()?;
        if self.reject_framebuffers {
            return Err(RenderError::IncompleteFramebuffer {
                reason: "rejected by headless backend".into(),
            });
        }
        desc.check_complete(MAX_COLOR_ATTACHMENTS)
    }

    fn expect_phase(&self, phase: Phase, message: &'static str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(RenderError::Protocol(message))
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> Result<FramebufferId> {
        self.check_framebuffer(desc)?;
        let id = FramebufferId(self.issue());
        self.framebuffers.insert(id, *desc);
        self.commands.push(GpuCommand::CreateFramebuffer { id, desc: *desc });
        Ok(id)
    }

    fn recreate_framebuffer(
        &mut self,
        id: FramebufferId,
        desc: &FramebufferDescriptor,
    ) -> Result<()> {
        if !self.framebuffers.contains_key(&id) {
            return Err(RenderError::UnknownHandle {
                kind: "framebuffer",
                index: id.0 as usize,
            });
        }
        self.check_framebuffer(desc)?;
        self.framebuffers.insert(id, *desc);
        self.commands
            .push(GpuCommand::RecreateFramebuffer { id, desc: *desc });
        Ok(())
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.framebuffers.remove(&id).is_some() {
            self.commands.push(GpuCommand::DestroyFramebuffer(id));
        }
    }

    fn resolve_framebuffer(&mut self, id: FramebufferId) -> Result<()> {
        self.expect_phase(Phase::Frame, "resolve outside of a frame")?;
        match self.framebuffers.get(&id) {
            Some(desc) if desc.is_multisampled() => {
                self.commands.push(GpuCommand::ResolveFramebuffer(id));
                Ok(())
            }
            Some(_) => Err(RenderError::Protocol(
                "resolve of a single-sample framebuffer",
            )),
            None => Err(RenderError::UnknownHandle {
                kind: "framebuffer",
                index: id.0 as usize,
            }),
        }
    }

    fn compile_program(&mut self, desc: &ProgramDescriptor<'_>) -> Result<ProgramId> {
        if desc.source.trim().is_empty() {
            return Err(RenderError::Backend(format!(
                "program '{}' has no source",
                desc.name
            )));
        }
        let id = ProgramId(self.issue());
        self.programs.insert(id);
        self.commands.push(GpuCommand::CompileProgram {
            id,
            name: desc.name.to_string(),
        });
        Ok(id)
    }

    fn create_geometry(&mut self, data: &GeometryData<'_>) -> Result<GeometryId> {
        let id = GeometryId(self.issue());
        self.geometries.insert(id);
        self.commands.push(GpuCommand::CreateGeometry {
            id,
            index_count: data.indices.len() as u32,
            bone_count: data.bones.len(),
        });
        Ok(id)
    }

    fn reload_geometry(&mut self, id: GeometryId, data: &GeometryData<'_>) -> Result<()> {
        if !self.geometries.contains(&id) {
            return Err(RenderError::UnknownHandle {
                kind: "geometry",
                index: id.0 as usize,
            });
        }
        self.commands.push(GpuCommand::ReloadGeometry {
            id,
            index_count: data.indices.len() as u32,
            bone_count: data.bones.len(),
        });
        Ok(())
    }

    fn destroy_geometry(&mut self, id: GeometryId) {
        if self.geometries.remove(&id) {
            self.commands.push(GpuCommand::DestroyGeometry(id));
        }
    }

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId> {
        data.validate()?;
        let id = TextureId(self.issue());
        self.commands.push(GpuCommand::CreateTexture {
            id,
            width: data.width,
            height: data.height,
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.commands.push(GpuCommand::DestroyTexture(id));
    }

    fn write_light_slots(&mut self, kind: LightKind, offset: u64, bytes: &[u8]) {
        self.commands.push(GpuCommand::WriteLightSlots {
            kind,
            offset,
            bytes: bytes.to_vec(),
        });
    }

    fn write_camera(&mut self, camera: &CameraUniform) {
        self.commands.push(GpuCommand::WriteCamera(*camera));
    }

    fn resize_screen(&mut self, width: u32, height: u32) -> Result<()> {
        self.commands.push(GpuCommand::ResizeScreen { width, height });
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.expect_phase(Phase::Idle, "frame already in progress")?;
        self.phase = Phase::Frame;
        self.commands.push(GpuCommand::BeginFrame);
        Ok(())
    }

    fn begin_stage(&mut self, pass: StagePass) -> Result<()> {
        self.expect_phase(Phase::Frame, "stage opened outside of a frame")?;
        self.phase = Phase::Stage;
        self.commands.push(GpuCommand::BeginStage(pass));
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<()> {
        self.expect_phase(Phase::Stage, "draw outside of a stage")?;
        if !self.programs.contains(&call.program) {
            return Err(RenderError::UnknownHandle {
                kind: "program",
                index: call.program.0 as usize,
            });
        }
        if !self.geometries.contains(&call.geometry) {
            return Err(RenderError::UnknownHandle {
                kind: "geometry",
                index: call.geometry.0 as usize,
            });
        }
        self.commands.push(GpuCommand::Draw(call));
        Ok(())
    }

    fn end_stage(&mut self) -> Result<()> {
        self.expect_phase(Phase::Stage, "end_stage without begin_stage")?;
        self.phase = Phase::Frame;
        self.commands.push(GpuCommand::EndStage);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.expect_phase(Phase::Frame, "end_frame outside of a frame")?;
        self.phase = Phase::Idle;
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }

    fn abort_frame(&mut self) {
        if self.phase != Phase::Idle {
            self.phase = Phase::Idle;
            self.commands.push(GpuCommand::AbortFrame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadow_descriptor(layers: u32) -> FramebufferDescriptor {
        FramebufferDescriptor {
            width: 512,
            height: 512,
            plain_color_count: 0,
            alpha_color_count: 0,
            depth_array_layers: layers,
            depth_stencil: false,
            sample_count: 1,
        }
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut backend = HeadlessBackend::new();
        let fb = backend
            .create_framebuffer(&shadow_descriptor(2))
            .expect("framebuffer");
        let program = backend
            .compile_program(&ProgramDescriptor {
                name: "p",
                source: "fn main() {}",
            })
            .expect("program");
        assert_ne!(fb.0, program.0);
        assert_eq!(backend.live_framebuffers(), 1);
    }

    #[test]
    fn draw_outside_stage_is_protocol_error() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame().expect("frame");
        let err = backend.end_stage().unwrap_err();
        assert!(matches!(err, RenderError::Protocol(_)));
    }

    #[test]
    fn rejecting_backend_reports_incomplete() {
        let mut backend = HeadlessBackend::new();
        backend.set_reject_framebuffers(true);
        let err = backend
            .create_framebuffer(&shadow_descriptor(1))
            .unwrap_err();
        assert!(matches!(err, RenderError::IncompleteFramebuffer { .. }));
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn recreate_keeps_id() {
        let mut backend = HeadlessBackend::new();
        let id = backend
            .create_framebuffer(&shadow_descriptor(1))
            .expect("framebuffer");
        backend
            .recreate_framebuffer(id, &shadow_descriptor(3))
            .expect("recreate");
        assert_eq!(backend.framebuffer(id).map(|d| d.depth_array_layers), Some(3));
        assert_eq!(backend.live_framebuffers(), 1);
    }
}
