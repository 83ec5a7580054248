use crate::error::{report, Result};
use crate::gpu::GraphicsBackend;
use crate::renderer::invalidation::FlushPlan;
use crate::renderer::renderer::Renderer;
use crate::renderer::stage::StageKind;
use crate::scene::{ObjectKind, Scene};

impl<B: GraphicsBackend> Renderer<B> {
    /// Drains the scene's notifications and applies them: removals, mesh
    /// uploads, material rebuilds, texture uploads, then one light upload or
    /// bounding-volume refresh per touched object.
    ///
    /// Runs at the start of every frame; call it directly to apply changes
    /// without drawing.
    pub fn flush(&mut self, scene: &mut Scene) -> Result<()> {
        self.apply_invalidations(scene)
            .map_err(report("Renderer::flush"))
    }

    /// Work that fails stays recorded, together with everything behind it,
    /// and is retried by the next flush.
    pub(crate) fn apply_invalidations(&mut self, scene: &mut Scene) -> Result<()> {
        for event in scene.drain_events() {
            self.invalidations.record(event, scene);
        }

        let directional_before = self.lights.directional_count();
        if !self.invalidations.is_empty() {
            let mut plan = self.invalidations.take();
            log::debug!(
                "Flush: {} removed, {} meshes, {} materials, {} textures, {} objects",
                plan.removed.len(),
                plan.meshes.len(),
                plan.materials.len(),
                plan.material_textures.len(),
                plan.objects.len()
            );
            if let Err(err) = self.apply_plan(scene, &mut plan) {
                self.invalidations.restore(plan);
                return Err(err);
            }
        }

        self.inject_pending_lighting()?;

        if self.lights.directional_count() != directional_before {
            log::info!(
                "Directional lights: {} -> {}, resizing shadow layers",
                directional_before,
                self.lights.directional_count()
            );
        }
        // also catches up on a resize an earlier flush failed to finish
        self.sync_stage_framebuffers(|stage| stage.kind() == StageKind::ShadowMap)
    }

    /// Applies `plan` front to back, removing each entry once it is done.
    fn apply_plan(&mut self, scene: &Scene, plan: &mut FlushPlan) -> Result<()> {
        while let Some(&(object, kind)) = plan.removed.front() {
            match kind {
                ObjectKind::Drawable => self.geometry.remove(&mut self.backend, object),
                ObjectKind::Light(_) => {
                    if let Some((kind, slot)) = self.lights.remove(object, &mut self.backend) {
                        log::debug!("Released {:?} light slot {}", kind, slot);
                    }
                }
                ObjectKind::Group => {}
            }
            plan.removed.pop_front();
        }

        while let Some(&object) = plan.meshes.front() {
            if scene.contains(object) {
                self.upload_mesh(scene, object)?;
            }
            plan.meshes.pop_front();
        }
        while let Some(&material) = plan.materials.front() {
            self.rebuild_material(scene, material)?;
            plan.materials.pop_front();
        }
        while let Some(&(material, unit)) = plan.material_textures.front() {
            self.upload_material_texture(scene, material, unit)?;
            plan.material_textures.pop_front();
        }
        while let Some(&object) = plan.objects.front() {
            if scene.contains(object) {
                match scene.object_kind(object)? {
                    ObjectKind::Light(_) => self.upload_light(scene, object)?,
                    ObjectKind::Drawable => self.refresh_bounding_volume(scene, object)?,
                    ObjectKind::Group => {}
                }
            }
            plan.objects.pop_front();
        }
        Ok(())
    }
}
