use std::collections::HashMap;

use hecs::Entity;

use crate::asset::{Aabb, MeshData};
use crate::error::Result;
use crate::gpu::{GeometryData, GeometryId, GraphicsBackend};

/// GPU copy of one mesh: vertex, index and bone buffers behind one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuffers {
    pub id: GeometryId,
    pub index_count: u32,
}

/// Whether an upload allocated new buffers or refilled existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryUpload {
    Created,
    Reloaded,
}

/// Geometry buffers keyed by the scene object they belong to, plus the
/// world-space bounding-box wireframes and the shared full-screen quad.
#[derive(Default)]
pub struct GeometryStore {
    meshes: HashMap<Entity, GeometryBuffers>,
    wireframes: HashMap<Entity, (GeometryBuffers, Aabb)>,
    quad: Option<GeometryBuffers>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the object's buffers on first sight, reloads them afterwards.
    pub fn upload_mesh(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        object: Entity,
        mesh: &MeshData,
    ) -> Result<GeometryUpload> {
        let (buffers, upload) = upload(backend, self.meshes.get_mut(&object), mesh)?;
        self.meshes.insert(object, buffers);
        Ok(upload)
    }

    /// Re-uploads the world-space box outline of `object`.
    pub fn upload_wireframe(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        object: Entity,
        bounds: Aabb,
    ) -> Result<GeometryUpload> {
        let wire = bounds.wireframe();
        let existing = self.wireframes.get_mut(&object).map(|(buffers, _)| buffers);
        let (buffers, upload) = upload(backend, existing, &wire)?;
        self.wireframes.insert(object, (buffers, bounds));
        Ok(upload)
    }

    /// The shared quad, created on first use.
    pub fn quad(&mut self, backend: &mut dyn GraphicsBackend) -> Result<GeometryBuffers> {
        if let Some(quad) = self.quad {
            return Ok(quad);
        }
        let (quad, _) = upload(backend, None, &MeshData::screen_quad())?;
        log::info!("Created full-screen quad geometry {:?}", quad.id);
        self.quad = Some(quad);
        Ok(quad)
    }

    pub fn screen_quad(&self) -> Option<GeometryBuffers> {
        self.quad
    }

    pub fn mesh(&self, object: Entity) -> Option<GeometryBuffers> {
        self.meshes.get(&object).copied()
    }

    pub fn wireframe(&self, object: Entity) -> Option<(GeometryBuffers, Aabb)> {
        self.wireframes.get(&object).copied()
    }

    /// Releases everything held for `object`.
    pub fn remove(&mut self, backend: &mut dyn GraphicsBackend, object: Entity) {
        if let Some(buffers) = self.meshes.remove(&object) {
            backend.destroy_geometry(buffers.id);
        }
        if let Some((buffers, _)) = self.wireframes.remove(&object) {
            backend.destroy_geometry(buffers.id);
        }
    }

    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, buffers) in self.meshes.drain() {
            backend.destroy_geometry(buffers.id);
        }
        for (_, (buffers, _)) in self.wireframes.drain() {
            backend.destroy_geometry(buffers.id);
        }
        if let Some(quad) = self.quad.take() {
            backend.destroy_geometry(quad.id);
        }
    }
}

fn upload(
    backend: &mut dyn GraphicsBackend,
    existing: Option<&mut GeometryBuffers>,
    mesh: &MeshData,
) -> Result<(GeometryBuffers, GeometryUpload)> {
    let data = GeometryData {
        vertices: &mesh.vertices,
        indices: &mesh.indices,
        bones: &mesh.bones,
    };
    let index_count = mesh.indices.len() as u32;
    match existing {
        Some(buffers) => {
            backend.reload_geometry(buffers.id, &data)?;
            buffers.index_count = index_count;
            Ok((*buffers, GeometryUpload::Reloaded))
        }
        None => {
            let id = backend.create_geometry(&data)?;
            Ok((GeometryBuffers { id, index_count }, GeometryUpload::Created))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, HeadlessBackend};

    #[test]
    fn first_upload_creates_then_reloads() {
        let mut backend = HeadlessBackend::new();
        let mut store = GeometryStore::new();
        let object = hecs::World::new().spawn(());
        let cube = MeshData::cube();

        assert_eq!(
            store.upload_mesh(&mut backend, object, &cube),
            Ok(GeometryUpload::Created)
        );
        let id = store.mesh(object).map(|b| b.id);
        assert_eq!(
            store.upload_mesh(&mut backend, object, &MeshData::screen_quad()),
            Ok(GeometryUpload::Reloaded)
        );
        assert_eq!(store.mesh(object).map(|b| b.id), id);
        assert_eq!(store.mesh(object).map(|b| b.index_count), Some(6));
        assert_eq!(backend.live_geometries(), 1);
    }

    #[test]
    fn quad_is_a_singleton() {
        let mut backend = HeadlessBackend::new();
        let mut store = GeometryStore::new();
        let a = store.quad(&mut backend).expect("quad");
        let b = store.quad(&mut backend).expect("quad");
        assert_eq!(a, b);
        assert_eq!(
            backend.count(|c| matches!(c, GpuCommand::CreateGeometry { .. })),
            1
        );
    }

    #[test]
    fn remove_destroys_mesh_and_wireframe() {
        let mut backend = HeadlessBackend::new();
        let mut store = GeometryStore::new();
        let object = hecs::World::new().spawn(());
        let cube = MeshData::cube();
        store.upload_mesh(&mut backend, object, &cube).expect("mesh");
        store
            .upload_wireframe(&mut backend, object, cube.bounds())
            .expect("wireframe");
        store.remove(&mut backend, object);
        assert_eq!(backend.live_geometries(), 0);
        assert!(store.wireframe(object).is_none());
    }
}
