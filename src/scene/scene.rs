use glam::Mat4;
use hecs::{Entity, World};

use super::components::{Light, MeshComponent, Name, ObjectKind, Parent, TransformComponent};
use super::events::SceneEvent;
use super::{Camera, Material, Transform};
use crate::asset::{Handle, MeshData, Registry, TextureData};
use crate::error::{RenderError, Result};

/// A drawable as the renderer sees it during a frame.
#[derive(Debug, Clone, Copy)]
pub struct Drawable {
    pub entity: Entity,
    pub world: Mat4,
    pub material: Handle<Material>,
}

/// Scene graph backed by a hecs world.
///
/// Every mutation goes through a method here so the matching
/// [`SceneEvent`] is queued; the renderer drains the queue at the start of
/// the next frame.
pub struct Scene {
    world: World,
    materials: Registry<Material>,
    textures: Registry<TextureData>,
    camera: Camera,
    events: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            materials: Registry::new("material"),
            textures: Registry::new("texture"),
            camera: Camera::default(),
            events: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn spawn_mesh(
        &mut self,
        name: &str,
        mesh: MeshData,
        material: Handle<Material>,
        transform: Transform,
    ) -> Entity {
        let entity = self.world.spawn((
            Name::new(name),
            TransformComponent(transform),
            MeshComponent { mesh, material },
        ));
        self.events.push(SceneEvent::MeshUpdated(entity));
        entity
    }

    pub fn spawn_light(&mut self, name: &str, light: Light, transform: Transform) -> Entity {
        let entity = self
            .world
            .spawn((Name::new(name), TransformComponent(transform), light));
        self.events.push(SceneEvent::LightUpdated(entity));
        entity
    }

    /// Transform-only node used to group children.
    pub fn spawn_group(&mut self, name: &str, transform: Transform) -> Entity {
        self.world
            .spawn((Name::new(name), TransformComponent(transform)))
    }

    /// Removes `entity` and its whole subtree.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        let mut doomed = self.descendants(entity)?;
        doomed.push(entity);
        for object in doomed {
            let kind = self.object_kind(object)?;
            self.world
                .despawn(object)
                .map_err(|_| unknown_object(object))?;
            self.events.push(SceneEvent::ObjectRemoved { object, kind });
        }
        Ok(())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    pub fn name(&self, entity: Entity) -> Option<String> {
        self.world.get::<&Name>(entity).ok().map(|name| name.0.clone())
    }

    pub fn object_kind(&self, entity: Entity) -> Result<ObjectKind> {
        if !self.world.contains(entity) {
            return Err(unknown_object(entity));
        }
        if self.world.satisfies::<&MeshComponent>(entity).unwrap_or(false) {
            return Ok(ObjectKind::Drawable);
        }
        if let Ok(light) = self.world.get::<&Light>(entity) {
            return Ok(ObjectKind::Light(light.kind()));
        }
        Ok(ObjectKind::Group)
    }

    // ------------------------------------------------------------------
    // Transforms and hierarchy
    // ------------------------------------------------------------------

    pub fn transform(&self, entity: Entity) -> Result<Transform> {
        self.world
            .get::<&TransformComponent>(entity)
            .map(|t| t.0)
            .map_err(|_| unknown_object(entity))
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> Result<()> {
        let mut component = self
            .world
            .get::<&mut TransformComponent>(entity)
            .map_err(|_| unknown_object(entity))?;
        component.0 = transform;
        drop(component);
        self.events.push(SceneEvent::TransformChanged(entity));
        Ok(())
    }

    /// Re-parents `child`; `None` makes it a root.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<()> {
        if !self.world.contains(child) {
            return Err(unknown_object(child));
        }
        match parent {
            Some(parent) => {
                if !self.world.contains(parent) {
                    return Err(unknown_object(parent));
                }
                if parent == child || self.descendants(child)?.contains(&parent) {
                    return Err(RenderError::InvalidHierarchy(format!(
                        "{:?} cannot become a child of its own descendant {:?}",
                        child, parent
                    )));
                }
                self.world
                    .insert_one(child, Parent(parent))
                    .map_err(|_| unknown_object(child))?;
            }
            None => {
                let _ = self.world.remove_one::<Parent>(child);
            }
        }
        self.events.push(SceneEvent::SceneGraphChanged(child));
        Ok(())
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.world.get::<&Parent>(entity).ok().map(|p| p.0)
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        let mut children: Vec<Entity> = self
            .world
            .query::<&Parent>()
            .iter()
            .filter(|(_, parent)| parent.0 == entity)
            .map(|(child, _)| child)
            .collect();
        children.sort_by_key(|e| e.to_bits());
        children
    }

    /// Every object below `entity`, breadth first.
    pub fn descendants(&self, entity: Entity) -> Result<Vec<Entity>> {
        if !self.world.contains(entity) {
            return Err(unknown_object(entity));
        }
        let mut found = Vec::new();
        let mut frontier = vec![entity];
        while let Some(next) = frontier.pop() {
            for child in self.children(next) {
                found.push(child);
                frontier.push(child);
            }
        }
        Ok(found)
    }

    /// Local transform composed with every ancestor's.
    pub fn world_matrix(&self, entity: Entity) -> Result<Mat4> {
        let mut matrix = self.transform(entity)?.matrix();
        let mut current = entity;
        while let Some(parent) = self.parent(current) {
            matrix = self.transform(parent)?.matrix() * matrix;
            current = parent;
        }
        Ok(matrix)
    }

    // ------------------------------------------------------------------
    // Meshes and lights
    // ------------------------------------------------------------------

    pub fn mesh(&self, entity: Entity) -> Option<hecs::Ref<'_, MeshComponent>> {
        self.world.get::<&MeshComponent>(entity).ok()
    }

    pub fn set_mesh(&mut self, entity: Entity, mesh: MeshData) -> Result<()> {
        let mut component = self
            .world
            .get::<&mut MeshComponent>(entity)
            .map_err(|_| unknown_object(entity))?;
        component.mesh = mesh;
        drop(component);
        self.events.push(SceneEvent::MeshUpdated(entity));
        Ok(())
    }

    pub fn light(&self, entity: Entity) -> Option<Light> {
        self.world.get::<&Light>(entity).ok().map(|light| *light)
    }

    pub fn set_light(&mut self, entity: Entity, light: Light) -> Result<()> {
        let mut component = self
            .world
            .get::<&mut Light>(entity)
            .map_err(|_| unknown_object(entity))?;
        *component = light;
        drop(component);
        self.events.push(SceneEvent::LightUpdated(entity));
        Ok(())
    }

    /// Drawables with their world matrices, in spawn order.
    pub fn drawables(&self) -> Result<Vec<Drawable>> {
        let mut entities: Vec<(Entity, Handle<Material>)> = self
            .world
            .query::<&MeshComponent>()
            .iter()
            .map(|(entity, mesh)| (entity, mesh.material))
            .collect();
        entities.sort_by_key(|(entity, _)| entity.to_bits());
        entities
            .into_iter()
            .map(|(entity, material)| {
                Ok(Drawable {
                    entity,
                    world: self.world_matrix(entity)?,
                    material,
                })
            })
            .collect()
    }

    pub fn lights(&self) -> Vec<(Entity, Light)> {
        let mut lights: Vec<(Entity, Light)> = self
            .world
            .query::<&Light>()
            .iter()
            .map(|(entity, light)| (entity, *light))
            .collect();
        lights.sort_by_key(|(entity, _)| entity.to_bits());
        lights
    }

    // ------------------------------------------------------------------
    // Materials and textures
    // ------------------------------------------------------------------

    pub fn add_material(&mut self, name: &str, material: Material) -> Handle<Material> {
        let handle = self.materials.insert(name, material);
        self.events.push(SceneEvent::MaterialUpdated(handle));
        handle
    }

    pub fn material(&self, handle: Handle<Material>) -> Result<&Material> {
        self.materials.fetch(handle)
    }

    pub fn material_by_name(&self, name: &str) -> Result<Handle<Material>> {
        self.materials.handle_of(name)
    }

    pub fn materials(&self) -> &Registry<Material> {
        &self.materials
    }

    /// Edits a material in place and queues the update.
    pub fn modify_material(
        &mut self,
        handle: Handle<Material>,
        edit: impl FnOnce(&mut Material),
    ) -> Result<()> {
        edit(self.materials.fetch_mut(handle)?);
        self.events.push(SceneEvent::MaterialUpdated(handle));
        Ok(())
    }

    pub fn add_texture(&mut self, name: &str, texture: TextureData) -> Result<Handle<TextureData>> {
        texture.validate()?;
        Ok(self.textures.insert(name, texture))
    }

    pub fn texture(&self, handle: Handle<TextureData>) -> Result<&TextureData> {
        self.textures.fetch(handle)
    }

    pub fn texture_by_name(&self, name: &str) -> Result<Handle<TextureData>> {
        self.textures.handle_of(name)
    }

    pub fn set_material_texture(
        &mut self,
        material: Handle<Material>,
        unit: u32,
        texture: Handle<TextureData>,
    ) -> Result<()> {
        self.textures.fetch(texture)?;
        self.materials.fetch_mut(material)?.textures.insert(unit, texture);
        self.events
            .push(SceneEvent::MaterialTextureUpdated { material, unit });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Camera and notifications
    // ------------------------------------------------------------------

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn pending_events(&self) -> &[SceneEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_object(entity: Entity) -> RenderError {
    RenderError::UnknownHandle {
        kind: "object",
        index: entity.id() as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn at(x: f32) -> Transform {
        Transform::from_trs(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = Scene::new();
        let root = scene.spawn_group("root", at(1.0));
        let material = scene.add_material("m", Material::default());
        let child = scene.spawn_mesh("child", MeshData::cube(), material, at(2.0));
        scene.set_parent(child, Some(root)).expect("parent");

        let p = scene
            .world_matrix(child)
            .expect("matrix")
            .transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut scene = Scene::new();
        let a = scene.spawn_group("a", Transform::default());
        let b = scene.spawn_group("b", Transform::default());
        scene.set_parent(b, Some(a)).expect("parent");
        let err = scene.set_parent(a, Some(b)).unwrap_err();
        assert!(matches!(err, RenderError::InvalidHierarchy(_)));
    }

    #[test]
    fn mutations_queue_events() {
        let mut scene = Scene::new();
        let material = scene.add_material("m", Material::default());
        let cube = scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());
        scene.set_transform(cube, at(1.0)).expect("transform");

        let events = scene.drain_events();
        assert_eq!(
            events,
            vec![
                SceneEvent::MaterialUpdated(material),
                SceneEvent::MeshUpdated(cube),
                SceneEvent::TransformChanged(cube),
            ]
        );
        assert!(scene.pending_events().is_empty());
    }

    #[test]
    fn despawn_removes_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn_group("root", Transform::default());
        let leaf = scene.spawn_light(
            "lamp",
            Light::Point(Default::default()),
            Transform::default(),
        );
        scene.set_parent(leaf, Some(root)).expect("parent");
        scene.drain_events();

        scene.despawn(root).expect("despawn");
        assert!(!scene.contains(leaf));
        let removed: Vec<ObjectKind> = scene
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SceneEvent::ObjectRemoved { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&ObjectKind::Group));
    }
}
