use hecs::Entity;

use crate::asset::Handle;
use crate::scene::{Material, ObjectKind};

/// Change notification published by the scene and drained by the renderer
/// once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEvent {
    MeshUpdated(Entity),
    MaterialUpdated(Handle<Material>),
    MaterialTextureUpdated {
        material: Handle<Material>,
        unit: u32,
    },
    LightUpdated(Entity),
    SceneGraphChanged(Entity),
    TransformChanged(Entity),
    ObjectRemoved {
        object: Entity,
        kind: ObjectKind,
    },
}
