use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use hecs::Entity;

use crate::asset::Handle;
use crate::scene::{Material, ObjectKind, Scene, SceneEvent};

/// Insertion-ordered set.
#[derive(Debug)]
struct OrderedSet<T> {
    order: Vec<T>,
    seen: HashSet<T>,
}

impl<T: Copy + Eq + Hash> OrderedSet<T> {
    fn insert(&mut self, value: T) -> bool {
        let fresh = self.seen.insert(value);
        if fresh {
            self.order.push(value);
        }
        fresh
    }

    fn take(&mut self) -> VecDeque<T> {
        self.seen.clear();
        std::mem::take(&mut self.order).into()
    }

    /// Puts `values` in front of whatever is recorded now.
    fn prepend(&mut self, values: impl IntoIterator<Item = T>) {
        let recorded = self.take();
        for value in values.into_iter().chain(recorded) {
            self.insert(value);
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

/// Work collected from scene events since the last flush, one entry per
/// object no matter how many events named it.
#[derive(Debug, Default)]
pub struct Invalidations {
    removed: Vec<(Entity, ObjectKind)>,
    meshes: OrderedSet<Entity>,
    materials: OrderedSet<Handle<Material>>,
    material_textures: OrderedSet<(Handle<Material>, u32)>,
    objects: OrderedSet<Entity>,
}

/// Drained contents of [`Invalidations`], in the order they are applied.
#[derive(Debug, Default)]
pub struct FlushPlan {
    pub removed: VecDeque<(Entity, ObjectKind)>,
    pub meshes: VecDeque<Entity>,
    pub materials: VecDeque<Handle<Material>>,
    pub material_textures: VecDeque<(Handle<Material>, u32)>,
    /// Lights to re-upload and drawables whose bounds are recomputed.
    pub objects: VecDeque<Entity>,
}

impl Invalidations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: SceneEvent, scene: &Scene) {
        match event {
            SceneEvent::MeshUpdated(object) => {
                self.meshes.insert(object);
                self.objects.insert(object);
            }
            SceneEvent::MaterialUpdated(material) => {
                self.materials.insert(material);
            }
            SceneEvent::MaterialTextureUpdated { material, unit } => {
                self.material_textures.insert((material, unit));
            }
            SceneEvent::LightUpdated(object) => {
                self.objects.insert(object);
            }
            SceneEvent::TransformChanged(object) | SceneEvent::SceneGraphChanged(object) => {
                self.objects.insert(object);
                // world matrices of the whole subtree moved
                for descendant in scene.descendants(object).unwrap_or_default() {
                    self.objects.insert(descendant);
                }
            }
            SceneEvent::ObjectRemoved { object, kind } => {
                self.removed.push((object, kind));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.meshes.len() == 0
            && self.materials.len() == 0
            && self.material_textures.len() == 0
            && self.objects.len() == 0
    }

    pub fn take(&mut self) -> FlushPlan {
        FlushPlan {
            removed: std::mem::take(&mut self.removed).into(),
            meshes: self.meshes.take(),
            materials: self.materials.take(),
            material_textures: self.material_textures.take(),
            objects: self.objects.take(),
        }
    }

    /// Records the unapplied rest of `plan` again, ahead of anything
    /// recorded since it was taken.
    pub fn restore(&mut self, plan: FlushPlan) {
        let recorded = std::mem::take(&mut self.removed);
        self.removed = plan.removed.into_iter().chain(recorded).collect();
        self.meshes.prepend(plan.meshes);
        self.materials.prepend(plan.materials);
        self.material_textures.prepend(plan.material_textures);
        self.objects.prepend(plan.objects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MeshData;
    use crate::scene::Transform;

    #[test]
    fn repeated_edits_collapse_to_one_entry() {
        let mut scene = Scene::new();
        let material = scene.add_material("m", Material::default());
        let cube = scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());
        for x in 0..3 {
            scene
                .set_transform(cube, Transform::from_translation(glam::Vec3::X * x as f32))
                .expect("transform");
        }

        let mut invalidations = Invalidations::new();
        for event in scene.drain_events() {
            invalidations.record(event, &scene);
        }
        let plan = invalidations.take();
        assert_eq!(plan.objects, vec![cube]);
        assert_eq!(plan.meshes, vec![cube]);
        assert_eq!(plan.materials, vec![material]);
        assert!(invalidations.is_empty());
    }

    #[test]
    fn transform_change_reaches_descendants() {
        let mut scene = Scene::new();
        let root = scene.spawn_group("root", Transform::default());
        let lamp = scene.spawn_light(
            "lamp",
            crate::scene::Light::Point(Default::default()),
            Transform::default(),
        );
        scene.set_parent(lamp, Some(root)).expect("parent");
        scene.drain_events();

        scene
            .set_transform(root, Transform::from_translation(glam::Vec3::Y))
            .expect("transform");
        let mut invalidations = Invalidations::new();
        for event in scene.drain_events() {
            invalidations.record(event, &scene);
        }
        assert_eq!(invalidations.take().objects, vec![root, lamp]);
    }

    #[test]
    fn restored_plan_runs_before_newer_work() {
        let mut scene = Scene::new();
        let first = scene.add_material("first", Material::default());
        let second = scene.add_material("second", Material::default());
        let mut invalidations = Invalidations::new();
        for event in scene.drain_events() {
            invalidations.record(event, &scene);
        }
        let mut plan = invalidations.take();
        plan.materials.pop_front();

        scene
            .modify_material(first, |material| {
                material.properties.insert("diffuseColor".into(), vec![1.0]);
            })
            .expect("modify");
        scene
            .modify_material(second, |material| {
                material.properties.insert("diffuseColor".into(), vec![0.5]);
            })
            .expect("modify");
        for event in scene.drain_events() {
            invalidations.record(event, &scene);
        }
        invalidations.restore(plan);
        assert_eq!(invalidations.take().materials, vec![second, first]);
    }
}
