use std::collections::{BTreeSet, HashMap};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use hecs::Entity;

use crate::error::{RenderError, Result};
use crate::gpu::GraphicsBackend;
use crate::scene::{DirectionalLight, Light, PointLight, SpotLight};

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 16;
pub const MAX_SPOT_LIGHTS: usize = 8;

/// Bytes before the first record of a light table: the live count padded
/// to 16 bytes.
pub const LIGHT_TABLE_HEADER: u64 = 16;

/// Half-extent of the orthographic box a directional light's shadow covers.
const SHADOW_EXTENT: f32 = 25.0;
const SHADOW_DISTANCE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
}

impl LightKind {
    /// Size of the GPU table for this kind, header included.
    pub fn table_size(self) -> u64 {
        match self {
            LightKind::Point => LightSlotTable::<PointLightRaw>::buffer_size(),
            LightKind::Directional => LightSlotTable::<DirectionalLightRaw>::buffer_size(),
            LightKind::Spot => LightSlotTable::<SpotLightRaw>::buffer_size(),
        }
    }
}

/// GPU record stored in one slot of a light table.
pub trait LightRecord: Pod {
    const KIND: LightKind;
    const CAPACITY: usize;
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct PointLightRaw {
    pub position_range: [f32; 4],
    pub color_intensity: [f32; 4],
}

impl PointLightRaw {
    pub fn from_light(light: &PointLight, world: &Mat4) -> Self {
        let position = world.w_axis.truncate();
        Self {
            position_range: position.extend(light.range).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
        }
    }
}

impl LightRecord for PointLightRaw {
    const KIND: LightKind = LightKind::Point;
    const CAPACITY: usize = MAX_POINT_LIGHTS;
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DirectionalLightRaw {
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
    /// Shadow-map projection, one depth layer per slot.
    pub view_proj: [[f32; 4]; 4],
}

impl DirectionalLightRaw {
    pub fn from_light(light: &DirectionalLight, world: &Mat4) -> Self {
        let direction = light_direction(world);
        Self {
            direction: direction.extend(0.0).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            view_proj: directional_view_proj(direction).to_cols_array_2d(),
        }
    }
}

impl LightRecord for DirectionalLightRaw {
    const KIND: LightKind = LightKind::Directional;
    const CAPACITY: usize = MAX_DIRECTIONAL_LIGHTS;
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SpotLightRaw {
    pub position_range: [f32; 4],
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
    /// Cosines of the inner and outer cone angles.
    pub cone_params: [f32; 4],
}

impl SpotLightRaw {
    pub fn from_light(light: &SpotLight, world: &Mat4) -> Self {
        let (inner, outer) = if light.inner_angle > light.outer_angle {
            (light.outer_angle, light.inner_angle)
        } else {
            (light.inner_angle, light.outer_angle)
        };
        Self {
            position_range: world.w_axis.truncate().extend(light.range).to_array(),
            direction: light_direction(world).extend(0.0).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            cone_params: [inner.cos(), outer.cos(), 0.0, 0.0],
        }
    }
}

impl LightRecord for SpotLightRaw {
    const KIND: LightKind = LightKind::Spot;
    const CAPACITY: usize = MAX_SPOT_LIGHTS;
}

/// Lights shine down their local -Z axis.
fn light_direction(world: &Mat4) -> Vec3 {
    let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
    if direction == Vec3::ZERO {
        Vec3::NEG_Y
    } else {
        direction
    }
}

/// Orthographic light-space matrix looking along `direction` at the origin.
pub fn directional_view_proj(direction: Vec3) -> Mat4 {
    let up = if direction.abs().dot(Vec3::Y) > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let eye = -direction * SHADOW_DISTANCE;
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, up);
    let proj = Mat4::orthographic_rh(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        0.1,
        SHADOW_DISTANCE * 2.0,
    );
    proj * view
}

/// Fixed-capacity table mirroring one GPU light buffer.
///
/// A light keeps its slot for as long as it lives. Removed slots are zeroed
/// on the GPU and handed out again lowest first, so `count` only ever grows
/// and shaders can iterate `0..count` without holes breaking anything.
pub struct LightSlotTable<R: LightRecord> {
    records: Vec<R>,
    count: usize,
    slots: HashMap<Entity, usize>,
    free: BTreeSet<usize>,
}

impl<R: LightRecord> LightSlotTable<R> {
    pub fn new() -> Self {
        Self {
            records: vec![R::zeroed(); R::CAPACITY],
            count: 0,
            slots: HashMap::new(),
            free: BTreeSet::new(),
        }
    }

    pub fn buffer_size() -> u64 {
        LIGHT_TABLE_HEADER + (R::CAPACITY * std::mem::size_of::<R>()) as u64
    }

    /// Writes `record` into the light's slot, allocating one on first
    /// sight, and uploads the count plus that slot.
    pub fn update(
        &mut self,
        light: Entity,
        record: R,
        backend: &mut dyn GraphicsBackend,
    ) -> Result<usize> {
        let slot = match self.slots.get(&light) {
            Some(&slot) => slot,
            None => {
                let slot = self.allocate()?;
                self.slots.insert(light, slot);
                slot
            }
        };
        self.records[slot] = record;
        self.upload_count(backend);
        self.upload_slot(slot, backend);
        Ok(slot)
    }

    /// Releases the light's slot. The zeroed record is uploaded so shaders
    /// skip it.
    pub fn remove(&mut self, light: Entity, backend: &mut dyn GraphicsBackend) -> Option<usize> {
        let slot = self.slots.remove(&light)?;
        self.records[slot] = R::zeroed();
        self.upload_slot(slot, backend);
        self.free.insert(slot);
        Some(slot)
    }

    pub fn slot_of(&self, light: Entity) -> Option<usize> {
        self.slots.get(&light).copied()
    }

    /// High-water mark of allocated slots.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn live(&self) -> usize {
        self.slots.len()
    }

    pub fn record(&self, slot: usize) -> Option<&R> {
        self.records.get(slot)
    }

    fn allocate(&mut self) -> Result<usize> {
        if let Some(slot) = self.free.pop_first() {
            return Ok(slot);
        }
        if self.count >= R::CAPACITY {
            return Err(RenderError::HandleOutOfBounds {
                kind: "light slot",
                index: self.count,
                capacity: R::CAPACITY,
            });
        }
        let slot = self.count;
        self.count += 1;
        Ok(slot)
    }

    fn upload_count(&self, backend: &mut dyn GraphicsBackend) {
        let header = [self.count as u32, 0, 0, 0];
        backend.write_light_slots(R::KIND, 0, bytemuck::bytes_of(&header));
    }

    fn upload_slot(&self, slot: usize, backend: &mut dyn GraphicsBackend) {
        let offset = LIGHT_TABLE_HEADER + (slot * std::mem::size_of::<R>()) as u64;
        backend.write_light_slots(R::KIND, offset, bytemuck::bytes_of(&self.records[slot]));
    }
}

impl<R: LightRecord> Default for LightSlotTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three light tables, dispatched on the light variant.
#[derive(Default)]
pub struct LightTables {
    pub point: LightSlotTable<PointLightRaw>,
    pub directional: LightSlotTable<DirectionalLightRaw>,
    pub spot: LightSlotTable<SpotLightRaw>,
    kinds: HashMap<Entity, LightKind>,
}

impl LightTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        entity: Entity,
        light: &Light,
        world: &Mat4,
        backend: &mut dyn GraphicsBackend,
    ) -> Result<usize> {
        let kind = light.kind();
        if let Some(previous) = self.kinds.get(&entity).copied() {
            if previous != kind {
                self.remove(entity, backend);
            }
        }

        let slot = match light {
            Light::Point(point) => {
                self.point
                    .update(entity, PointLightRaw::from_light(point, world), backend)?
            }
            Light::Directional(directional) => self.directional.update(
                entity,
                DirectionalLightRaw::from_light(directional, world),
                backend,
            )?,
            Light::Spot(spot) => {
                self.spot
                    .update(entity, SpotLightRaw::from_light(spot, world), backend)?
            }
        };
        self.kinds.insert(entity, kind);
        Ok(slot)
    }

    pub fn remove(
        &mut self,
        entity: Entity,
        backend: &mut dyn GraphicsBackend,
    ) -> Option<(LightKind, usize)> {
        let kind = self.kinds.remove(&entity)?;
        let slot = match kind {
            LightKind::Point => self.point.remove(entity, backend),
            LightKind::Directional => self.directional.remove(entity, backend),
            LightKind::Spot => self.spot.remove(entity, backend),
        }?;
        Some((kind, slot))
    }

    pub fn slot_of(&self, entity: Entity) -> Option<(LightKind, usize)> {
        let kind = *self.kinds.get(&entity)?;
        let slot = match kind {
            LightKind::Point => self.point.slot_of(entity),
            LightKind::Directional => self.directional.slot_of(entity),
            LightKind::Spot => self.spot.slot_of(entity),
        }?;
        Some((kind, slot))
    }

    pub fn directional_count(&self) -> usize {
        self.directional.count()
    }

    pub fn directional_view_proj(&self, slot: usize) -> Option<Mat4> {
        self.directional
            .record(slot)
            .map(|raw| Mat4::from_cols_array_2d(&raw.view_proj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, HeadlessBackend};

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = hecs::World::new();
        (0..n).map(|_| world.spawn(())).collect()
    }

    fn point(intensity: f32) -> PointLightRaw {
        PointLightRaw {
            position_range: [0.0, 1.0, 0.0, 10.0],
            color_intensity: [1.0, 1.0, 1.0, intensity],
        }
    }

    #[test]
    fn record_sizes_keep_storage_alignment() {
        assert_eq!(std::mem::size_of::<PointLightRaw>() % 16, 0);
        assert_eq!(std::mem::size_of::<DirectionalLightRaw>() % 16, 0);
        assert_eq!(std::mem::size_of::<SpotLightRaw>() % 16, 0);
        assert_eq!(LightKind::Point.table_size(), 16 + 16 * 32);
    }

    #[test]
    fn update_writes_count_then_single_slot() {
        let mut backend = HeadlessBackend::new();
        let mut table = LightSlotTable::<PointLightRaw>::new();
        let ids = entities(2);
        table.update(ids[0], point(1.0), &mut backend).expect("slot");
        table.update(ids[1], point(2.0), &mut backend).expect("slot");

        let writes: Vec<(u64, usize)> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::WriteLightSlots { offset, bytes, .. } => Some((*offset, bytes.len())),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![(0, 16), (16, 32), (0, 16), (48, 32)]);
    }

    #[test]
    fn slots_are_stable_across_updates() {
        let mut backend = HeadlessBackend::new();
        let mut table = LightSlotTable::<PointLightRaw>::new();
        let ids = entities(3);
        for &id in &ids {
            table.update(id, point(1.0), &mut backend).expect("slot");
        }
        assert_eq!(table.update(ids[1], point(5.0), &mut backend), Ok(1));
        assert_eq!(table.count(), 3);
        assert_eq!(table.record(1).map(|r| r.color_intensity[3]), Some(5.0));
    }

    #[test]
    fn removed_slots_are_reused_lowest_first() {
        let mut backend = HeadlessBackend::new();
        let mut table = LightSlotTable::<PointLightRaw>::new();
        let ids = entities(5);
        for &id in &ids[..4] {
            table.update(id, point(1.0), &mut backend).expect("slot");
        }
        assert_eq!(table.remove(ids[2], &mut backend), Some(2));
        assert_eq!(table.remove(ids[1], &mut backend), Some(1));
        assert_eq!(table.record(2), Some(&PointLightRaw::zeroed()));

        assert_eq!(table.update(ids[4], point(1.0), &mut backend), Ok(1));
        assert_eq!(table.slot_of(ids[3]), Some(3));
        assert_eq!(table.count(), 4);
        assert_eq!(table.live(), 3);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut backend = HeadlessBackend::new();
        let mut table = LightSlotTable::<DirectionalLightRaw>::new();
        let ids = entities(MAX_DIRECTIONAL_LIGHTS + 1);
        for &id in &ids[..MAX_DIRECTIONAL_LIGHTS] {
            table
                .update(id, DirectionalLightRaw::zeroed(), &mut backend)
                .expect("slot");
        }
        let err = table
            .update(ids[MAX_DIRECTIONAL_LIGHTS], DirectionalLightRaw::zeroed(), &mut backend)
            .unwrap_err();
        assert!(matches!(err, RenderError::HandleOutOfBounds { .. }));
    }

    #[test]
    fn changing_kind_moves_the_light() {
        let mut backend = HeadlessBackend::new();
        let mut tables = LightTables::new();
        let id = entities(1)[0];
        let world = Mat4::IDENTITY;
        tables
            .update(id, &Light::Point(PointLight::default()), &world, &mut backend)
            .expect("point");
        tables
            .update(id, &Light::Spot(SpotLight::default()), &world, &mut backend)
            .expect("spot");
        assert_eq!(tables.slot_of(id), Some((LightKind::Spot, 0)));
        assert_eq!(tables.point.live(), 0);
    }

    #[test]
    fn directional_matrix_maps_origin_inside_clip_volume() {
        let vp = directional_view_proj(Vec3::new(0.3, -1.0, 0.2).normalize());
        let clip = vp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
