// scene/components.rs
// Pure hecs components

use glam::Vec3;

use crate::asset::{Handle, MeshData};
use crate::renderer::lights::LightKind;
use crate::scene::{Material, Transform};

// ============================================================================
// Core Components
// ============================================================================

/// Local transform relative to the parent (or the world for roots)
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// Mesh drawn with a material
#[derive(Debug, Clone)]
pub struct MeshComponent {
    pub mesh: MeshData,
    pub material: Handle<Material>,
}

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Parent entity reference
#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

// ============================================================================
// Lighting Components
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    pub intensity: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub range: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            inner_angle: 15f32.to_radians(),
            outer_angle: 25f32.to_radians(),
            range: 20.0,
        }
    }
}

/// Light component; the variant picks the light table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point(PointLight),
    Directional(DirectionalLight),
    Spot(SpotLight),
}

impl Light {
    pub fn kind(&self) -> LightKind {
        match self {
            Light::Point(_) => LightKind::Point,
            Light::Directional(_) => LightKind::Directional,
            Light::Spot(_) => LightKind::Spot,
        }
    }
}

/// What a scene object is, as far as the renderer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Drawable,
    Light(LightKind),
    /// Transform-only node.
    Group,
}
