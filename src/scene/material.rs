use std::collections::BTreeMap;

use crate::asset::{Handle, TextureData};

pub const DIFFUSE_COLOR: &str = "diffuseColor";
pub const SPECULAR_COLOR: &str = "specularColor";
pub const SPECULAR_SHININESS: &str = "specularShininess";
pub const EMISSIVE_COLOR: &str = "emissiveColor";

pub const ALBEDO: &str = "albedo";
pub const METALLIC: &str = "metallic";
pub const ROUGHNESS: &str = "roughness";
pub const NORMAL_STRENGTH: &str = "normalStrength";

/// Surface description shared by every drawable that references it.
///
/// Program fields name entries of the renderer's shader program registry:
/// `forward_program` draws in forward geometry stages, `geometry_program`
/// fills the G-buffer and `lighting_program` shades it in deferred mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub forward_program: String,
    pub geometry_program: String,
    pub lighting_program: String,
    /// Uniform name to up to four components.
    pub properties: BTreeMap<String, Vec<f32>>,
    /// Texture unit to texture.
    pub textures: BTreeMap<u32, Handle<TextureData>>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new()
            .with_property(DIFFUSE_COLOR, &[0.8, 0.8, 0.8])
            .with_property(SPECULAR_COLOR, &[1.0, 1.0, 1.0])
            .with_property(SPECULAR_SHININESS, &[32.0])
            .with_property(EMISSIVE_COLOR, &[0.0, 0.0, 0.0])
    }
}

impl Material {
    /// Material using the built-in programs and no properties.
    pub fn new() -> Self {
        Self {
            forward_program: "forward".into(),
            geometry_program: "gbuffer".into(),
            lighting_program: "deferred_blinn_phong".into(),
            properties: BTreeMap::new(),
            textures: BTreeMap::new(),
        }
    }

    /// Metallic-roughness material drawn by `pbr_forward`, or by
    /// `pbr_gbuffer` and lit by `deferred_pbr` in deferred mode. Texture
    /// units 0 to 4 hold albedo, normal, metallic, roughness and occlusion.
    pub fn physically_based(albedo: [f32; 3], metallic: f32, roughness: f32) -> Self {
        Self {
            forward_program: "pbr_forward".into(),
            geometry_program: "pbr_gbuffer".into(),
            lighting_program: "deferred_pbr".into(),
            ..Self::new()
        }
        .with_property(ALBEDO, &albedo)
        .with_property(METALLIC, &[metallic])
        .with_property(ROUGHNESS, &[roughness])
        .with_property(NORMAL_STRENGTH, &[0.0])
    }

    pub fn with_property(mut self, name: &str, values: &[f32]) -> Self {
        self.properties.insert(name.to_string(), values.to_vec());
        self
    }

    pub fn with_forward_program(mut self, name: impl Into<String>) -> Self {
        self.forward_program = name.into();
        self
    }

    pub fn with_geometry_program(mut self, name: impl Into<String>) -> Self {
        self.geometry_program = name.into();
        self
    }

    pub fn with_lighting_program(mut self, name: impl Into<String>) -> Self {
        self.lighting_program = name.into();
        self
    }
}
