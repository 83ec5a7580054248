use std::collections::HashMap;

use crate::asset::Handle;
use crate::error::{RenderError, Result};
use crate::gpu::{TextureBinding, TextureId, MAX_TEXTURE_UNITS};
use crate::renderer::shader::{stencil_value, ShaderProgram};
use crate::renderer::uniforms::PARAMETER_SLOTS;
use crate::scene::Material;

/// GPU-facing view of a material: program handles, packed properties and
/// uploaded textures.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBinding {
    pub forward_program: Handle<ShaderProgram>,
    pub geometry_program: Handle<ShaderProgram>,
    pub lighting_program: Handle<ShaderProgram>,
    pub forward_params: [[f32; 4]; PARAMETER_SLOTS],
    pub geometry_params: [[f32; 4]; PARAMETER_SLOTS],
    /// Written to the stencil buffer by deferred geometry stages.
    pub stencil_value: u32,
    pub textures: [Option<TextureId>; MAX_TEXTURE_UNITS],
}

impl MaterialBinding {
    pub fn texture_bindings(&self) -> Vec<TextureBinding> {
        let used = self
            .textures
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);
        self.textures[..used]
            .iter()
            .map(|texture| texture.map_or(TextureBinding::Unbound, TextureBinding::Texture))
            .collect()
    }
}

#[derive(Default)]
pub struct MaterialBindings {
    bindings: HashMap<Handle<Material>, MaterialBinding>,
}

impl MaterialBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, material: Handle<Material>) -> Result<&MaterialBinding> {
        self.bindings
            .get(&material)
            .ok_or(RenderError::UnknownHandle {
                kind: "material binding",
                index: material.index(),
            })
    }

    /// Rebuilds the binding of `material`, keeping its uploaded textures.
    pub fn rebuild(
        &mut self,
        handle: Handle<Material>,
        material: &Material,
        programs: &crate::asset::Registry<ShaderProgram>,
    ) -> Result<&MaterialBinding> {
        let forward_program = programs.handle_of(&material.forward_program)?;
        let geometry_program = programs.handle_of(&material.geometry_program)?;
        let lighting_program = programs.handle_of(&material.lighting_program)?;

        let properties = || {
            material
                .properties
                .iter()
                .map(|(name, values)| (name.as_str(), values.as_slice()))
        };
        let forward_params = programs.fetch(forward_program)?.pack(properties())?;
        let geometry_params = programs.fetch(geometry_program)?.pack(properties())?;

        let textures = self
            .bindings
            .get(&handle)
            .map_or([None; MAX_TEXTURE_UNITS], |binding| binding.textures);

        let binding = MaterialBinding {
            forward_program,
            geometry_program,
            lighting_program,
            forward_params,
            geometry_params,
            stencil_value: stencil_value(lighting_program)?,
            textures,
        };
        self.bindings.insert(handle, binding);
        self.get(handle)
    }

    pub fn set_texture(
        &mut self,
        material: Handle<Material>,
        unit: u32,
        texture: TextureId,
    ) -> Result<Option<TextureId>> {
        let slot = unit as usize;
        if slot >= MAX_TEXTURE_UNITS {
            return Err(RenderError::HandleOutOfBounds {
                kind: "texture unit",
                index: slot,
                capacity: MAX_TEXTURE_UNITS,
            });
        }
        let binding = self
            .bindings
            .get_mut(&material)
            .ok_or(RenderError::UnknownHandle {
                kind: "material binding",
                index: material.index(),
            })?;
        Ok(binding.textures[slot].replace(texture))
    }
}
